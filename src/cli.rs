use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Verbose diagnostics: raw HTML, cleaned content and per-paragraph decisions.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a chapter range and bind it into an EPUB.
    Bind(BindArgs),
    /// Run extraction and classification on a saved chapter page.
    Inspect(InspectArgs),
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Write the built-in site profile as YAML.
    Init(ProfileInitArgs),
}

#[derive(Debug, Args)]
pub struct BindArgs {
    /// Site base URL (must be http/https).
    #[arg(long)]
    pub base_url: String,

    /// Novel slug, as it appears in chapter URLs.
    #[arg(long)]
    pub novel: String,

    /// First chapter to download.
    #[arg(long, default_value_t = 1)]
    pub start: u32,

    /// Last chapter to download (inclusive).
    #[arg(long)]
    pub end: u32,

    /// Book title.
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub translator: Option<String>,

    /// Written to the book as publisher.
    #[arg(long)]
    pub creator: Option<String>,

    /// Cover image URL.
    #[arg(long)]
    pub cover_url: Option<String>,

    /// Output EPUB path. Defaults to the title in snake case.
    #[arg(long)]
    pub out: Option<String>,

    /// Overwrite the output file if it already exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Site profile YAML. Defaults to the built-in profile.
    #[arg(long)]
    pub profile: Option<String>,

    #[arg(long, default_value_t = false)]
    pub include_footnotes: bool,

    #[arg(long, default_value_t = false)]
    pub include_notes: bool,

    /// Name chapters `Chapter N` instead of using the page title.
    #[arg(long, default_value_t = false)]
    pub simple_chapter_names: bool,

    /// Delay between chapters (politeness).
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per request before the chapter is given up.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Base of the linear backoff between attempts.
    #[arg(long, default_value_t = 5000, hide = true)]
    pub retry_backoff_ms: u64,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Hide the progress bar.
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Saved chapter page.
    #[arg(long)]
    pub html: String,

    /// Chapter index used for the default title and footnote records.
    #[arg(long, default_value_t = 1)]
    pub chapter: u32,

    #[arg(long)]
    pub profile: Option<String>,

    #[arg(long, default_value_t = false)]
    pub simple_chapter_names: bool,

    /// Print decisions and the processed chapter as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProfileInitArgs {
    /// Output YAML path.
    #[arg(long)]
    pub out: String,

    #[arg(long, default_value_t = false)]
    pub force: bool,
}
