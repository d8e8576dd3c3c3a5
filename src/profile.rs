//! Site profile: the per-site configuration table consumed by the extractor,
//! cleaner and classifier.
//!
//! The defaults describe the site the tool was first written for. Adapting the
//! tool to another site means writing a profile YAML (see `profile init`), not
//! editing code.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cli::ProfileInitArgs;
use crate::selector::ElementSelector;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Chapter URL with `{base}`, `{novel}` and `{chapter}` placeholders.
    pub chapter_url_template: String,
    pub title: ElementSelector,
    pub content: ElementSelector,
    /// CSS selector for paragraph-level nodes inside the content container.
    pub paragraphs: String,
    pub noise: Vec<ElementSelector>,
    pub comment_regions: Vec<CommentRegion>,
    /// Tags removed when they carry no visible text and no image.
    pub empty_candidates: Vec<String>,
    pub leading_note_prefixes: Vec<String>,
    /// Regex with `label` and `body` capture groups.
    pub footnote_pattern: String,
    /// Text that must appear in a footnote body.
    pub footnote_separator: String,
    pub trailing_note_phrases: Vec<String>,
    pub strong_note_phrases: Vec<String>,
    pub promo_markers: Vec<ElementSelector>,
    pub chapter_label_patterns: Vec<String>,
}

/// Markup between an opening and a closing HTML comment, e.g.
/// `<!--sse-->...<!--/sse-->`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRegion {
    pub start: String,
    pub end: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            chapter_url_template: "{base}{novel}/chapter-{chapter}".to_owned(),
            title: ElementSelector::tag_with_class("span", "chapter-title"),
            content: ElementSelector::tag_with_id("div", "chapter-container"),
            paragraphs: "p".to_owned(),
            noise: vec![
                ElementSelector::tag("script"),
                ElementSelector::tag("style"),
                ElementSelector::tag("noscript"),
                ElementSelector::tag("iframe"),
                ElementSelector::class("CTGIiSmv"),
                ElementSelector::class("L-MHncuP"),
                ElementSelector::class("vm-placement"),
                ElementSelector::attribute(Some("div"), "data-defid", None),
                ElementSelector::attribute(Some("div"), "data-mobid", None),
            ],
            comment_regions: vec![CommentRegion {
                start: "sse".to_owned(),
                end: "/sse".to_owned(),
            }],
            empty_candidates: ["p", "div", "span"].map(str::to_owned).to_vec(),
            leading_note_prefixes: ["T/L:", "T/N:"].map(str::to_owned).to_vec(),
            footnote_pattern: r"^(?P<label>\d+)\.\s+(?P<body>.+)$".to_owned(),
            footnote_separator: ":".to_owned(),
            trailing_note_phrases: [
                "t/n:",
                "tn:",
                "t/l:",
                "tl:",
                "translator's note:",
                "translator note:",
                "chapter note:",
                "chapter note by",
                "thanks for playing",
                "as always",
                "patreon",
                "ko-fi.com",
            ]
            .map(str::to_owned)
            .to_vec(),
            strong_note_phrases: [
                "translator's note",
                "translator note",
                "chapter note",
                "t/n",
                "note",
            ]
            .map(str::to_owned)
            .to_vec(),
            promo_markers: vec![ElementSelector::attribute(
                Some("p"),
                "style",
                Some("text-align: center; font-weight: bold;"),
            )],
            chapter_label_patterns: [r"^\d+\.?$", r"^chapter\s+\d+\.?$"]
                .map(str::to_owned)
                .to_vec(),
        }
    }
}

impl SiteProfile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read profile: {}", path.display()))?;
        let profile: SiteProfile = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse profile: {}", path.display()))?;
        Ok(profile)
    }

    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn chapter_url(&self, base: &str, novel: &str, chapter: u32) -> String {
        let base = if base.ends_with('/') {
            base.to_owned()
        } else {
            format!("{base}/")
        };
        self.chapter_url_template
            .replace("{base}", &base)
            .replace("{novel}", novel.trim_matches('/'))
            .replace("{chapter}", &chapter.to_string())
    }

    /// Validate and compile the profile's pattern tables.
    pub fn compile(self) -> anyhow::Result<CompiledProfile> {
        if self.content.is_empty() {
            anyhow::bail!("profile content selector must not be empty");
        }
        if self.paragraphs.trim().is_empty() {
            anyhow::bail!("profile paragraph selector must not be empty");
        }
        if !self.chapter_url_template.contains("{chapter}") {
            anyhow::bail!("chapter_url_template must contain {{chapter}}");
        }

        let footnote_pattern =
            Regex::new(&self.footnote_pattern).context("compile footnote_pattern")?;
        for group in ["label", "body"] {
            if !footnote_pattern.capture_names().any(|name| name == Some(group)) {
                anyhow::bail!("footnote_pattern must define a `{group}` capture group");
            }
        }

        let chapter_labels = self
            .chapter_label_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){pattern}"))
                    .with_context(|| format!("compile chapter label pattern: {pattern}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let comment_regions = self
            .comment_regions
            .iter()
            .map(|region| {
                let pattern = format!(
                    r"(?s)<!--\s*{}\s*-->.*?<!--\s*{}\s*-->",
                    regex::escape(&region.start),
                    regex::escape(&region.end)
                );
                Regex::new(&pattern).with_context(|| {
                    format!("compile comment region: {} .. {}", region.start, region.end)
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let trailing_note_phrases = lowercase_all(&self.trailing_note_phrases);
        let strong_note_phrases = lowercase_all(&self.strong_note_phrases);

        Ok(CompiledProfile {
            footnote_pattern,
            chapter_labels,
            comment_regions,
            trailing_note_phrases,
            strong_note_phrases,
            profile: self,
        })
    }
}

fn lowercase_all(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// A validated profile with its regexes compiled. Built once per run and
/// shared by reference.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub profile: SiteProfile,
    pub footnote_pattern: Regex,
    pub chapter_labels: Vec<Regex>,
    pub comment_regions: Vec<Regex>,
    pub trailing_note_phrases: Vec<String>,
    pub strong_note_phrases: Vec<String>,
}

impl CompiledProfile {
    pub fn builtin() -> anyhow::Result<Self> {
        SiteProfile::default().compile()
    }
}

/// Per-run switches. They gate routing of detected paragraphs into the
/// output, never detection itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub include_footnotes: bool,
    pub include_notes: bool,
    pub simple_chapter_names: bool,
    pub debug: bool,
}

/// `profile init`: write the built-in profile as YAML for adaptation.
pub fn init(args: ProfileInitArgs) -> anyhow::Result<()> {
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() && !args.force {
        anyhow::bail!("profile output already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create profile dir: {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(&SiteProfile::default()).context("serialize profile yaml")?;

    let mut options = OpenOptions::new();
    options.write(true);
    if args.force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut out = options
        .open(&out_path)
        .with_context(|| format!("open profile output: {}", out_path.display()))?;
    out.write_all(yaml.as_bytes())
        .with_context(|| format!("write profile: {}", out_path.display()))?;
    out.flush().context("flush profile")?;

    tracing::info!(out = %out_path.display(), "wrote site profile");
    Ok(())
}
