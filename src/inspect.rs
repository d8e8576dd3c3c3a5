use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::InspectArgs;
use crate::model::{Decision, ProcessedChapter};
use crate::pipeline::process_page;
use crate::profile::{FeatureFlags, SiteProfile};

#[derive(Debug, Serialize)]
struct InspectReport<'a> {
    decisions: &'a [Decision],
    chapter: &'a ProcessedChapter,
}

/// Run the extraction stages on a saved page and print what each paragraph
/// was classified as. Footnotes and notes are routed so the output shows
/// everything that was detected.
pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let html_path = PathBuf::from(&args.html);
    let html = std::fs::read_to_string(&html_path)
        .with_context(|| format!("read html: {}", html_path.display()))?;

    let profile = SiteProfile::load_or_default(args.profile.as_deref().map(Path::new))
        .context("load site profile")?
        .compile()
        .context("compile site profile")?;

    let flags = FeatureFlags {
        include_footnotes: true,
        include_notes: true,
        simple_chapter_names: args.simple_chapter_names,
        debug: true,
    };
    let classified = process_page(&html, args.chapter, &profile, flags)
        .with_context(|| format!("process {}", html_path.display()))?;

    if args.json {
        let report = InspectReport {
            decisions: &classified.decisions,
            chapter: &classified.chapter,
        };
        let json = serde_json::to_string_pretty(&report).context("serialize inspect report")?;
        println!("{json}");
        return Ok(());
    }

    let chapter = &classified.chapter;
    println!("title: {}", chapter.title);
    for decision in &classified.decisions {
        println!(
            "{:>4}  {:<14} {}",
            decision.position,
            decision.kind.as_str(),
            decision.excerpt
        );
    }
    println!(
        "narrative: {}  footnotes: {}  notes: {}",
        chapter.paragraphs.len(),
        chapter.footnotes.len(),
        chapter.notes.len()
    );
    Ok(())
}
