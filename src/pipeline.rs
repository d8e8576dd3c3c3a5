use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::classify::{Classified, classify};
use crate::clean::clean;
use crate::error::ChapterError;
use crate::extract::extract;
use crate::fetch::{Fetcher, validate_url};
use crate::model::{ChapterRequest, FailedChapter, ParagraphKind, ProcessedChapter};
use crate::profile::{CompiledProfile, FeatureFlags};
use crate::progress::RunProgress;

const RAW_SNIPPET_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Pause between consecutive chapters.
    pub delay: Duration,
    pub flags: FeatureFlags,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// In requested order; failed chapters are absent, not placeholders.
    pub succeeded: Vec<ProcessedChapter>,
    pub failed: Vec<FailedChapter>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn empty_chapters(&self) -> impl Iterator<Item = u32> + '_ {
        self.succeeded
            .iter()
            .filter(|chapter| chapter.is_empty())
            .map(|chapter| chapter.index)
    }
}

/// One request per index in `range`, in ascending order.
pub fn chapter_requests(base_url: &str, novel: &str, range: RangeInclusive<u32>) -> Vec<ChapterRequest> {
    range
        .map(|index| ChapterRequest {
            base_url: base_url.to_owned(),
            novel: novel.to_owned(),
            index,
        })
        .collect()
}

/// Fetch and process every request in order.
///
/// Per-chapter failures are recorded and the run moves on; `cancel` is
/// checked between chapters only.
pub fn run(
    requests: &[ChapterRequest],
    fetcher: &mut dyn Fetcher,
    profile: &CompiledProfile,
    options: &RunOptions,
    cancel: &AtomicBool,
    progress: &mut dyn RunProgress,
) -> RunReport {
    let mut report = RunReport::default();
    progress.on_run_start(requests.len());

    for (position, request) in requests.iter().enumerate() {
        if position > 0 && !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }
        if cancel.load(Ordering::SeqCst) {
            tracing::warn!(
                next_chapter = request.index,
                completed = report.succeeded.len(),
                "run cancelled"
            );
            report.cancelled = true;
            break;
        }

        progress.on_chapter_start(request.index);
        match process_request(request, fetcher, profile, options.flags) {
            Ok(chapter) => {
                tracing::info!(
                    chapter = chapter.index,
                    title = %chapter.title,
                    paragraphs = chapter.paragraphs.len(),
                    footnotes = chapter.footnotes.len(),
                    notes = chapter.notes.len(),
                    "chapter processed"
                );
                progress.on_chapter_done(chapter.index, chapter.paragraphs.len());
                report.succeeded.push(chapter);
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(chapter = request.index, error = %reason, "chapter failed");
                progress.on_chapter_failed(request.index, &reason);
                report.failed.push(FailedChapter {
                    index: request.index,
                    reason,
                });
            }
        }
    }

    progress.on_run_finish();
    report
}

fn process_request(
    request: &ChapterRequest,
    fetcher: &mut dyn Fetcher,
    profile: &CompiledProfile,
    flags: FeatureFlags,
) -> Result<ProcessedChapter, ChapterError> {
    let url = profile
        .profile
        .chapter_url(&request.base_url, &request.novel, request.index);
    let url = validate_url(&url)?;

    tracing::debug!(chapter = request.index, url = %url, "fetching chapter");
    let page = fetcher.fetch(url.as_str())?;

    let classified = process_page(&page.html, request.index, profile, flags)?;
    Ok(classified.chapter)
}

/// Extract, clean and classify one raw page.
pub fn process_page(
    html: &str,
    index: u32,
    profile: &CompiledProfile,
    flags: FeatureFlags,
) -> Result<Classified, ChapterError> {
    tracing::debug!(chapter = index, raw = %snippet(html, RAW_SNIPPET_CHARS), "raw html");

    let extracted = extract(html, index, profile, flags)?;
    let root = extracted.content_root();

    let report = clean(&root, &profile.profile);
    tracing::debug!(
        chapter = index,
        noise = report.noise,
        empty = report.empty,
        html = %root.html(),
        "cleaned content"
    );

    let classified = classify(&root, index, extracted.title.clone(), profile, flags);
    log_excluded(index, &classified);

    if classified.chapter.is_empty() {
        tracing::warn!(chapter = index, "chapter has no narrative paragraphs");
    }
    Ok(classified)
}

fn log_excluded(index: u32, classified: &Classified) {
    let excluded = classified.decisions.iter().filter(|d| !d.routed).count();
    if excluded == 0 {
        return;
    }
    tracing::debug!(
        chapter = index,
        excluded,
        leading_notes = classified.count(ParagraphKind::LeadingNote),
        footnotes = classified.count(ParagraphKind::Footnote),
        trailing_notes = classified.count(ParagraphKind::TrailingNote),
        chapter_labels = classified.count(ParagraphKind::ChapterLabel),
        "excluded content"
    );
}

fn snippet(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
