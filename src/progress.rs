use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Callbacks fired by the orchestrator as chapters complete. Every method
/// has a no-op default.
pub trait RunProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_chapter_start(&mut self, _index: u32) {}
    fn on_chapter_done(&mut self, _index: u32, _paragraphs: usize) {}
    fn on_chapter_failed(&mut self, _index: u32, _reason: &str) {}
    fn on_run_finish(&mut self) {}
}

/// Reports nothing. Used by tests and non-interactive callers.
#[derive(Debug, Default)]
pub struct Silent;

impl RunProgress for Silent {}

/// Terminal progress bar with running success/failure counts.
pub struct TerminalProgress {
    bar: ProgressBar,
    succeeded: usize,
    failed: usize,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.green/238}] {pos:>3}/{len} chapters  {msg}  {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self {
            bar,
            succeeded: 0,
            failed: 0,
        }
    }

    fn refresh_message(&self) {
        self.bar
            .set_message(format!("ok {} / failed {}", self.succeeded, self.failed));
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunProgress for TerminalProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(100));
        self.refresh_message();
    }

    fn on_chapter_start(&mut self, index: u32) {
        self.bar.set_prefix(format!("chapter {index}"));
    }

    fn on_chapter_done(&mut self, _index: u32, _paragraphs: usize) {
        self.succeeded += 1;
        self.refresh_message();
        self.bar.inc(1);
    }

    fn on_chapter_failed(&mut self, index: u32, reason: &str) {
        self.failed += 1;
        self.bar.println(format!("  chapter {index} failed: {reason}"));
        self.refresh_message();
        self.bar.inc(1);
    }

    fn on_run_finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
