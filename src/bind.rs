use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context as _;

use crate::cli::BindArgs;
use crate::cover::{CoverImage, prepare_cover};
use crate::epub;
use crate::fetch::{DEFAULT_USER_AGENT, FetchSettings, Fetcher, HttpFetcher, validate_url};
use crate::model::BookMetadata;
use crate::pipeline::{self, RunOptions, RunReport};
use crate::profile::{FeatureFlags, SiteProfile};
use crate::progress::{RunProgress, Silent, TerminalProgress};

pub fn run(args: BindArgs, debug: bool) -> anyhow::Result<()> {
    if args.end < args.start {
        anyhow::bail!(
            "chapter range is empty: --start {} is after --end {}",
            args.start,
            args.end
        );
    }

    let profile_path = args.profile.as_deref().map(Path::new);
    let profile = SiteProfile::load_or_default(profile_path)
        .context("load site profile")?
        .compile()
        .context("compile site profile")?;

    let flags = FeatureFlags {
        include_footnotes: args.include_footnotes,
        include_notes: args.include_notes,
        simple_chapter_names: args.simple_chapter_names,
        debug,
    };

    let mut fetcher = HttpFetcher::new(FetchSettings {
        timeout: Duration::from_secs(args.timeout_secs),
        max_attempts: args.max_retries,
        retry_backoff: Duration::from_millis(args.retry_backoff_ms),
        user_agent: args
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
        ..FetchSettings::default()
    })?;

    let out_path = match &args.out {
        Some(out) => PathBuf::from(out),
        None => PathBuf::from(epub::default_file_name(&args.title)),
    };
    if out_path.exists() && !args.force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }

    let metadata = BookMetadata {
        author: args.author.clone(),
        translator: args.translator.clone(),
        publisher: args.creator.clone(),
        ..BookMetadata::new(args.title.clone())
    };

    let cover = match &args.cover_url {
        Some(url) => fetch_cover(&mut fetcher, url),
        None => None,
    };

    tracing::info!(
        base_url = %args.base_url,
        novel = %args.novel,
        start = args.start,
        end = args.end,
        "bind: fetch chapters"
    );
    let requests = pipeline::chapter_requests(&args.base_url, &args.novel, args.start..=args.end);
    let options = RunOptions {
        delay: Duration::from_millis(args.delay_ms),
        flags,
    };
    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&cancel));
    let mut progress: Box<dyn RunProgress> = if args.quiet || flags.debug {
        Box::new(Silent)
    } else {
        Box::new(TerminalProgress::new())
    };
    let report = pipeline::run(
        &requests,
        &mut fetcher,
        &profile,
        &options,
        &cancel,
        progress.as_mut(),
    );

    if report.succeeded.is_empty() {
        print_summary(&report, None);
        anyhow::bail!(
            "no chapters were downloaded ({} failed)",
            report.failed.len()
        );
    }

    tracing::info!(chapters = report.succeeded.len(), "bind: assemble epub");
    let bytes = epub::assemble(&metadata, &report.succeeded, cover.as_ref(), flags)
        .context("assemble epub")?;
    epub::write_epub(&out_path, &bytes, args.force).context("write epub")?;

    print_summary(&report, Some(&out_path));
    Ok(())
}

/// First Ctrl-C stops the run after the current chapter; what was fetched
/// so far is still bound. A second Ctrl-C exits at once.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::debug!(?err, "interrupt handler unavailable");
                return;
            }
        };
        if runtime.block_on(watch_interrupts(tokio::signal::ctrl_c, &cancel)) == Interrupt::Forced {
            tracing::error!("second interrupt received; exiting without binding");
            std::process::exit(130);
        }
    });
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Signals could not be received; the run continues.
    Unavailable,
    Forced,
}

async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: &AtomicBool) -> Interrupt
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(err) = next_signal().await {
        tracing::debug!(?err, "interrupt handler unavailable");
        return Interrupt::Unavailable;
    }
    tracing::warn!("interrupt received; stopping after the current chapter (Ctrl-C again to quit)");
    cancel.store(true, Ordering::SeqCst);

    match next_signal().await {
        Ok(()) => Interrupt::Forced,
        Err(err) => {
            tracing::debug!(?err, "interrupt handler unavailable");
            Interrupt::Unavailable
        }
    }
}

fn fetch_cover(fetcher: &mut HttpFetcher, url: &str) -> Option<CoverImage> {
    let prepared = validate_url(url)
        .map_err(anyhow::Error::from)
        .and_then(|url| fetcher.fetch_bytes(url.as_str()).map_err(anyhow::Error::from))
        .and_then(|raw| prepare_cover(&raw));
    fetcher.reset_backoff();
    match prepared {
        Ok(cover) => {
            tracing::info!(width = cover.width, height = cover.height, "cover prepared");
            Some(cover)
        }
        Err(err) => {
            tracing::warn!(url, error = %format!("{err:#}"), "cover unavailable; continuing without it");
            None
        }
    }
}

fn print_summary(report: &RunReport, out_path: Option<&Path>) {
    println!("chapters downloaded: {}", report.succeeded.len());
    println!("chapters failed: {}", report.failed.len());
    for failed in &report.failed {
        println!("  chapter {}: {}", failed.index, failed.reason);
    }
    let empty: Vec<String> = report.empty_chapters().map(|i| i.to_string()).collect();
    if !empty.is_empty() {
        println!("chapters without narrative: {}", empty.join(", "));
    }
    if report.cancelled {
        println!("run cancelled before the last chapter");
    }
    if let Some(out_path) = out_path {
        println!("epub: {}", out_path.display());
    }
}
