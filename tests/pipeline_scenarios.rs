use std::collections::HashMap;
use std::io::{Cursor, Read as _};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use novelbook::epub;
use novelbook::fetch::{FetchSettings, HttpFetcher};
use novelbook::model::{BookMetadata, NotePosition};
use novelbook::pipeline::{self, RunOptions};
use novelbook::profile::{CompiledProfile, FeatureFlags};
use novelbook::progress::Silent;

mod novel_site;

use novel_site::{NovelSite, Route, awakening_page, chapter_page, chapter_path};

const NOVEL: &str = "story";

fn fast_fetcher() -> HttpFetcher {
    HttpFetcher::new(FetchSettings {
        timeout: Duration::from_secs(5),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(5),
        min_interval: Duration::ZERO,
        failure_backoff_unit: Duration::from_millis(1),
        ..FetchSettings::default()
    })
    .expect("build fetcher")
}

fn options(include_footnotes: bool, include_notes: bool) -> RunOptions {
    RunOptions {
        delay: Duration::ZERO,
        flags: FeatureFlags {
            include_footnotes,
            include_notes,
            ..FeatureFlags::default()
        },
    }
}

#[test]
fn awakening_chapter_is_split_into_narrative_footnotes_and_notes() {
    let site = NovelSite::spawn(HashMap::from([(
        chapter_path(NOVEL, 1),
        Route::Html(awakening_page()),
    )]));
    let profile = CompiledProfile::builtin().expect("profile");
    let mut fetcher = fast_fetcher();

    let requests = pipeline::chapter_requests(&site.base_url, NOVEL, 1..=1);
    let report = pipeline::run(
        &requests,
        &mut fetcher,
        &profile,
        &options(true, true),
        &AtomicBool::new(false),
        &mut Silent,
    );

    assert!(report.failed.is_empty(), "failures: {:?}", report.failed);
    let chapter = &report.succeeded[0];
    assert_eq!(chapter.title, "Chapter 1: Awakening");
    assert_eq!(
        chapter.paragraphs,
        vec![
            "The morning came *slowly*.".to_owned(),
            "He drew the blade[^1] and **waited**.".to_owned(),
            "It shone.".to_owned(),
        ]
    );
    assert_eq!(chapter.footnotes.len(), 1);
    assert_eq!(chapter.footnotes[0].number, 1);
    assert_eq!(
        chapter.footnotes[0].body,
        "The protagonist's sword, named after: legend"
    );
    assert_eq!(chapter.notes.len(), 2);
    assert_eq!(chapter.notes[0].position, NotePosition::Leading);
    assert_eq!(chapter.notes[0].text, "T/N: enjoy!");
    assert_eq!(chapter.notes[1].position, NotePosition::Trailing);
}

#[test]
fn disabled_flags_drop_footnotes_notes_and_markers() {
    let site = NovelSite::spawn(HashMap::from([(
        chapter_path(NOVEL, 1),
        Route::Html(awakening_page()),
    )]));
    let profile = CompiledProfile::builtin().expect("profile");
    let mut fetcher = fast_fetcher();

    let requests = pipeline::chapter_requests(&site.base_url, NOVEL, 1..=1);
    let report = pipeline::run(
        &requests,
        &mut fetcher,
        &profile,
        &options(false, false),
        &AtomicBool::new(false),
        &mut Silent,
    );

    let chapter = &report.succeeded[0];
    assert_eq!(chapter.paragraphs.len(), 3);
    assert_eq!(chapter.paragraphs[1], "He drew the blade and **waited**.");
    assert!(chapter.footnotes.is_empty());
    assert!(chapter.notes.is_empty());
}

#[test]
fn failing_chapter_is_skipped_and_the_book_has_a_gap() {
    let mut routes = HashMap::new();
    for index in 1..=10 {
        let route = if index == 5 {
            Route::Status(500)
        } else {
            Route::Html(chapter_page(
                &format!("Chapter {index}"),
                &format!("<p>Body of chapter {index}.</p>"),
            ))
        };
        routes.insert(chapter_path(NOVEL, index), route);
    }
    let site = NovelSite::spawn(routes);
    let profile = CompiledProfile::builtin().expect("profile");
    let mut fetcher = fast_fetcher();

    let requests = pipeline::chapter_requests(&site.base_url, NOVEL, 1..=10);
    let report = pipeline::run(
        &requests,
        &mut fetcher,
        &profile,
        &options(false, false),
        &AtomicBool::new(false),
        &mut Silent,
    );

    let indices: Vec<u32> = report.succeeded.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 5);
    assert!(report.failed[0].reason.contains("HTTP 500"));
    assert!(report.failed[0].reason.contains("3 attempt(s)"));
    assert_eq!(site.hits(&chapter_path(NOVEL, 5)), 3);
    assert_eq!(site.hits(&chapter_path(NOVEL, 6)), 1);

    let bytes = epub::assemble(
        &BookMetadata::new("Gap Test"),
        &report.succeeded,
        None,
        FeatureFlags::default(),
    )
    .expect("assemble");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open epub");
    assert!(archive.by_name("OEBPS/chap_009.xhtml").is_ok());
    assert!(archive.by_name("OEBPS/chap_010.xhtml").is_err());

    let mut fifth = String::new();
    archive
        .by_name("OEBPS/chap_005.xhtml")
        .expect("fifth entry")
        .read_to_string(&mut fifth)
        .expect("read fifth entry");
    assert!(fifth.contains("<h1>Chapter 6</h1>"));
}

#[test]
fn chapter_with_only_noise_is_delivered_empty() {
    let site = NovelSite::spawn(HashMap::from([(
        chapter_path(NOVEL, 3),
        Route::Html(chapter_page(
            "Chapter 3",
            "<script>var a = 1;</script><style>p { color: red; }</style><p>   </p><div><span></span></div>",
        )),
    )]));
    let profile = CompiledProfile::builtin().expect("profile");
    let mut fetcher = fast_fetcher();

    let requests = pipeline::chapter_requests(&site.base_url, NOVEL, 3..=3);
    let report = pipeline::run(
        &requests,
        &mut fetcher,
        &profile,
        &options(true, true),
        &AtomicBool::new(false),
        &mut Silent,
    );

    assert!(report.failed.is_empty());
    let chapter = &report.succeeded[0];
    assert!(chapter.paragraphs.is_empty());
    assert!(chapter.footnotes.is_empty());
    assert!(chapter.notes.is_empty());
    assert_eq!(report.empty_chapters().collect::<Vec<_>>(), vec![3]);
}

#[test]
fn missing_container_fails_only_that_chapter() {
    let site = NovelSite::spawn(HashMap::from([
        (
            chapter_path(NOVEL, 1),
            Route::Html("<html><body><article><p>moved</p></article></body></html>".to_owned()),
        ),
        (
            chapter_path(NOVEL, 2),
            Route::Html(chapter_page("Chapter 2", "<p>Still here.</p>")),
        ),
    ]));
    let profile = CompiledProfile::builtin().expect("profile");
    let mut fetcher = fast_fetcher();

    let requests = pipeline::chapter_requests(&site.base_url, NOVEL, 1..=2);
    let report = pipeline::run(
        &requests,
        &mut fetcher,
        &profile,
        &options(false, false),
        &AtomicBool::new(false),
        &mut Silent,
    );

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert!(report.failed[0].reason.contains("content container not found"));
    assert_eq!(site.hits(&chapter_path(NOVEL, 1)), 1);
}
