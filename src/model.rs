use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chapter to fetch: novel base URL plus chapter index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRequest {
    pub base_url: String,
    pub novel: String,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct RawPage {
    pub html: String,
    pub url: String,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    /// Rank among all footnotes detected in the chapter, starting at 1.
    pub number: u32,
    pub chapter: u32,
    /// The author's own label (the leading digits), kept for marker lookup.
    pub label: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotePosition {
    Leading,
    Trailing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterNote {
    pub position: NotePosition,
    pub text: String,
}

/// Terminal artifact of extraction: decoupled from the DOM.
///
/// `paragraphs` hold inline Markdown: `**bold**`, `*italic*`, `[^n]`
/// footnote references, everything else escaped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedChapter {
    pub index: u32,
    pub title: String,
    pub paragraphs: Vec<String>,
    pub footnotes: Vec<Footnote>,
    pub notes: Vec<ChapterNote>,
}

impl ProcessedChapter {
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

/// What a paragraph was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphKind {
    LeadingNote,
    Footnote,
    TrailingNote,
    ChapterLabel,
    Narrative,
}

impl ParagraphKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParagraphKind::LeadingNote => "leading_note",
            ParagraphKind::Footnote => "footnote",
            ParagraphKind::TrailingNote => "trailing_note",
            ParagraphKind::ChapterLabel => "chapter_label",
            ParagraphKind::Narrative => "narrative",
        }
    }
}

/// One classification decision, kept for debug inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub position: usize,
    pub kind: ParagraphKind,
    /// Whether the paragraph reached the output (feature flags permitting).
    pub routed: bool,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedChapter {
    pub index: u32,
    pub reason: String,
}

/// Metadata handed to the assembler alongside the chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: Option<String>,
    pub translator: Option<String>,
    pub publisher: Option<String>,
    pub language: String,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            translator: None,
            publisher: None,
            language: "en".to_owned(),
        }
    }
}
