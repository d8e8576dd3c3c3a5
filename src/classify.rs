//! Paragraph classification.
//!
//! Each paragraph-level node runs through an ordered rule chain; the first
//! rule that matches decides its kind, and anything no rule claims is
//! narrative. Detection always runs. Feature flags only decide whether a
//! detected note or footnote is routed into the output.

use std::collections::HashMap;

use dom_query::{NodeRef, Selection};

use crate::extract::collapse_whitespace;
use crate::inline::InlineParagraph;
use crate::model::{
    ChapterNote, Decision, Footnote, NotePosition, ParagraphKind, ProcessedChapter,
};
use crate::profile::{CompiledProfile, FeatureFlags};

/// A paragraph as the rules see it.
pub struct Paragraph<'a> {
    pub node: &'a NodeRef<'a>,
    /// Visible text, whitespace collapsed and trimmed.
    pub text: String,
}

impl<'a> Paragraph<'a> {
    pub fn new(node: &'a NodeRef<'a>) -> Self {
        Self {
            node,
            text: collapse_whitespace(&node.text()),
        }
    }
}

/// Per-chapter classification state. Created fresh for every chapter.
#[derive(Debug, Clone)]
pub struct ClassifyState {
    narrative_started: bool,
    next_footnote: u32,
}

impl Default for ClassifyState {
    fn default() -> Self {
        Self {
            narrative_started: false,
            next_footnote: 1,
        }
    }
}

impl ClassifyState {
    fn take_footnote_number(&mut self) -> u32 {
        let number = self.next_footnote;
        self.next_footnote += 1;
        number
    }
}

type Rule = fn(&Paragraph<'_>, &ClassifyState, &CompiledProfile) -> bool;

/// Evaluated in order; first match wins.
pub const RULES: &[(ParagraphKind, Rule)] = &[
    (ParagraphKind::LeadingNote, is_leading_note),
    (ParagraphKind::Footnote, is_footnote),
    (ParagraphKind::TrailingNote, is_trailing_note),
    (ParagraphKind::ChapterLabel, is_chapter_label),
];

pub fn classify_paragraph(
    paragraph: &Paragraph<'_>,
    state: &ClassifyState,
    profile: &CompiledProfile,
) -> ParagraphKind {
    RULES
        .iter()
        .find(|(_, rule)| rule(paragraph, state, profile))
        .map_or(ParagraphKind::Narrative, |(kind, _)| *kind)
}

pub fn is_leading_note(p: &Paragraph<'_>, state: &ClassifyState, profile: &CompiledProfile) -> bool {
    !state.narrative_started
        && profile
            .profile
            .leading_note_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && p.text.starts_with(prefix.as_str()))
}

pub fn is_footnote(p: &Paragraph<'_>, _state: &ClassifyState, profile: &CompiledProfile) -> bool {
    footnote_parts(&p.text, profile).is_some()
}

pub fn is_trailing_note(p: &Paragraph<'_>, _state: &ClassifyState, profile: &CompiledProfile) -> bool {
    let lower = p.text.to_lowercase();
    if profile
        .trailing_note_phrases
        .iter()
        .any(|phrase| lower.contains(phrase.as_str()))
    {
        return true;
    }

    if profile
        .profile
        .promo_markers
        .iter()
        .any(|marker| marker.matches(p.node))
    {
        return true;
    }

    let strong = Selection::from(p.node.clone()).select("strong, b");
    strong.nodes().iter().any(|node| {
        let text = collapse_whitespace(&node.text()).to_lowercase();
        profile
            .strong_note_phrases
            .iter()
            .any(|phrase| is_aside_label(&text, phrase))
    })
}

pub fn is_chapter_label(p: &Paragraph<'_>, _state: &ClassifyState, profile: &CompiledProfile) -> bool {
    profile.chapter_labels.iter().any(|re| re.is_match(&p.text))
}

/// `Note`, `Note:` or `Note by X` qualify; `Notebook` does not.
fn is_aside_label(strong_text: &str, phrase: &str) -> bool {
    let Some(rest) = strong_text.strip_prefix(phrase) else {
        return false;
    };
    rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
}

/// Split a footnote definition into (author label, body).
fn footnote_parts<'t>(text: &'t str, profile: &CompiledProfile) -> Option<(&'t str, &'t str)> {
    let caps = profile.footnote_pattern.captures(text)?;
    let label = caps.name("label")?.as_str();
    let body = caps.name("body")?.as_str().trim();
    if !body.contains(profile.profile.footnote_separator.as_str()) {
        return None;
    }
    Some((label, body))
}

/// Output of classifying one chapter's cleaned content.
#[derive(Debug, Clone)]
pub struct Classified {
    pub chapter: ProcessedChapter,
    pub decisions: Vec<Decision>,
}

impl Classified {
    pub fn count(&self, kind: ParagraphKind) -> usize {
        self.decisions.iter().filter(|d| d.kind == kind).count()
    }
}

/// Classify the paragraph-level nodes under `root` in document order.
pub fn classify(
    root: &Selection,
    index: u32,
    title: String,
    profile: &CompiledProfile,
    flags: FeatureFlags,
) -> Classified {
    let mut state = ClassifyState::default();
    let mut chapter = ProcessedChapter {
        index,
        title,
        ..ProcessedChapter::default()
    };
    let mut decisions = Vec::new();
    let mut narrative = Vec::new();
    let mut footnote_numbers: HashMap<String, u32> = HashMap::new();

    let nodes = root.select(&profile.profile.paragraphs);
    for (position, node) in nodes.nodes().iter().enumerate() {
        let paragraph = Paragraph::new(node);
        if paragraph.text.is_empty() {
            continue;
        }

        let kind = classify_paragraph(&paragraph, &state, profile);
        let routed = match kind {
            ParagraphKind::LeadingNote | ParagraphKind::TrailingNote => {
                if flags.include_notes {
                    let note_position = if kind == ParagraphKind::LeadingNote {
                        NotePosition::Leading
                    } else {
                        NotePosition::Trailing
                    };
                    chapter.notes.push(ChapterNote {
                        position: note_position,
                        text: paragraph.text.clone(),
                    });
                }
                flags.include_notes
            }
            ParagraphKind::Footnote => {
                let number = state.take_footnote_number();
                if let Some((label, body)) = footnote_parts(&paragraph.text, profile) {
                    // Known labels are recorded either way so their markers
                    // are dropped rather than kept as text when excluded.
                    footnote_numbers.entry(label.to_owned()).or_insert(number);
                    if flags.include_footnotes {
                        chapter.footnotes.push(Footnote {
                            number,
                            chapter: index,
                            label: label.to_owned(),
                            body: body.to_owned(),
                        });
                    }
                }
                flags.include_footnotes
            }
            ParagraphKind::ChapterLabel => false,
            ParagraphKind::Narrative => {
                state.narrative_started = true;
                narrative.push(InlineParagraph::from_node(node));
                true
            }
        };

        let snippet = excerpt(&paragraph.text);
        tracing::debug!(
            chapter = index,
            position,
            kind = kind.as_str(),
            routed,
            excerpt = %snippet,
            "classified paragraph"
        );
        decisions.push(Decision {
            position,
            kind,
            routed,
            excerpt: snippet,
        });
    }

    chapter.paragraphs = narrative
        .iter()
        .map(|p| p.render(&footnote_numbers, flags.include_footnotes))
        .filter(|p| !p.is_empty())
        .collect();

    Classified { chapter, decisions }
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 80;
    if text.chars().count() <= MAX_CHARS {
        return text.to_owned();
    }
    let mut out = text.chars().take(MAX_CHARS).collect::<String>();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use dom_query::Document;

    use super::*;

    fn profile() -> CompiledProfile {
        CompiledProfile::builtin().expect("builtin profile")
    }

    fn all_flags() -> FeatureFlags {
        FeatureFlags {
            include_footnotes: true,
            include_notes: true,
            ..FeatureFlags::default()
        }
    }

    fn run(body: &str, flags: FeatureFlags) -> Classified {
        let doc = Document::from(format!(r#"<div id="c">{body}</div>"#));
        classify(&doc.select("div#c"), 1, "T".to_owned(), &profile(), flags)
    }

    fn kinds(classified: &Classified) -> Vec<ParagraphKind> {
        classified.decisions.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn rule_chain_is_ordered() {
        let names = RULES.iter().map(|(kind, _)| *kind).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                ParagraphKind::LeadingNote,
                ParagraphKind::Footnote,
                ParagraphKind::TrailingNote,
                ParagraphKind::ChapterLabel,
            ]
        );
    }

    #[test]
    fn leading_prefix_only_counts_before_narrative() {
        let out = run(
            "<p>T/L: hello readers</p><p>The wind rose.</p><p>T/L: late remark</p>",
            all_flags(),
        );
        assert_eq!(
            kinds(&out),
            vec![
                ParagraphKind::LeadingNote,
                ParagraphKind::Narrative,
                ParagraphKind::TrailingNote,
            ]
        );
        assert_eq!(out.chapter.notes[0].position, NotePosition::Leading);
        assert_eq!(out.chapter.notes[1].position, NotePosition::Trailing);
    }

    #[test]
    fn leading_prefix_is_case_sensitive() {
        let out = run("<p>t/l- casual aside</p>", all_flags());
        assert_eq!(kinds(&out), vec![ParagraphKind::Narrative]);
    }

    #[test]
    fn leading_rule_wins_when_trailing_cues_also_match() {
        let out = run(
            "<p>T/N: as always, thanks for reading</p><p>Story.</p>",
            all_flags(),
        );
        assert_eq!(out.decisions[0].kind, ParagraphKind::LeadingNote);
        assert_eq!(out.chapter.notes.len(), 1);
        assert_eq!(out.chapter.notes[0].position, NotePosition::Leading);
    }

    #[test]
    fn footnotes_are_numbered_by_detection_order() {
        let out = run(
            "<p>Story.</p>\
             <p>7. Qi: inner energy</p>\
             <p>More story.</p>\
             <p>2. Dantian: energy centre</p>\
             <p>2. Sect: a school</p>",
            all_flags(),
        );
        let numbers = out
            .chapter
            .footnotes
            .iter()
            .map(|f| (f.number, f.label.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![(1, "7"), (2, "2"), (3, "2")]);
        assert_eq!(out.chapter.footnotes[0].body, "Qi: inner energy");
        assert!(out.chapter.footnotes.iter().all(|f| f.chapter == 1));
    }

    #[test]
    fn numbered_line_without_colon_is_not_a_footnote() {
        let out = run("<p>3. He counted to three</p>", all_flags());
        assert_eq!(kinds(&out), vec![ParagraphKind::Narrative]);
        assert_eq!(out.chapter.paragraphs, vec![r"3\. He counted to three"]);
    }

    #[test]
    fn trailing_note_phrases_are_case_insensitive() {
        let out = run(
            "<p>Story.</p><p>Please SUPPORT us on Patreon!</p><p>As Always, enjoy</p>",
            all_flags(),
        );
        assert_eq!(
            kinds(&out),
            vec![
                ParagraphKind::Narrative,
                ParagraphKind::TrailingNote,
                ParagraphKind::TrailingNote,
            ]
        );
    }

    #[test]
    fn promo_marker_attribute_marks_trailing_note() {
        let out = run(
            r#"<p>Story.</p><p style="text-align: center; font-weight: bold;">Read ahead on our site</p>"#,
            all_flags(),
        );
        assert_eq!(out.decisions[1].kind, ParagraphKind::TrailingNote);
    }

    #[test]
    fn strong_aside_labels_are_notes_but_emphasis_is_not() {
        let out = run(
            "<p><strong>Note:</strong> the next chapter is late</p>\
             <p><strong>Notebook</strong> in hand, she left.</p>\
             <p><b>Translator's Note</b> thanks to the editor</p>",
            all_flags(),
        );
        assert_eq!(
            kinds(&out),
            vec![
                ParagraphKind::TrailingNote,
                ParagraphKind::Narrative,
                ParagraphKind::TrailingNote,
            ]
        );
        assert_eq!(out.chapter.paragraphs, vec!["**Notebook** in hand, she left."]);
    }

    #[test]
    fn chapter_label_echo_is_discarded() {
        let out = run("<p>Chapter 12</p><p>12</p><p>Story.</p>", all_flags());
        assert_eq!(
            kinds(&out),
            vec![
                ParagraphKind::ChapterLabel,
                ParagraphKind::ChapterLabel,
                ParagraphKind::Narrative,
            ]
        );
        assert_eq!(out.chapter.paragraphs, vec!["Story."]);
    }

    #[test]
    fn flags_gate_routing_but_not_detection() {
        let body = "<p>T/N: hi</p><p>Story<sup>1</sup>.</p><p>1. Term: meaning</p>";
        let off = run(body, FeatureFlags::default());
        assert_eq!(
            kinds(&off),
            vec![
                ParagraphKind::LeadingNote,
                ParagraphKind::Narrative,
                ParagraphKind::Footnote,
            ]
        );
        assert!(off.chapter.notes.is_empty());
        assert!(off.chapter.footnotes.is_empty());
        assert_eq!(off.chapter.paragraphs, vec!["Story."]);
        assert!(!off.decisions[0].routed);
        assert!(!off.decisions[2].routed);

        let on = run(body, all_flags());
        assert_eq!(on.chapter.paragraphs, vec!["Story[^1]."]);
        assert_eq!(on.chapter.footnotes.len(), 1);
        assert!(on.decisions.iter().all(|d| d.routed));
    }

    #[test]
    fn superscripts_without_a_footnote_keep_their_text() {
        let body = "<p>On the 5<sup>th</sup> day the hall was 20 m<sup>2</sup> wide.</p>";
        for flags in [FeatureFlags::default(), all_flags()] {
            let out = run(body, flags);
            assert_eq!(
                out.chapter.paragraphs,
                vec!["On the 5th day the hall was 20 m2 wide."]
            );
        }
    }

    #[test]
    fn ambiguous_markup_falls_through_to_narrative() {
        let out = run("<p>:::</p><p>1.</p><p>1.: odd</p>", all_flags());
        assert_eq!(
            kinds(&out),
            vec![
                ParagraphKind::Narrative,
                ParagraphKind::ChapterLabel,
                ParagraphKind::Narrative,
            ]
        );
    }

    #[test]
    fn empty_container_yields_empty_chapter() {
        let out = run("", all_flags());
        assert!(out.chapter.is_empty());
        assert!(out.chapter.footnotes.is_empty());
        assert!(out.chapter.notes.is_empty());
        assert!(out.decisions.is_empty());
    }

    #[test]
    fn paragraphs_keep_document_order() {
        let out = run(
            "<p>One.</p><div><p>Two.</p></div><p>Three.</p>",
            all_flags(),
        );
        assert_eq!(out.chapter.paragraphs, vec!["One.", "Two.", "Three."]);
    }
}
