//! Paragraph markup to inline Markdown.
//!
//! Bold and italic survive as `**`/`*`, `<br>` becomes a hard break, `<sup>`
//! labels become footnote reference placeholders, every other tag is
//! dropped and its text kept. Only characters that CommonMark (with
//! footnotes) would read as syntax are escaped.

use std::collections::HashMap;

use dom_query::NodeRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// A `<sup>` marker carrying the author's footnote label.
    FootnoteRef(String),
}

/// Inline content of one paragraph before footnote references are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineParagraph {
    segments: Vec<Segment>,
}

impl InlineParagraph {
    pub fn from_node(node: &NodeRef) -> Self {
        let mut paragraph = Self::default();
        for child in node.children() {
            paragraph.push_node(&child);
        }
        paragraph
    }

    /// Render to a Markdown string.
    ///
    /// `numbers` maps the labels of detected footnotes to their assigned
    /// numbers. A marker for a detected footnote becomes `[^n]`, or is
    /// dropped when footnotes are excluded. Any other `<sup>` (`5<sup>th</sup>`,
    /// `m<sup>2</sup>`) keeps its text.
    pub fn render(&self, numbers: &HashMap<String, u32>, include_footnotes: bool) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::FootnoteRef(label) => match numbers.get(label) {
                    Some(number) if include_footnotes => out.push_str(&format!("[^{number}]")),
                    Some(_) => {}
                    None => out.push_str(&escape_text(label)),
                },
            }
        }
        tidy(&out)
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Text(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Text(text.to_owned()));
        }
    }

    fn push_node(&mut self, node: &NodeRef) {
        if node.is_text() {
            self.push_text(&escape_text(&node.text()));
            return;
        }
        if !node.is_element() {
            return;
        }

        let name = node
            .node_name()
            .map(|n| n.to_ascii_lowercase())
            .unwrap_or_default();
        match name.as_str() {
            "script" | "style" | "noscript" | "template" => {}
            "br" => self.push_text("\\\n"),
            "strong" | "b" => self.push_wrapped(node, "**"),
            "em" | "i" => self.push_wrapped(node, "*"),
            "sup" => {
                let label = node.text().trim().to_owned();
                if is_footnote_label(&label) {
                    self.segments.push(Segment::FootnoteRef(label));
                } else {
                    self.push_text(&escape_text(&label));
                }
            }
            _ => {
                for child in node.children() {
                    self.push_node(&child);
                }
            }
        }
    }

    /// Wrap the rendered children in `marker`, keeping surrounding
    /// whitespace outside the delimiters so the emphasis still parses.
    fn push_wrapped(&mut self, node: &NodeRef, marker: &str) {
        let mut inner = InlineParagraph::default();
        for child in node.children() {
            inner.push_node(&child);
        }

        for segment in inner.segments {
            match segment {
                Segment::Text(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        self.push_text(&text);
                        continue;
                    }
                    let leading = &text[..text.len() - text.trim_start().len()];
                    let trailing = &text[text.trim_end().len()..];
                    self.push_text(leading);
                    self.push_text(&format!("{marker}{trimmed}{marker}"));
                    self.push_text(trailing);
                }
                reference @ Segment::FootnoteRef(_) => self.segments.push(reference),
            }
        }
    }
}

fn is_footnote_label(label: &str) -> bool {
    !label.is_empty() && label.len() <= 4 && label.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Escape characters that carry inline Markdown meaning and collapse
/// whitespace runs to single spaces.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        let escape = match ch {
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' => true,
            '&' => starts_entity(&text[i + ch.len_utf8()..]),
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// `&amp;`, `&#169;`: text that a Markdown renderer would decode.
fn starts_entity(rest: &str) -> bool {
    let name_len = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '#')
        .count();
    name_len > 0 && rest[name_len..].starts_with(';')
}

/// Escape a plain-text string for use as a single Markdown paragraph.
pub fn escape_paragraph(text: &str) -> String {
    guard_block_start(escape_text(text).trim())
}

/// Collapse spaces per line and guard every line start, since a line after a
/// hard break can open a block just like the first one.
fn tidy(text: &str) -> String {
    text.split("\\\n")
        .map(|line| {
            let line = line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
            guard_block_start(&line)
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\\\n")
}

/// Escape a leading character that would otherwise open a block construct
/// (heading, list item, block quote, thematic break).
fn guard_block_start(text: &str) -> String {
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && digits <= 9 {
        let rest = &text[digits..];
        if rest.starts_with('.') || rest.starts_with(')') {
            return format!("{}\\{rest}", &text[..digits]);
        }
        return text.to_owned();
    }
    match text.chars().next() {
        Some('#' | '-' | '+' | '=' | '>') => format!("\\{text}"),
        _ => text.to_owned(),
    }
}
