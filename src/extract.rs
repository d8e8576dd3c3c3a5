use std::borrow::Cow;

use dom_query::{Document, Selection};

use crate::error::ChapterError;
use crate::profile::{CompiledProfile, FeatureFlags};

/// The located parts of one chapter page.
///
/// `document` is the whole page with comment regions already removed; the
/// container is looked up in place, so any element (`td`, `body`) works and
/// later stages mutate the owned document.
pub struct ExtractedChapter {
    pub index: u32,
    pub title: String,
    pub document: Document,
    content_css: String,
}

impl ExtractedChapter {
    /// The content container element.
    pub fn content_root(&self) -> Selection<'_> {
        self.document.select(&self.content_css).first()
    }

    pub fn content_html(&self) -> String {
        self.content_root().html().to_string()
    }
}

impl std::fmt::Debug for ExtractedChapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedChapter")
            .field("index", &self.index)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// Locate title and content container in a raw chapter page.
///
/// A missing content container fails the chapter; a missing or blank title
/// falls back to `Chapter N`.
pub fn extract(
    html: &str,
    index: u32,
    profile: &CompiledProfile,
    flags: FeatureFlags,
) -> Result<ExtractedChapter, ChapterError> {
    let page = Document::from(&*strip_comment_regions(html, profile));

    let content_css = profile.profile.content.to_css();
    let content = page.select(&content_css);
    if content.length() == 0 {
        return Err(ChapterError::ContentNotFound {
            selector: content_css,
        });
    }
    if content.length() > 1 {
        tracing::warn!(
            chapter = index,
            selector = %content_css,
            matches = content.length(),
            "content selector matched more than one element; using the first"
        );
    }

    let title = chapter_title(&page, index, profile, flags);

    Ok(ExtractedChapter {
        index,
        title,
        document: page,
        content_css,
    })
}

fn chapter_title(
    page: &Document,
    index: u32,
    profile: &CompiledProfile,
    flags: FeatureFlags,
) -> String {
    let fallback = format!("Chapter {index}");
    if flags.simple_chapter_names || profile.profile.title.is_empty() {
        return fallback;
    }

    let title = page.select(&profile.profile.title.to_css()).first().text();
    let title = collapse_whitespace(&title);
    if title.is_empty() {
        tracing::debug!(chapter = index, "title element missing or empty; using default");
        return fallback;
    }
    title
}

/// Drop markup enclosed by the profile's comment markers. Works on the raw
/// page because the DOM does not expose comment nodes.
pub fn strip_comment_regions<'a>(html: &'a str, profile: &CompiledProfile) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(html);
    for region in &profile.comment_regions {
        if region.is_match(&out) {
            out = Cow::Owned(region.replace_all(&out, "").into_owned());
        }
    }
    out
}

pub(crate) fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteProfile;
    use crate::selector::ElementSelector;

    fn profile() -> CompiledProfile {
        CompiledProfile::builtin().expect("builtin profile")
    }

    #[test]
    fn extracts_title_and_container() {
        let html = r#"<html><body>
            <span class="chapter-title">  Chapter 1:
              Awakening </span>
            <div id="chapter-container"><p>First.</p></div>
            <div id="comments"><p>not content</p></div>
        </body></html>"#;
        let chapter = extract(html, 1, &profile(), FeatureFlags::default()).expect("extract");
        assert_eq!(chapter.title, "Chapter 1: Awakening");
        let root = chapter.content_root();
        assert_eq!(root.attr("id").as_deref(), Some("chapter-container"));
        assert_eq!(root.select("p").length(), 1);
        assert!(!chapter.content_html().contains("not content"));
    }

    #[test]
    fn missing_container_is_content_not_found() {
        let html = r#"<span class="chapter-title">T</span><div id="other"><p>x</p></div>"#;
        let err = extract(html, 3, &profile(), FeatureFlags::default()).expect_err("must fail");
        assert!(matches!(err, ChapterError::ContentNotFound { .. }));
    }

    #[test]
    fn missing_or_blank_title_defaults_to_chapter_number() {
        let html = r#"<div id="chapter-container"><p>x</p></div>"#;
        let chapter = extract(html, 7, &profile(), FeatureFlags::default()).expect("extract");
        assert_eq!(chapter.title, "Chapter 7");

        let html = r#"<span class="chapter-title">   </span><div id="chapter-container"></div>"#;
        let chapter = extract(html, 8, &profile(), FeatureFlags::default()).expect("extract");
        assert_eq!(chapter.title, "Chapter 8");
    }

    #[test]
    fn simple_chapter_names_ignore_page_title() {
        let html = r#"<span class="chapter-title">The Long Night</span>
            <div id="chapter-container"><p>x</p></div>"#;
        let flags = FeatureFlags {
            simple_chapter_names: true,
            ..FeatureFlags::default()
        };
        let chapter = extract(html, 12, &profile(), flags).expect("extract");
        assert_eq!(chapter.title, "Chapter 12");
    }

    #[test]
    fn tolerates_unclosed_tags() {
        let html = r#"<span class="chapter-title">Broken<div id="chapter-container"><p>one<p>two<div>"#;
        let chapter = extract(html, 1, &profile(), FeatureFlags::default()).expect("extract");
        assert_eq!(chapter.content_root().select("p").length(), 2);
    }

    #[test]
    fn table_cell_container_keeps_its_paragraphs() {
        let profile = SiteProfile {
            content: ElementSelector::tag("td"),
            ..SiteProfile::default()
        }
        .compile()
        .expect("compile");
        let html = r#"<html><body><table><tr>
            <td><p>First line.</p><p>Second line.</p></td>
            <td><p>sidebar</p></td>
        </tr></table></body></html>"#;
        let chapter = extract(html, 1, &profile, FeatureFlags::default()).expect("extract");
        let root = chapter.content_root();
        assert!(root.is("td"));
        assert_eq!(root.select("p").length(), 2);
        assert!(!root.text().contains("sidebar"));
    }

    #[test]
    fn body_container_keeps_every_child() {
        let profile = SiteProfile {
            content: ElementSelector::tag("body"),
            ..SiteProfile::default()
        }
        .compile()
        .expect("compile");
        let html = "<html><body><p>one</p><p>two</p><p>three</p></body></html>";
        let chapter = extract(html, 1, &profile, FeatureFlags::default()).expect("extract");
        let root = chapter.content_root();
        assert!(root.is("body"));
        assert_eq!(root.select("p").length(), 3);
    }

    #[test]
    fn comment_regions_are_removed_from_container() {
        let html = r#"<div id="chapter-container"><p>keep</p><!--sse--><p>ad copy</p><!--/sse--><p>also keep</p></div>"#;
        let chapter = extract(html, 1, &profile(), FeatureFlags::default()).expect("extract");
        let text = chapter.content_root().text().to_string();
        assert!(text.contains("keep"));
        assert!(text.contains("also keep"));
        assert!(!text.contains("ad copy"));
    }
}
