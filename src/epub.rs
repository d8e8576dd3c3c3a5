use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write as _};
use std::path::Path;

use anyhow::Context as _;
use chrono::Utc;
use pulldown_cmark::{Options, Parser};
use zip::write::SimpleFileOptions;

use crate::cover::CoverImage;
use crate::inline::escape_paragraph;
use crate::model::{BookMetadata, ProcessedChapter};
use crate::profile::FeatureFlags;

/// Build an EPUB 3 archive in memory.
///
/// Chapters are written in the order given; the caller has already dropped
/// chapters that failed.
pub fn assemble(
    metadata: &BookMetadata,
    chapters: &[ProcessedChapter],
    cover: Option<&CoverImage>,
    flags: FeatureFlags,
) -> anyhow::Result<Vec<u8>> {
    if chapters.is_empty() {
        anyhow::bail!("cannot assemble a book without chapters");
    }

    let lang = metadata.language.trim();
    let lang = if lang.is_empty() { "und" } else { lang };

    let pages = chapters
        .iter()
        .enumerate()
        .map(|(idx, chapter)| ChapterPage {
            stem: format!("chap_{:03}", idx + 1),
            title: chapter.title.clone(),
            body_html: render_chapter_body(chapter, flags),
        })
        .collect::<Vec<_>>();

    let uuid = uuid::Uuid::new_v4();
    let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let container_xml = render_container_xml();
    let css = default_style_css();
    let nav_xhtml = render_nav_xhtml(&metadata.title, lang, &pages);
    let toc_ncx = render_toc_ncx(&metadata.title, uuid, &pages);
    let content_opf = render_content_opf(metadata, lang, uuid, &modified, &pages, cover);

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    // `mimetype` must be the first entry, stored uncompressed.
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(b"application/epub+zip")
        .context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("META-INF/container.xml".to_owned(), container_xml.into_bytes()),
        ("OEBPS/content.opf".to_owned(), content_opf.into_bytes()),
        ("OEBPS/nav.xhtml".to_owned(), nav_xhtml.into_bytes()),
        ("OEBPS/toc.ncx".to_owned(), toc_ncx.into_bytes()),
        ("OEBPS/style.css".to_owned(), css.into_bytes()),
    ];
    if let Some(cover) = cover {
        entries.push((
            "OEBPS/cover.xhtml".to_owned(),
            render_cover_xhtml(&metadata.title, lang, cover).into_bytes(),
        ));
        entries.push((format!("OEBPS/{}", cover.file_name), cover.bytes.clone()));
    }
    for page in &pages {
        let xhtml = wrap_xhtml_document(&page.title, lang, &page.body_html);
        entries.push((format!("OEBPS/{}.xhtml", page.stem), xhtml.into_bytes()));
    }

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), deflated_options)
            .with_context(|| format!("epub start_file {name}"))?;
        zip.write_all(&bytes)
            .with_context(|| format!("epub write {name}"))?;
    }

    let cursor = zip.finish().context("epub finish zip")?;
    Ok(cursor.into_inner())
}

/// Write assembled bytes, refusing to clobber an existing file unless
/// `force` is set.
pub fn write_epub(out_path: &Path, bytes: &[u8], force: bool) -> anyhow::Result<()> {
    if out_path.exists() && !force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create epub parent dir: {}", parent.display()))?;
    }

    let mut out_options = OpenOptions::new();
    out_options.write(true);
    if force {
        out_options.create(true).truncate(true);
    } else {
        out_options.create_new(true);
    }
    let mut file = out_options
        .open(out_path)
        .with_context(|| format!("open epub output: {}", out_path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("write epub: {}", out_path.display()))?;
    file.flush()
        .with_context(|| format!("flush epub: {}", out_path.display()))?;
    Ok(())
}

/// `My Novel: Part 2` -> `my_novel_part_2.epub`
pub fn default_file_name(title: &str) -> String {
    let stem = title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if stem.is_empty() {
        "book.epub".to_owned()
    } else {
        format!("{stem}.epub")
    }
}

#[derive(Debug)]
struct ChapterPage {
    stem: String,
    title: String,
    body_html: String,
}

fn render_chapter_body(chapter: &ProcessedChapter, flags: FeatureFlags) -> String {
    let mut md = chapter.paragraphs.join("\n\n");

    if flags.include_footnotes && !chapter.footnotes.is_empty() {
        // The blank lines end the raw HTML blocks so the definitions between
        // them are still parsed as Markdown.
        md.push_str("\n\n<div class=\"footnotes\">\n<hr />\n<h3>Footnotes</h3>\n\n");
        for footnote in &chapter.footnotes {
            md.push_str(&format!(
                "[^{}]: {}\n\n",
                footnote.number,
                escape_paragraph(&footnote.body)
            ));
        }
        md.push_str("</div>\n");
    }

    let mut out = String::new();
    out.push_str(&format!("<h1>{}</h1>\n", xml_escape(&chapter.title)));
    out.push_str("<div class=\"chapter-content\">\n");
    out.push_str(&markdown_to_html_fragment(&md));
    out.push_str("</div>\n");

    if flags.include_notes && !chapter.notes.is_empty() {
        let notes_md = chapter
            .notes
            .iter()
            .map(|note| escape_paragraph(&note.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        out.push_str("<div class=\"chapter-notes\">\n<hr />\n<h3>Chapter Notes</h3>\n");
        out.push_str(&markdown_to_html_fragment(&notes_md));
        out.push_str("</div>\n");
    }

    out
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> String {
    r#"@charset "utf-8";

body { font-family: "Times New Roman", serif; margin: 5%; text-align: justify; }
h1 { text-align: center; font-size: 2em; margin: 1em 0 2em 0; }
h3 { margin-top: 1.5em; }
p { margin: 1em 0; }
img { max-width: 100%; height: auto; }
.chapter-content { line-height: 1.6; }
.footnotes { margin-top: 3em; font-size: 0.9em; }
.footnote-definition { margin: 0.5em 0; font-size: 0.9em; }
.chapter-notes { margin-top: 3em; padding-top: 1em; border-top: 1px solid #ccc; font-size: 0.9em; font-style: italic; }
sup { vertical-align: super; font-size: 0.8em; }
a { color: #000000; text-decoration: none; }
.cover { text-align: center; margin: 0; padding: 0; }
"#
    .to_string()
}

fn render_nav_xhtml(title: &str, lang: &str, chapters: &[ChapterPage]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{}</h1>\n", xml_escape(title)));
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for ch in chapters {
        out.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            xml_escape(&ch.stem),
            xml_escape(&ch.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(title: &str, uuid: uuid::Uuid, chapters: &[ChapterPage]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"urn:uuid:{uuid}\" />\n"
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("  </head>\n");
    out.push_str(&format!(
        "  <docTitle><text>{}</text></docTitle>\n",
        xml_escape(title)
    ));
    out.push_str("  <navMap>\n");
    for (idx, ch) in chapters.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
        ));
        out.push_str(&format!(
            "      <navLabel><text>{}</text></navLabel>\n",
            xml_escape(&ch.title)
        ));
        out.push_str(&format!(
            "      <content src=\"{}.xhtml\" />\n",
            xml_escape(&ch.stem)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn render_content_opf(
    metadata: &BookMetadata,
    lang: &str,
    uuid: uuid::Uuid,
    modified: &str,
    chapters: &[ChapterPage],
    cover: Option<&CoverImage>,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(lang)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">urn:uuid:{uuid}</dc:identifier>\n"
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&metadata.title)
    ));
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(lang)
    ));
    if let Some(author) = non_blank(metadata.author.as_deref()) {
        out.push_str(&format!(
            "    <dc:creator id=\"author\">{}</dc:creator>\n",
            xml_escape(author)
        ));
        out.push_str(
            "    <meta refines=\"#author\" property=\"role\" scheme=\"marc:relators\">aut</meta>\n",
        );
    }
    if let Some(translator) = non_blank(metadata.translator.as_deref()) {
        out.push_str(&format!(
            "    <dc:contributor id=\"translator\">{}</dc:contributor>\n",
            xml_escape(translator)
        ));
        out.push_str(
            "    <meta refines=\"#translator\" property=\"role\" scheme=\"marc:relators\">trl</meta>\n",
        );
    }
    if let Some(publisher) = non_blank(metadata.publisher.as_deref()) {
        out.push_str(&format!(
            "    <dc:publisher>{}</dc:publisher>\n",
            xml_escape(publisher)
        ));
    }
    if cover.is_some() {
        out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
    }
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(modified)
    ));
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");
    if let Some(cover) = cover {
        out.push_str(&format!(
            "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\" />\n",
            xml_escape(cover.file_name),
            xml_escape(cover.media_type)
        ));
        out.push_str(
            "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\" />\n",
        );
    }

    for ch in chapters {
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            xml_escape(&ch.stem),
            xml_escape(&ch.stem)
        ));
    }

    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\">\n");
    if cover.is_some() {
        out.push_str("    <itemref idref=\"cover\" />\n");
    }
    out.push_str("    <itemref idref=\"nav\" />\n");
    for ch in chapters {
        out.push_str(&format!(
            "    <itemref idref=\"{}\" />\n",
            xml_escape(&ch.stem)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn render_cover_xhtml(title: &str, lang: &str, cover: &CoverImage) -> String {
    let body = format!(
        "<div class=\"cover\"><img src=\"{}\" alt=\"{}\" /></div>\n",
        xml_escape(cover.file_name),
        xml_escape(title)
    );
    wrap_xhtml_document(title, lang, &body)
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn markdown_to_html_fragment(md: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(md, options);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
