//! EPUB output: render the chapter list into an EPUB 3 container.
//!
//! The writer never patches an existing book. Each call rebuilds the whole
//! container from the chapters it is given and swaps it into place with a
//! rename, so the temporary book on disk is either the previous complete
//! version or the new complete version.
//!
//! Output is deterministic: entries are written in a fixed order with a fixed
//! timestamp, so the same chapters and metadata yield byte-identical files.
//!
//! ## Layout
//!
//! ```text
//! mimetype                    (stored, first entry)
//! META-INF/container.xml
//! OEBPS/content.opf           package document, spine = nav + chapters
//! OEBPS/toc.ncx               EPUB 2 navigation for older readers
//! OEBPS/nav.xhtml             EPUB 3 navigation
//! OEBPS/style/book.css
//! OEBPS/chap_001.xhtml …
//! ```

use crate::document::{Alignment, BookMetadata, Chapter, ContentBlock, MAX_HEADING_LEVEL};
use crate::error::Pdf2EpubError;
use async_trait::async_trait;
use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Renders accumulated chapters into a book on disk.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Write a complete book for `chapters` to `dest`, replacing any file there.
    async fn render(
        &self,
        chapters: &[Chapter],
        meta: &BookMetadata,
        dest: &Path,
    ) -> Result<(), Pdf2EpubError>;

    /// Regenerate an existing partial book from the full chapter list.
    async fn render_incremental(
        &self,
        existing: &Path,
        chapters: &[Chapter],
        meta: &BookMetadata,
    ) -> Result<(), Pdf2EpubError> {
        self.render(chapters, meta, existing).await
    }
}

/// Zip-based EPUB 3 writer.
#[derive(Debug, Clone, Default)]
pub struct EpubWriter;

#[async_trait]
impl OutputWriter for EpubWriter {
    async fn render(
        &self,
        chapters: &[Chapter],
        meta: &BookMetadata,
        dest: &Path,
    ) -> Result<(), Pdf2EpubError> {
        let chapters = chapters.to_vec();
        let meta = meta.clone();
        let bytes = tokio::task::spawn_blocking(move || build_epub(&chapters, &meta))
            .await
            .map_err(|e| Pdf2EpubError::Internal(format!("EPUB task panicked: {}", e)))?
            .map_err(|e| Pdf2EpubError::Internal(format!("EPUB packaging failed: {}", e)))?;

        write_atomic(dest, &bytes).await?;
        debug!("Wrote {} ({} bytes)", dest.display(), bytes.len());
        Ok(())
    }
}

/// Write to `<dest>.tmp`, then rename over `dest`.
pub(crate) async fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), Pdf2EpubError> {
    let io_err = |e| Pdf2EpubError::OutputWriteFailed {
        path: dest.to_path_buf(),
        source: e,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp_name = dest.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp_path, dest).await.map_err(io_err)?;
    Ok(())
}

/// Package `chapters` into EPUB bytes.
pub fn build_epub(chapters: &[Chapter], meta: &BookMetadata) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file("mimetype", entry_options(CompressionMethod::Stored))?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", entry_options(CompressionMethod::Deflated))?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", entry_options(CompressionMethod::Deflated))?;
    zip.write_all(content_opf(chapters, meta).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", entry_options(CompressionMethod::Deflated))?;
    zip.write_all(toc_ncx(chapters, meta).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", entry_options(CompressionMethod::Deflated))?;
    zip.write_all(nav_xhtml(chapters, meta).as_bytes())?;

    zip.start_file("OEBPS/style/book.css", entry_options(CompressionMethod::Deflated))?;
    zip.write_all(BOOK_CSS.as_bytes())?;

    for (i, chapter) in chapters.iter().enumerate() {
        zip.start_file(
            format!("OEBPS/{}", chapter_file(i)),
            entry_options(CompressionMethod::Deflated),
        )?;
        zip.write_all(chapter_xhtml(chapter, i, &meta.language).as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
}

// ── Package documents ────────────────────────────────────────────────────────

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const BOOK_CSS: &str = r#"@namespace epub "http://www.idpf.org/2007/ops";
body { font-family: Arial, Helvetica, sans-serif; }
h1 { text-align: center; }
h2, h3, h4, h5, h6 { text-align: left; }
p { text-indent: 2em; line-height: 1.5em; text-align: justify; }
"#;

/// Fixed so that re-rendering identical chapters is byte-identical.
const MODIFIED: &str = "2000-01-01T00:00:00Z";

fn chapter_file(index: usize) -> String {
    format!("chap_{:03}.xhtml", index + 1)
}

/// Label used in navigation; anonymous chapters get a numbered placeholder.
fn nav_label(chapter: &Chapter, index: usize) -> String {
    if chapter.is_anonymous() {
        format!("Chapter {}", index + 1)
    } else {
        chapter.title.clone()
    }
}

/// `urn:uuid:` built from the md5 of the identifier seed.
pub fn book_identifier(seed: &str) -> String {
    let hex = format!("{:x}", md5::compute(seed.as_bytes()));
    format!(
        "urn:uuid:{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn content_opf(chapters: &[Chapter], meta: &BookMetadata) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for i in 0..chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"chap_{n:03}\" href=\"{file}\" media-type=\"application/xhtml+xml\"/>\n",
            n = i + 1,
            file = chapter_file(i)
        ));
        spine.push_str(&format!("    <itemref idref=\"chap_{:03}\"/>\n", i + 1));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId" xml:lang="{lang}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="BookId">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
    <dc:language>{lang}</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="style" href="style/book.css" media-type="text/css"/>
{manifest}  </manifest>
  <spine toc="ncx">
    <itemref idref="nav"/>
{spine}  </spine>
</package>
"#,
        lang = escape(meta.language.as_str()),
        id = book_identifier(&meta.identifier_seed),
        title = escape(meta.title.as_str()),
        author = escape(meta.author.as_str()),
        modified = MODIFIED,
    )
}

fn toc_ncx(chapters: &[Chapter], meta: &BookMetadata) -> String {
    let mut points = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{file}"/>
    </navPoint>
"#,
            n = i + 1,
            label = escape(nav_label(chapter, i).as_str()),
            file = chapter_file(i)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{id}"/>
    <meta name="dtb:depth" content="1"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
        id = book_identifier(&meta.identifier_seed),
        title = escape(meta.title.as_str()),
    )
}

fn nav_xhtml(chapters: &[Chapter], meta: &BookMetadata) -> String {
    let mut items = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        items.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            chapter_file(i),
            escape(nav_label(chapter, i).as_str())
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#,
        lang = escape(meta.language.as_str()),
        title = escape(meta.title.as_str()),
    )
}

fn chapter_xhtml(chapter: &Chapter, index: usize, language: &str) -> String {
    let mut body = String::new();
    if !chapter.is_anonymous() {
        body.push_str(&format!("<h1>{}</h1>\n", escape(chapter.title.as_str())));
    }
    for block in &chapter.blocks {
        body.push_str(&block_html(block));
        body.push('\n');
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="style/book.css"/>
</head>
<body>
{body}</body>
</html>
"#,
        lang = escape(language),
        title = escape(nav_label(chapter, index).as_str()),
    )
}

fn block_html(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Heading { level, align, text } => {
            let level = (*level).clamp(1, MAX_HEADING_LEVEL);
            format!(
                "<h{level} style=\"text-align: {};\">{}</h{level}>",
                align.as_css(),
                escape(text.as_str())
            )
        }
        ContentBlock::Paragraph { align, text } => match align {
            Alignment::Left => format!("<p>{}</p>", escape(text.as_str())),
            other => format!(
                "<p style=\"text-align: {};\">{}</p>",
                other.as_css(),
                escape(text.as_str())
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn meta() -> BookMetadata {
        BookMetadata {
            title: "红楼梦".into(),
            author: "曹雪芹".into(),
            language: "zh".into(),
            identifier_seed: "out/hlm.epub".into(),
        }
    }

    fn chapters() -> Vec<Chapter> {
        vec![
            Chapter {
                title: String::new(),
                blocks: vec![ContentBlock::paragraph("Front matter")],
            },
            Chapter {
                title: "第一回 <甄士隐>".into(),
                blocks: vec![
                    ContentBlock::heading(2, "Section").with_align(Alignment::Center),
                    ContentBlock::paragraph("A & B").with_align(Alignment::Right),
                    ContentBlock::paragraph("plain"),
                ],
            },
        ]
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn rendering_is_byte_identical() {
        let a = build_epub(&chapters(), &meta()).unwrap();
        let b = build_epub(&chapters(), &meta()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let bytes = build_epub(&chapters(), &meta()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn chapter_markup_follows_blocks() {
        let bytes = build_epub(&chapters(), &meta()).unwrap();
        let chap = read_entry(&bytes, "OEBPS/chap_002.xhtml");
        assert!(chap.contains("<h1>第一回 &lt;甄士隐&gt;</h1>"), "{chap}");
        assert!(chap.contains("<h2 style=\"text-align: center;\">Section</h2>"));
        assert!(chap.contains("<p style=\"text-align: right;\">A &amp; B</p>"));
        assert!(chap.contains("<p>plain</p>"));
    }

    #[test]
    fn anonymous_chapter_has_no_title_heading() {
        let bytes = build_epub(&chapters(), &meta()).unwrap();
        let chap = read_entry(&bytes, "OEBPS/chap_001.xhtml");
        assert!(!chap.contains("<h1>"));
        assert!(chap.contains("<p>Front matter</p>"));
    }

    #[test]
    fn package_lists_every_chapter_in_order() {
        let bytes = build_epub(&chapters(), &meta()).unwrap();
        let opf = read_entry(&bytes, "OEBPS/content.opf");
        let first = opf.find("idref=\"chap_001\"").unwrap();
        let second = opf.find("idref=\"chap_002\"").unwrap();
        assert!(first < second);
        assert!(opf.contains("<dc:title>红楼梦</dc:title>"));
        assert!(opf.contains(&book_identifier("out/hlm.epub")));
    }

    #[test]
    fn identifier_is_stable_uuid_shape() {
        let id = book_identifier("x.epub");
        assert_eq!(id, book_identifier("x.epub"));
        assert_ne!(id, book_identifier("y.epub"));
        assert_eq!(id.len(), "urn:uuid:".len() + 36);
    }

    #[tokio::test]
    async fn render_replaces_existing_book() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("book.epub");
        let writer = EpubWriter;

        writer.render(&chapters()[..1], &meta(), &dest).await.unwrap();
        let first = std::fs::read(&dest).unwrap();

        writer
            .render_incremental(&dest, &chapters(), &meta())
            .await
            .unwrap();
        let second = std::fs::read(&dest).unwrap();

        assert_ne!(first, second);
        assert_eq!(second, build_epub(&chapters(), &meta()).unwrap());
        assert!(!dir.path().join("nested").join("book.epub.tmp").exists());
    }
}
