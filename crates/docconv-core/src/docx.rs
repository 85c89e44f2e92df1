//! DOCX reader
//!
//! A DOCX file is a ZIP archive of Open XML parts. The body text lives in
//! `word/document.xml` as `<w:p>` paragraphs made of `<w:r>` runs, each
//! holding `<w:t>` text nodes. Only the parts needed for text metrics and
//! simple layout are read: run text, bold/italic, heading styles and list
//! membership.

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::{ConvertError, Result};

const DOCUMENT_PART: &str = "word/document.xml";

/// A styled span of text inside a paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

/// A block-level paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub runs: Vec<TextRun>,
    /// `Some(1..=6)` for `Heading N` / `Title` styles
    pub heading_level: Option<u8>,
    /// `Some(level)` when the paragraph carries numbering properties
    pub list_level: Option<u8>,
}

impl Paragraph {
    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }
}

/// Parsed body of a DOCX document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocxDocument {
    pub paragraphs: Vec<Paragraph>,
}

impl DocxDocument {
    /// Plain text of the document: paragraphs joined with `\n`, no trailing
    /// newline.
    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read and parse a DOCX file from disk.
pub fn read_docx(path: &Path) -> Result<DocxDocument> {
    let bytes = std::fs::read(path)?;
    parse_docx(&bytes)
}

/// Parse DOCX bytes.
pub fn parse_docx(bytes: &[u8]) -> Result<DocxDocument> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConvertError::Extraction(format!("Not a DOCX archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ConvertError::Extraction(format!("Missing {}", DOCUMENT_PART)))?
        .read_to_string(&mut xml)
        .map_err(|e| ConvertError::Extraction(format!("Failed to read {}: {}", DOCUMENT_PART, e)))?;

    parse_document_xml(&xml)
}

/// Parse the contents of `word/document.xml`.
///
/// Paragraphs nested inside another paragraph (text boxes, drawing text) are
/// emitted after the paragraph that anchors them. `mc:Fallback` content is
/// skipped, since it repeats what the `mc:Choice` branch already holds.
pub fn parse_document_xml(xml: &str) -> Result<DocxDocument> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    let mut nested = Vec::new();
    let mut outer: Vec<(Paragraph, TextRun, bool)> = Vec::new();
    let mut paragraph = Paragraph::default();
    let mut run = TextRun::default();
    let mut depth = 0usize;
    let mut fallback_depth = 0usize;
    let mut in_run = false;
    let mut in_text = false;

    loop {
        let event = reader.read_event_into(&mut buf);
        if fallback_depth > 0 {
            match event {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"Fallback" => {
                    fallback_depth += 1
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"Fallback" => {
                    fallback_depth -= 1
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(&reader, e)),
                _ => {}
            }
            buf.clear();
            continue;
        }

        let in_paragraph = depth > 0;
        match event {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"Fallback" => fallback_depth = 1,
                b"p" => {
                    if in_paragraph {
                        outer.push((
                            std::mem::take(&mut paragraph),
                            std::mem::take(&mut run),
                            in_run,
                        ));
                        in_run = false;
                        in_text = false;
                    } else {
                        paragraph = Paragraph::default();
                    }
                    depth += 1;
                }
                b"r" => {
                    in_run = true;
                    run = TextRun::default();
                }
                b"t" => in_text = in_run,
                b"numPr" if in_paragraph => paragraph.list_level = Some(0),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"p" if !in_paragraph => paragraphs.push(Paragraph::default()),
                b"b" if in_run => run.bold = toggle_enabled(e),
                b"i" if in_run => run.italic = toggle_enabled(e),
                b"br" | b"cr" if in_run => run.text.push('\n'),
                b"tab" if in_run => run.text.push('\t'),
                b"pStyle" if in_paragraph => {
                    if let Some(style) = attribute(e, "val") {
                        paragraph.heading_level = heading_level(&style);
                    }
                }
                b"ilvl" if in_paragraph => {
                    let level = attribute(e, "val").and_then(|v| v.parse().ok());
                    paragraph.list_level = Some(level.unwrap_or(0));
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = e
                        .unescape()
                        .map_err(|e| ConvertError::Extraction(format!("Bad text node: {}", e)))?;
                    run.text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => {
                    in_run = false;
                    if !run.text.is_empty() {
                        paragraph.runs.push(std::mem::take(&mut run));
                    }
                }
                b"p" if in_paragraph => {
                    depth -= 1;
                    let finished = std::mem::take(&mut paragraph);
                    match outer.pop() {
                        Some((anchor, anchor_run, anchor_in_run)) => {
                            nested.push(finished);
                            paragraph = anchor;
                            run = anchor_run;
                            in_run = anchor_in_run;
                        }
                        None => {
                            paragraphs.push(finished);
                            paragraphs.append(&mut nested);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(DocxDocument { paragraphs })
}

fn xml_error(reader: &Reader<&[u8]>, e: quick_xml::Error) -> ConvertError {
    ConvertError::Extraction(format!(
        "XML parse error at byte {}: {}",
        reader.buffer_position(),
        e
    ))
}

/// `<w:b/>` is on; `<w:b w:val="0"/>` / `"false"` is off.
fn toggle_enabled(e: &BytesStart) -> bool {
    !matches!(
        attribute(e, "val").as_deref(),
        Some("0") | Some("false") | Some("off")
    )
}

fn heading_level(style: &str) -> Option<u8> {
    if style.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let lower = style.to_ascii_lowercase();
    let digits = lower.strip_prefix("heading")?;
    digits
        .trim()
        .parse::<u8>()
        .ok()
        .map(|level| level.clamp(1, 6))
}

fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{build_docx, document_xml};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reads_runs_and_paragraphs() {
        let xml = document_xml(&[
            r#"<w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Second</w:t></w:r></w:p>"#,
        ]);
        let doc = parse_document_xml(&xml).unwrap();

        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[0].text(), "Hello world");
        assert_eq!(doc.plain_text(), "Hello world\nSecond");
    }

    #[test]
    fn test_reads_styles() {
        let xml = document_xml(&[
            r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>"#,
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="3"/></w:numPr></w:pPr><w:r><w:rPr><w:b/><w:i w:val="0"/></w:rPr><w:t>Item</w:t></w:r></w:p>"#,
        ]);
        let doc = parse_document_xml(&xml).unwrap();

        assert_eq!(doc.paragraphs[0].heading_level, Some(2));
        assert_eq!(doc.paragraphs[1].list_level, Some(1));
        assert!(doc.paragraphs[1].runs[0].bold);
        assert!(!doc.paragraphs[1].runs[0].italic);
    }

    #[test]
    fn test_unescapes_entities_and_keeps_breaks() {
        let xml = document_xml(&[
            r#"<w:p><w:r><w:t>A &amp; B</w:t><w:br/><w:t>C</w:t><w:tab/><w:t>D</w:t></w:r></w:p>"#,
        ]);
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.plain_text(), "A & B\nC\tD");
    }

    #[test]
    fn test_empty_paragraphs_are_kept() {
        let xml = document_xml(&["<w:p/>", "<w:p></w:p>"]);
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.paragraphs.len(), 2);
        assert!(doc.paragraphs.iter().all(Paragraph::is_blank));
        assert_eq!(doc.plain_text(), "\n");
    }

    #[test]
    fn test_text_box_keeps_anchor_paragraph() {
        let xml = document_xml(&[concat!(
            r#"<w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r>"#,
            r#"<w:r><w:drawing><wps:txbx><w:txbxContent>"#,
            r#"<w:p><w:r><w:t>inside the box</w:t></w:r></w:p>"#,
            r#"</w:txbxContent></wps:txbx></w:drawing></w:r>"#,
            r#"<w:r><w:t>world</w:t></w:r></w:p>"#,
        )]);
        let doc = parse_document_xml(&xml).unwrap();

        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[0].text(), "Hello world");
        assert_eq!(doc.plain_text(), "Hello world\ninside the box");
    }

    #[test]
    fn test_alternate_content_fallback_is_skipped() {
        let xml = document_xml(&[concat!(
            r#"<w:p><w:r><w:t>Caption</w:t></w:r><w:r><mc:AlternateContent>"#,
            r#"<mc:Choice Requires="wps"><w:drawing><w:txbxContent>"#,
            r#"<w:p><w:r><w:t>boxed</w:t></w:r></w:p>"#,
            r#"</w:txbxContent></w:drawing></mc:Choice>"#,
            r#"<mc:Fallback><w:pict><v:textbox><w:txbxContent>"#,
            r#"<w:p><w:r><w:t>boxed</w:t></w:r></w:p>"#,
            r#"</w:txbxContent></v:textbox></w:pict></mc:Fallback>"#,
            r#"</mc:AlternateContent></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>After</w:t></w:r></w:p>"#,
        )]);
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.plain_text(), "Caption\nboxed\nAfter");
    }

    #[test]
    fn test_parse_docx_archive() {
        let bytes = build_docx(&["Hello world"]).unwrap();
        let doc = parse_docx(&bytes).unwrap();
        assert_eq!(doc.plain_text(), "Hello world");
    }

    #[test]
    fn test_rejects_non_zip() {
        let err = parse_docx(b"plain text, not a zip").unwrap_err();
        assert!(matches!(err, ConvertError::Extraction(_)));
    }

    #[test]
    fn test_rejects_archive_without_document_part() {
        let bytes = crate::fixtures::build_zip(&[("word/styles.xml", "<w:styles/>")]).unwrap();
        let err = parse_docx(&bytes).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn test_rejects_malformed_xml() {
        let bytes = crate::fixtures::build_zip(&[(
            "word/document.xml",
            "<w:document><w:body><w:p></w:r></w:body>",
        )])
        .unwrap();
        assert!(matches!(
            parse_docx(&bytes),
            Err(ConvertError::Extraction(_))
        ));
    }

    #[test]
    fn test_heading_level_parsing() {
        assert_eq!(heading_level("Heading1"), Some(1));
        assert_eq!(heading_level("heading 3"), Some(3));
        assert_eq!(heading_level("Heading9"), Some(6));
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
    }
}
