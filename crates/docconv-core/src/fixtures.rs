//! In-memory DOCX builders for tests and smoke checks

use std::io::{Cursor, Write};

use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Wrap raw `<w:p>` fragments in a `word/document.xml` body.
pub fn document_xml(paragraphs: &[&str]) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>{}</w:body></w:document>"
        ),
        paragraphs.concat()
    )
}

/// Build a zip archive from `(name, contents)` entries.
pub fn build_zip(entries: &[(&str, &str)]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, contents) in entries {
        writer.start_file(*name, options)?;
        writer.write_all(contents.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Build a minimal DOCX with one plain paragraph per entry.
pub fn build_docx(paragraphs: &[&str]) -> ZipResult<Vec<u8>> {
    let fragments: Vec<String> = paragraphs
        .iter()
        .map(|text| {
            format!(
                r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                html_escape::encode_text(text)
            )
        })
        .collect();
    let fragments: Vec<&str> = fragments.iter().map(String::as_str).collect();
    build_docx_xml(&document_xml(&fragments))
}

/// Build a DOCX around a complete `word/document.xml`.
pub fn build_docx_xml(document: &str) -> ZipResult<Vec<u8>> {
    build_zip(&[
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("word/document.xml", document),
    ])
}
