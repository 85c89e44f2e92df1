//! DOCX → HTML → PDF through headless Chromium
//!
//! The document body is converted to a semantic HTML fragment, wrapped in a
//! fixed print template (A4, 20mm margins, page-break rules, footer) and
//! printed with the DevTools `Page.printToPDF` command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use super::{ConversionBackend, PAGE_HEIGHT_MM, PAGE_MARGIN_MM, PAGE_WIDTH_MM};
use crate::docx::{self, DocxDocument, Paragraph, TextRun};
use crate::error::{ConvertError, Result};

/// Footer printed at the bottom of every page
pub const FOOTER_TEXT: &str = "Converted with docconv";

const MM_PER_INCH: f64 = 25.4;

const PRINT_STYLES: &str = r#"
@page { size: A4; margin: 20mm; }
html, body { margin: 0; padding: 0; }
body {
  font-family: "Helvetica Neue", Helvetica, Arial, sans-serif;
  font-size: 11pt;
  line-height: 1.4;
  color: #111;
  -webkit-print-color-adjust: exact;
  print-color-adjust: exact;
}
h1, h2, h3, h4, h5, h6 { page-break-after: avoid; break-after: avoid; margin: 0.8em 0 0.4em; }
p, li { orphans: 3; widows: 3; margin: 0 0 0.5em; page-break-inside: avoid; break-inside: avoid; }
ul { margin: 0 0 0.5em 1.2em; padding: 0; }
table, figure, img { page-break-inside: avoid; break-inside: avoid; max-width: 100%; }
.page-break { page-break-before: always; break-before: page; }
"#;

fn footer_template() -> String {
    format!(
        r#"<div style="width:100%;font-size:8pt;color:#666;text-align:center;">{} &middot; <span class="pageNumber"></span>/<span class="totalPages"></span></div>"#,
        html_escape::encode_text(FOOTER_TEXT)
    )
}

fn run_to_html(run: &TextRun, out: &mut String) {
    let text = html_escape::encode_text(&run.text).replace('\n', "<br>");
    match (run.bold, run.italic) {
        (true, true) => out.push_str(&format!("<strong><em>{}</em></strong>", text)),
        (true, false) => out.push_str(&format!("<strong>{}</strong>", text)),
        (false, true) => out.push_str(&format!("<em>{}</em>", text)),
        (false, false) => out.push_str(&text),
    }
}

fn paragraph_inner(paragraph: &Paragraph) -> String {
    let mut inner = String::new();
    for run in &paragraph.runs {
        run_to_html(run, &mut inner);
    }
    inner
}

/// Semantic HTML for the document body.
///
/// Consecutive list paragraphs are grouped into one `<ul>`; blank
/// paragraphs become empty `<p>` elements so vertical spacing survives.
pub fn document_to_html(document: &DocxDocument) -> String {
    let mut body = String::new();
    let mut in_list = false;

    for paragraph in &document.paragraphs {
        if paragraph.list_level.is_some() && paragraph.heading_level.is_none() {
            if !in_list {
                body.push_str("<ul>\n");
                in_list = true;
            }
            body.push_str(&format!("<li>{}</li>\n", paragraph_inner(paragraph)));
            continue;
        }
        if in_list {
            body.push_str("</ul>\n");
            in_list = false;
        }

        let inner = paragraph_inner(paragraph);
        match paragraph.heading_level {
            Some(level) => body.push_str(&format!("<h{0}>{1}</h{0}>\n", level, inner)),
            None if paragraph.is_blank() => body.push_str("<p>&nbsp;</p>\n"),
            None => body.push_str(&format!("<p>{}</p>\n", inner)),
        }
    }
    if in_list {
        body.push_str("</ul>\n");
    }
    body
}

/// Full printable page for `document`.
pub fn print_template(document: &DocxDocument) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        PRINT_STYLES,
        document_to_html(document)
    )
}

fn print_params() -> PrintToPdfParams {
    let margin = f64::from(PAGE_MARGIN_MM) / MM_PER_INCH;
    PrintToPdfParams {
        print_background: Some(true),
        paper_width: Some(f64::from(PAGE_WIDTH_MM) / MM_PER_INCH),
        paper_height: Some(f64::from(PAGE_HEIGHT_MM) / MM_PER_INCH),
        margin_top: Some(margin),
        margin_bottom: Some(margin),
        margin_left: Some(margin),
        margin_right: Some(margin),
        display_header_footer: Some(true),
        header_template: Some("<span></span>".to_string()),
        footer_template: Some(footer_template()),
        ..Default::default()
    }
}

/// Strategy B: render through a headless browser.
///
/// A fresh browser is launched per conversion and closed afterwards.
#[derive(Debug, Clone)]
pub struct RenderPipeline {
    timeout: Duration,
    chrome_path: Option<PathBuf>,
}

impl RenderPipeline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            chrome_path: None,
        }
    }

    pub fn with_chrome_path(mut self, chrome_path: Option<PathBuf>) -> Self {
        self.chrome_path = chrome_path;
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(ConvertError::Render)
    }

    async fn print(&self, html: &str) -> Result<Vec<u8>> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| ConvertError::Render(format!("Failed to launch browser: {}", e)))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let printed = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| ConvertError::Render(format!("Failed to open page: {}", e)))?;
            page.set_content(html)
                .await
                .map_err(|e| ConvertError::Render(format!("Failed to load content: {}", e)))?;
            let bytes = tokio::time::timeout(self.timeout, page.pdf(print_params()))
                .await
                .map_err(|_| {
                    ConvertError::Render(format!(
                        "PDF export timed out after {}s",
                        self.timeout.as_secs()
                    ))
                })?
                .map_err(|e| ConvertError::Render(format!("PDF export failed: {}", e)))?;
            Ok::<_, ConvertError>(bytes)
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        let _ = browser.wait().await;
        handle.abort();

        printed
    }
}

#[async_trait]
impl ConversionBackend for RenderPipeline {
    fn name(&self) -> &'static str {
        "render"
    }

    #[instrument(skip(self), fields(backend = "render"))]
    async fn convert(&self, source: &Path, artifact: &Path) -> Result<()> {
        let source_path = source.to_path_buf();
        let document = tokio::task::spawn_blocking(move || docx::read_docx(&source_path))
            .await
            .map_err(|e| ConvertError::Render(format!("Reader task panicked: {}", e)))?
            .map_err(|e| ConvertError::Render(e.to_string()))?;

        let html = print_template(&document);
        debug!(html_bytes = html.len(), "Built print template");

        let bytes = self.print(&html).await?;
        write_artifact(artifact, &bytes).await?;
        info!(bytes = bytes.len(), "Rendered PDF");
        Ok(())
    }
}

async fn write_artifact(artifact: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(artifact, bytes).await.map_err(|e| {
        ConvertError::Render(format!("Failed to write {}: {}", artifact.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::parse_document_xml;

    fn paragraph(text: &str) -> Paragraph {
        Paragraph {
            runs: vec![TextRun {
                text: text.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_paragraphs_avoid_page_breaks() {
        let html = print_template(&DocxDocument {
            paragraphs: vec![paragraph("kept together")],
        });
        assert!(html.contains("p, li { orphans: 3; widows: 3; margin: 0 0 0.5em; page-break-inside: avoid;"));
    }

    #[tokio::test]
    async fn test_write_failure_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("missing").join("out.pdf");
        let err = write_artifact(&artifact, b"%PDF-1.7").await.unwrap_err();
        assert!(matches!(err, ConvertError::Render(_)), "got {:?}", err);
    }

    #[test]
    fn test_paragraphs_are_escaped() {
        let document = DocxDocument {
            paragraphs: vec![paragraph("Fish & <chips>")],
        };
        assert_eq!(document_to_html(&document), "<p>Fish &amp; &lt;chips&gt;</p>\n");
    }

    #[test]
    fn test_headings_and_styles() {
        let document = DocxDocument {
            paragraphs: vec![
                Paragraph {
                    heading_level: Some(2),
                    ..paragraph("Overview")
                },
                Paragraph {
                    runs: vec![
                        TextRun {
                            text: "bold".into(),
                            bold: true,
                            italic: false,
                        },
                        TextRun {
                            text: " and ".into(),
                            ..Default::default()
                        },
                        TextRun {
                            text: "both".into(),
                            bold: true,
                            italic: true,
                        },
                    ],
                    ..Default::default()
                },
            ],
        };
        let html = document_to_html(&document);
        assert!(html.contains("<h2>Overview</h2>"));
        assert!(html.contains("<p><strong>bold</strong> and <strong><em>both</em></strong></p>"));
    }

    #[test]
    fn test_list_items_are_grouped() {
        let document = DocxDocument {
            paragraphs: vec![
                Paragraph {
                    list_level: Some(0),
                    ..paragraph("one")
                },
                Paragraph {
                    list_level: Some(0),
                    ..paragraph("two")
                },
                paragraph("after"),
            ],
        };
        assert_eq!(
            document_to_html(&document),
            "<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n<p>after</p>\n"
        );
    }

    #[test]
    fn test_blank_paragraph_keeps_spacing() {
        let document = DocxDocument {
            paragraphs: vec![paragraph("")],
        };
        assert_eq!(document_to_html(&document), "<p>&nbsp;</p>\n");
    }

    #[test]
    fn test_print_template_wraps_body() {
        let document = parse_document_xml(&crate::fixtures::document_xml(&[
            "<w:p><w:r><w:t>Hello world</w:t></w:r></w:p>",
        ]))
        .unwrap();
        let page = print_template(&document);
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("@page { size: A4; margin: 20mm; }"));
        assert!(page.contains("<p>Hello world</p>"));
    }

    #[test]
    fn test_print_params_use_a4_and_footer() {
        let params = print_params();
        assert!((params.paper_width.unwrap() - 8.27).abs() < 0.01);
        assert!((params.paper_height.unwrap() - 11.69).abs() < 0.01);
        assert!((params.margin_top.unwrap() - 0.787).abs() < 0.01);
        assert_eq!(params.print_background, Some(true));
        assert!(params.footer_template.unwrap().contains(FOOTER_TEXT));
    }

    #[test]
    fn test_chrome_path_is_applied() {
        let pipeline = RenderPipeline::new(Duration::from_secs(5))
            .with_chrome_path(Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(pipeline.chrome_path, Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(pipeline.name(), "render");
    }
}
