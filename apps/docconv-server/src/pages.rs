//! Embedded HTML pages

const INDEX_HTML: &str = include_str!("../templates/index.html");
const RESULT_HTML: &str = include_str!("../templates/result.html");
const UPLOAD_ERROR_HTML: &str = include_str!("../templates/upload_error.html");

/// Landing page with the upload form
pub fn index_page() -> &'static str {
    INDEX_HTML
}

/// Values shown on the result page
#[derive(Debug, Clone, Copy)]
pub struct ResultView<'a> {
    pub word_count: &'a str,
    pub character_count: &'a str,
    pub page_count: &'a str,
    pub download_url: &'a str,
}

/// Fill the result template. Every value is HTML-escaped.
pub fn render_result(view: &ResultView<'_>) -> String {
    RESULT_HTML
        .replace(
            "WORD_COUNT_PLACEHOLDER",
            &html_escape::encode_text(view.word_count),
        )
        .replace(
            "CHAR_COUNT_PLACEHOLDER",
            &html_escape::encode_text(view.character_count),
        )
        .replace(
            "PAGE_COUNT_PLACEHOLDER",
            &html_escape::encode_text(view.page_count),
        )
        .replace(
            "DOWNLOAD_URL_PLACEHOLDER",
            &html_escape::encode_double_quoted_attribute(view.download_url),
        )
}

/// Error page with a "Go Back" button
pub fn upload_error_page(message: &str) -> String {
    UPLOAD_ERROR_HTML.replace("ERROR_MESSAGE_PLACEHOLDER", &html_escape::encode_text(message))
}
