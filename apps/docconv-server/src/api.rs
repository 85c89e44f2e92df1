//! HTTP handlers for the docconv server
//!
//! - `GET /` upload form
//! - `POST /upload` convert and redirect to the result page
//! - `GET /result` word/character/page counts with a download link
//! - `GET /download` one-shot PDF download
//! - `GET /health` liveness JSON

use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use docconv_core::{validate_upload_name, ConversionResult, ConversionToken};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServerError;
use crate::pages::{self, ResultView};
use crate::state::AppState;
use crate::transfer::DownloadBody;

/// RFC 5987 `attr-char`: everything else is percent-encoded in `filename*`
const ATTR_CHARS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Multipart field carrying the document
pub const UPLOAD_FIELD: &str = "upfile";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

/// Handler: GET /health
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "docconv-server",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.pipeline.backend_name(),
    })
}

/// Handler: GET /
pub async fn handle_index() -> Html<&'static str> {
    Html(pages::index_page())
}

/// Handler: POST /upload
///
/// Runs the whole pipeline before answering. Success is a `302` to the
/// result page carrying the counts and the download token.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.unwrap_or((None, Vec::new()));
    let source = validate_upload_name(file_name.as_deref())?;
    info!(file = %source.file_name, bytes = bytes.len(), "Upload accepted");

    let (token, result) = state.pipeline.accept(&source, &bytes).await?;
    let location = result_location(&token, &result);
    debug!(%location, "Redirecting to result page");

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// `/result?wordCount=..&characterCount=..&pageCount=..&token=..`
pub fn result_location(token: &ConversionToken, result: &ConversionResult) -> String {
    format!(
        "/result?wordCount={}&characterCount={}&pageCount={}&token={}",
        result.word_count, result.character_count, result.page_count, token
    )
}

/// Query of the result page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuery {
    pub word_count: Option<String>,
    pub character_count: Option<String>,
    pub page_count: Option<String>,
    pub token: Option<String>,
}

/// Handler: GET /result
pub async fn handle_result(Query(query): Query<ResultQuery>) -> Result<Html<String>, ServerError> {
    let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
    let (Some(word_count), Some(character_count), Some(page_count)) = (
        present(&query.word_count),
        present(&query.character_count),
        present(&query.page_count),
    ) else {
        return Err(ServerError::MissingMetadata);
    };

    let download_url = match query.token.as_deref().map(str::parse::<ConversionToken>) {
        Some(Ok(token)) => format!("/download?token={}", token),
        _ => "/download".to_string(),
    };

    Ok(Html(pages::render_result(&ResultView {
        word_count: &word_count,
        character_count: &character_count,
        page_count: &page_count,
        download_url: &download_url,
    })))
}

/// Query of the download endpoint
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
}

/// Handler: GET /download
///
/// Hands out the artifact once. Its files are removed when the body has been
/// sent in full; an interrupted transfer leaves the token usable.
pub async fn handle_download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ServerError> {
    let token: ConversionToken = query
        .token
        .as_deref()
        .and_then(|t| t.parse().ok())
        .ok_or(ServerError::ArtifactNotFound)?;

    let download = state
        .pipeline
        .take_download(&token)
        .await
        .ok_or(ServerError::ArtifactNotFound)?;

    let disposition = match content_disposition(&download.file_name) {
        Ok(value) => value,
        Err(e) => {
            state.pipeline.restore_download(download).await;
            return Err(e);
        }
    };
    let body = Body::from_stream(DownloadBody::new(state.pipeline.clone(), download));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// `attachment; filename="<name>"`, where characters a quoted ASCII value
/// cannot carry become `_`. Names that needed replacing also get the exact
/// name as `filename*=UTF-8''<percent-encoded>`.
fn content_disposition(file_name: &str) -> Result<HeaderValue, ServerError> {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let value = if fallback == file_name {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            utf8_percent_encode(file_name, ATTR_CHARS)
        )
    };
    HeaderValue::from_str(&value)
        .map_err(|e| ServerError::Internal(format!("Invalid Content-Disposition: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docconv_core::PageCount;

    #[test]
    fn test_result_location() {
        let token: ConversionToken = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        let result = ConversionResult {
            word_count: 2,
            character_count: 10,
            page_count: PageCount::Known(1),
        };
        assert_eq!(
            result_location(&token, &result),
            "/result?wordCount=2&characterCount=10&pageCount=1&token=67e55044-10b1-426f-9247-bb680e5fe0c8"
        );

        let unavailable = ConversionResult {
            page_count: PageCount::Unavailable,
            ..result
        };
        assert!(result_location(&token, &unavailable).contains("pageCount=unavailable"));
    }

    #[test]
    fn test_content_disposition_sanitizes_name() {
        assert_eq!(
            content_disposition("report.pdf").unwrap(),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition("rés\"umé.pdf").unwrap(),
            "attachment; filename=\"r_s_um_.pdf\"; filename*=UTF-8''r%C3%A9s%22um%C3%A9.pdf"
        );
    }

    #[test]
    fn test_content_disposition_keeps_unicode_name() {
        assert_eq!(
            content_disposition("résumé.pdf").unwrap(),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
        assert_eq!(
            content_disposition("季度 报告.pdf").unwrap(),
            "attachment; filename=\"__ __.pdf\"; filename*=UTF-8''%E5%AD%A3%E5%BA%A6%20%E6%8A%A5%E5%91%8A.pdf"
        );
    }
}
