//! Index, viewer, inline view and download handlers.
//! Object bodies are streamed straight from the store.

use crate::{
    errors::AppError,
    handlers::conditional::{self, RangeRequest},
    models::{
        object::Object,
        view::{IndexPage, ViewerPage},
    },
    services::{
        listing_service::list_files,
        media::{self, MediaKind},
        storage_service::StorageError,
    },
    state::AppState,
    views,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, Response},
};
use serde::Deserialize;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub raw: Option<String>,
}

/// `GET /`: every primary object in the bucket.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let listing = list_files(state.store.as_ref()).await?;
    for skipped in &listing.skipped {
        warn!(name = %skipped.name, "left out of listing: {}", skipped.error);
    }

    Ok(Html(views::render_index(&IndexPage {
        bucket_name: state.bucket_name().to_string(),
        files: listing.files,
    })))
}

/// `GET /viewer/{*name}`: preview page. A failed attribute lookup still
/// renders, with an unknown size.
pub async fn viewer(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Html<String> {
    let file_size = match state.store.attrs(&name).await {
        Ok(object) => media::human_readable_size(object.size()),
        Err(err) => {
            warn!(name = %name, "error getting attrs: {}", err);
            "Unknown size".to_string()
        }
    };

    Html(views::render_viewer(&ViewerPage {
        content_type: media::detect_content_type(&name),
        kind: MediaKind::classify(&name),
        is_pdf: media::has_suffix(&name, &[".pdf"]),
        file_name: name,
        file_size,
    }))
}

/// `GET /view/{*name}`: inline body. `?raw=true` sends only the content type.
///
/// The inline form honours `Range`, `If-Range`, `If-None-Match` and
/// `If-Modified-Since` so players can seek.
pub async fn view_object(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<ViewQuery>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let mut body = state.store.get(&name).await?;
    let content_type = media::detect_content_type(&name);

    if q.raw.as_deref() == Some("true") {
        let mut response = Response::new(Body::from_stream(ReaderStream::new(body.reader)));
        set_content_type(response.headers_mut(), &content_type);
        return Ok(response);
    }

    let size = body.object.size();
    let etag = body.object.etag.as_deref();
    let modified = body.object.uploaded_at;

    if conditional::is_not_modified(&request_headers, etag, modified) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        set_validators(response.headers_mut(), &body.object);
        return Ok(response);
    }

    let range = conditional::requested_range(&request_headers, size, etag, modified);
    let mut response = match range {
        RangeRequest::Full => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(body.reader)));
            set_object_headers(response.headers_mut(), &body.object);
            response
        }
        RangeRequest::Partial(span) => {
            body.reader
                .seek(SeekFrom::Start(span.start))
                .await
                .map_err(StorageError::Io)?;
            let reader = body.reader.take(span.length());
            let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let headers = response.headers_mut();
            set_validators(headers, &body.object);
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(span.length()));
            if let Ok(value) = HeaderValue::from_str(&span.content_range(size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            response
        }
        RangeRequest::Unsatisfiable => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            response
        }
    };

    let headers = response.headers_mut();
    set_content_type(headers, &content_type);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition("inline", media::base_name(&name)),
    );

    Ok(response)
}

/// `GET /download/{*name}`: body with an attachment disposition.
pub async fn download_object(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let body = state.store.get(&name).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(body.reader)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    set_content_type(headers, &media::detect_content_type(&name));
    set_object_headers(headers, &body.object);
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition("attachment", media::base_name(&name)),
    );

    Ok(response)
}

fn set_content_type(headers: &mut HeaderMap, content_type: &str) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size()));
    set_validators(headers, meta);
}

fn set_validators(headers: &mut HeaderMap, meta: &Object) {
    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&conditional::http_date(meta.uploaded_at)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// `<disposition>; filename="<ascii fallback>"; filename*=UTF-8''<encoded>`
fn content_disposition(disposition: &str, filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition,
        fallback,
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
