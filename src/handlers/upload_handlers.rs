//! `GET /upload` form and `POST /upload` multipart ingestion.

use crate::{
    errors::AppError,
    models::view::UploadPage,
    services::{
        media::human_readable_size,
        upload_service::{UploadError, object_name},
    },
    state::AppState,
    views,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::Html,
};
use tracing::info;

pub async fn upload_form(State(state): State<AppState>) -> Html<String> {
    Html(views::render_upload(&UploadPage {
        bucket_name: state.bucket_name().to_string(),
        message: None,
    }))
}

/// Reads `file`, `folder` and `custom_name` fields. The file field is
/// streamed to scratch storage as it arrives; the object is written once
/// every field has been seen.
pub async fn upload_submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let mut staged = None;
    let mut filename = None;
    let mut folder = None;
    let mut custom_name = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                staged = Some(state.uploads.stage(field).await?);
            }
            "folder" => folder = Some(field.text().await.map_err(multipart_error)?),
            "custom_name" => custom_name = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let staged = staged.ok_or(UploadError::MissingFile)?;
    let name = object_name(
        folder.as_deref(),
        custom_name.as_deref(),
        filename.as_deref(),
    )?;
    let report = state.uploads.commit(&name, staged).await?;
    info!(name = %name, thumbnail = ?report.thumbnail, "upload finished");

    Ok(Html(views::render_upload(&UploadPage {
        bucket_name: state.bucket_name().to_string(),
        message: Some(format!(
            "Uploaded {} ({})",
            name,
            human_readable_size(report.size)
        )),
    })))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// Errors raised while streaming the file field. A body over the configured
/// limit stays distinguishable from a malformed one.
impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge(err.body_text())
        } else {
            UploadError::Body(err.body_text())
        }
    }
}
