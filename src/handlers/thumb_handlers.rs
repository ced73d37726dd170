use crate::{
    errors::AppError,
    services::{
        media::FILE_ICON_URL,
        thumbnail_service::{
            CacheWrite, Resolution, THUMBNAIL_CACHE_CONTROL, THUMBNAIL_CONTENT_TYPE,
        },
    },
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

/// `GET /thumb/{*name}`
///
/// Cached or freshly generated JPEG; a 302 to the generic icon when the
/// object has no thumbnail to offer.
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    match state.thumbnails.resolve(&name).await? {
        Resolution::Thumbnail(body) => {
            if let CacheWrite::Failed(err) = &body.cache {
                warn!(name = %name, "failed to save thumbnail: {}", err);
            }
            debug!(name = %name, origin = ?body.origin, "serving thumbnail");
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, THUMBNAIL_CONTENT_TYPE),
                    (header::CACHE_CONTROL, THUMBNAIL_CACHE_CONTROL),
                ],
                body.bytes,
            )
                .into_response())
        }
        Resolution::Placeholder(reason) => {
            debug!(name = %name, ?reason, "redirecting to file icon");
            Ok((StatusCode::FOUND, [(header::LOCATION, FILE_ICON_URL)]).into_response())
        }
    }
}
