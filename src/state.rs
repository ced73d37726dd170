use crate::services::{
    object_store::ObjectStore, thumbnail_service::ThumbnailResolver, transcoder::FrameExtractor,
    upload_service::UploadService,
};
use std::sync::Arc;

/// Shared handles every handler receives. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub thumbnails: ThumbnailResolver,
    pub uploads: UploadService,
    pub transcoder: Arc<dyn FrameExtractor>,
}

impl AppState {
    pub fn bucket_name(&self) -> &str {
        self.store.bucket_name()
    }
}
