//! Per-page view records.

use crate::services::media::MediaKind;

/// One row of the index listing.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    pub name: String,
    /// Human readable size, e.g. `2.00 KB`.
    pub size: String,
    pub size_bytes: u64,
    /// Upload date formatted as `02 Jan`.
    pub uploaded: String,
    pub content_type: String,
    /// Either `/thumb/<name>` or the static file icon.
    pub thumb_url: String,
    pub kind: MediaKind,
}

#[derive(Clone, Debug)]
pub struct IndexPage {
    pub bucket_name: String,
    pub files: Vec<FileEntry>,
}

#[derive(Clone, Debug)]
pub struct ViewerPage {
    pub file_name: String,
    pub file_size: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub is_pdf: bool,
}

#[derive(Clone, Debug)]
pub struct UploadPage {
    pub bucket_name: String,
    pub message: Option<String>,
}
