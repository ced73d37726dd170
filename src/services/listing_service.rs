//! Index listing: every primary object in the bucket as a typed display row.

use crate::{
    models::view::FileEntry,
    services::{
        media::{self, FILE_ICON_URL, MediaKind},
        object_store::{ListedObject, ObjectStore},
        storage_service::{StorageError, StorageResult},
    },
};

/// An object left out of the listing because its attributes could not be read.
#[derive(Debug)]
pub struct SkippedEntry {
    pub name: String,
    pub error: StorageError,
}

#[derive(Debug, Default)]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Percent-encode each segment of an object name for use in a URL path.
pub fn encode_object_path(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn thumb_url(name: &str, kind: MediaKind) -> String {
    if kind.has_thumbnail() {
        format!("/thumb/{}", encode_object_path(name))
    } else {
        FILE_ICON_URL.to_string()
    }
}

/// List the bucket, hiding derived `thumb/` objects.
///
/// Failing to list at all is an error; failing to read one object's
/// attributes only drops that row and records it in `skipped`.
pub async fn list_files(store: &dyn ObjectStore) -> StorageResult<Listing> {
    let mut listing = Listing::default();

    for ListedObject { name, attrs } in store.list().await? {
        if media::is_thumbnail_key(&name) {
            continue;
        }

        let object = match attrs {
            Ok(object) => object,
            Err(error) => {
                listing.skipped.push(SkippedEntry { name, error });
                continue;
            }
        };

        let kind = MediaKind::classify(&name);
        listing.files.push(FileEntry {
            size: media::human_readable_size(object.size()),
            size_bytes: object.size(),
            uploaded: object.uploaded_at.format("%d %b").to_string(),
            content_type: media::detect_content_type(&name),
            thumb_url: thumb_url(&name, kind),
            kind,
            name,
        });
    }

    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::memory::MemoryObjectStore;

    #[tokio::test]
    async fn hides_thumbnails() {
        let store = MemoryObjectStore::new();
        store.insert("a.jpg", &b"jpg"[..]);
        store.insert("thumb/a.jpg", &b"thumb"[..]);
        store.insert("b.mp4", &b"mp4"[..]);

        let listing = list_files(&store).await.unwrap();
        let names: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.mp4"]);
        assert!(listing.skipped.is_empty());
    }

    #[tokio::test]
    async fn rows_carry_display_fields() {
        let store = MemoryObjectStore::new();
        store.insert("docs/My Report.pdf", vec![0u8; 2048]);
        store.insert("clips/a b.mov", vec![0u8; 500]);

        let listing = list_files(&store).await.unwrap();
        let clip = &listing.files[0];
        assert_eq!(clip.name, "clips/a b.mov");
        assert_eq!(clip.size, "500 B");
        assert_eq!(clip.content_type, "video/quicktime");
        assert_eq!(clip.kind, MediaKind::Video);
        assert_eq!(clip.thumb_url, "/thumb/clips/a%20b.mov");
        assert_eq!(clip.uploaded.len(), 6);

        let doc = &listing.files[1];
        assert_eq!(doc.size, "2.00 KB");
        assert_eq!(doc.content_type, "application/pdf");
        assert_eq!(doc.thumb_url, FILE_ICON_URL);
    }

    #[tokio::test]
    async fn attribute_failures_drop_only_that_row() {
        let store = MemoryObjectStore::new();
        store.insert("a.png", &b"a"[..]);
        store.insert("b.png", &b"b"[..]);
        store.fail_attrs_for("a.png");

        let listing = list_files(&store).await.unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "b.png");
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(listing.skipped[0].name, "a.png");
    }
}
