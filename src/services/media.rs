//! Name-derived facts about objects: media classification, display content
//! type, thumbnail key mapping and human readable sizes.

/// Reserved prefix for derived thumbnail objects.
pub const THUMBNAIL_PREFIX: &str = "thumb/";

/// Placeholder served for anything without a thumbnail.
pub const FILE_ICON_URL: &str = "/static/file-icon.svg";

pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
pub const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".mkv", ".webm"];

const VIDEO_CONTENT_TYPES: [(&str, &str); 4] = [
    (".mp4", "video/mp4"),
    (".mov", "video/quicktime"),
    (".webm", "video/webm"),
    (".mkv", "video/x-matroska"),
];

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    /// Classify by extension, ignoring case.
    pub fn classify(name: &str) -> Self {
        if has_suffix(name, &IMAGE_EXTENSIONS) {
            MediaKind::Image
        } else if has_suffix(name, &VIDEO_EXTENSIONS) {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }

    pub fn has_thumbnail(self) -> bool {
        !matches!(self, MediaKind::Other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Other => "other",
        }
    }
}

/// Case-insensitive suffix match against any of `suffixes`.
pub fn has_suffix(name: &str, suffixes: &[&str]) -> bool {
    let name = name.to_ascii_lowercase();
    suffixes
        .iter()
        .any(|suffix| name.ends_with(&suffix.to_ascii_lowercase()))
}

/// Extension of the last path segment, including the leading dot.
/// Empty when the segment has no dot.
pub fn extension(name: &str) -> &str {
    let segment_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[segment_start..].rfind('.') {
        Some(dot) => &name[segment_start + dot..],
        None => "",
    }
}

/// Last path segment.
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Join path pieces with `/`, dropping empty and `.` segments.
pub fn join_object_path<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !matches!(*segment, "" | "."))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn is_thumbnail_key(name: &str) -> bool {
    name.starts_with(THUMBNAIL_PREFIX)
}

/// `folder/video.mp4` -> `thumb/folder/video.jpg`.
///
/// Returns `None` for empty names and for names that are already thumbnails;
/// the mapping is never applied to its own output.
pub fn thumbnail_key(name: &str) -> Option<String> {
    if name.is_empty() || is_thumbnail_key(name) {
        return None;
    }
    let stem = &name[..name.len() - extension(name).len()];
    let file = format!("{stem}.jpg");
    Some(join_object_path(["thumb", file.as_str()]))
}

/// Display content type: extension lookup, then the video table, then
/// `application/octet-stream`.
pub fn detect_content_type(name: &str) -> String {
    let ext = extension(name);
    if ext.is_empty() {
        return OCTET_STREAM.to_string();
    }
    if let Some(mime) = mime_guess::from_ext(&ext[1..]).first() {
        return mime.essence_str().to_string();
    }
    VIDEO_CONTENT_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map_or(OCTET_STREAM, |(_, content_type)| *content_type)
        .to_string()
}

/// `500 B`, `2.00 KB`, `5.00 MB`, `1.50 GB`.
pub fn human_readable_size(size: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let s = size as f64;
    if s >= GB {
        format!("{:.2} GB", s / GB)
    } else if s >= MB {
        format!("{:.2} MB", s / MB)
    } else if s >= KB {
        format!("{:.2} KB", s / KB)
    } else {
        format!("{} B", size)
    }
}
