//! HTML rendering for the browser pages.
//!
//! Pages are assembled from the typed records in `models::view`; every
//! interpolated value goes through [`html_escape`].

use crate::{
    models::view::{FileEntry, IndexPage, UploadPage, ViewerPage},
    services::{listing_service::encode_object_path, media::MediaKind},
};

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;width:100%}\
td,th{padding:.4rem .6rem;border-bottom:1px solid #ddd;text-align:left}\
img.thumb{width:64px;height:64px;object-fit:cover;border-radius:4px}\
.viewer img,.viewer video,.viewer iframe{max-width:100%;max-height:80vh}";

pub fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\">",
            "<title>{}</title><style>{}</style></head><body>{}</body></html>"
        ),
        html_escape(title),
        STYLE,
        body
    )
}

fn file_row(file: &FileEntry) -> String {
    let path = encode_object_path(&file.name);
    format!(
        concat!(
            "<tr class=\"{kind}\" data-size=\"{size_bytes}\">",
            "<td><img class=\"thumb\" src=\"{thumb}\" alt=\"\" loading=\"lazy\"></td>",
            "<td><a href=\"/viewer/{path}\">{name}</a></td>",
            "<td>{size}</td><td>{uploaded}</td><td>{content_type}</td>",
            "<td><a href=\"/download/{path}\">download</a></td></tr>"
        ),
        kind = file.kind.as_str(),
        size_bytes = file.size_bytes,
        thumb = html_escape(&file.thumb_url),
        path = html_escape(&path),
        name = html_escape(&file.name),
        size = html_escape(&file.size),
        uploaded = html_escape(&file.uploaded),
        content_type = html_escape(&file.content_type),
    )
}

pub fn render_index(page: &IndexPage) -> String {
    let rows: String = page.files.iter().map(file_row).collect();
    let body = format!(
        concat!(
            "<h1>{bucket}</h1><p><a href=\"/upload\">Upload a file</a></p>",
            "<table><thead><tr><th></th><th>Name</th><th>Size</th><th>Uploaded</th>",
            "<th>Type</th><th></th></tr></thead><tbody>{rows}</tbody></table>"
        ),
        bucket = html_escape(&page.bucket_name),
        rows = rows,
    );
    layout(&page.bucket_name, &body)
}

pub fn render_viewer(page: &ViewerPage) -> String {
    let raw = format!("/view/{}?raw=true", encode_object_path(&page.file_name));
    let raw = html_escape(&raw);
    let preview = match page.kind {
        MediaKind::Image => format!("<img src=\"{raw}\" alt=\"\">"),
        MediaKind::Video => format!(
            "<video controls preload=\"metadata\"><source src=\"{raw}\" type=\"{}\"></video>",
            html_escape(&page.content_type)
        ),
        MediaKind::Other if page.is_pdf => {
            format!("<iframe src=\"{raw}\" width=\"100%\" height=\"800\"></iframe>")
        }
        MediaKind::Other => "<p>No preview available.</p>".to_string(),
    };
    let download = html_escape(&format!("/download/{}", encode_object_path(&page.file_name)));
    let body = format!(
        concat!(
            "<p><a href=\"/\">&larr; back</a></p><h1>{name}</h1>",
            "<p>{size} &middot; {content_type} &middot; <a href=\"{download}\">download</a></p>",
            "<div class=\"viewer\">{preview}</div>"
        ),
        name = html_escape(&page.file_name),
        size = html_escape(&page.file_size),
        content_type = html_escape(&page.content_type),
        download = download,
        preview = preview,
    );
    layout(&page.file_name, &body)
}

pub fn render_upload(page: &UploadPage) -> String {
    let message = page
        .message
        .as_deref()
        .map(|m| format!("<p class=\"message\">{}</p>", html_escape(m)))
        .unwrap_or_default();
    let body = format!(
        concat!(
            "<p><a href=\"/\">&larr; back</a></p><h1>Upload to {bucket}</h1>{message}",
            "<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">",
            "<p><input type=\"file\" name=\"file\" required></p>",
            "<p><input type=\"text\" name=\"folder\" placeholder=\"folder (optional)\"></p>",
            "<p><input type=\"text\" name=\"custom_name\" ",
            "placeholder=\"file name (optional)\"></p>",
            "<p><button type=\"submit\">Upload</button></p></form>"
        ),
        bucket = html_escape(&page.bucket_name),
        message = message,
    );
    layout("Upload", &body)
}
