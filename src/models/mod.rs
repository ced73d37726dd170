//! Data models for the bucket browser.
//!
//! `bucket` and `object` map to SQLite rows via `sqlx::FromRow`; `view`
//! holds the typed records the HTML pages are rendered from.

pub mod bucket;
pub mod object;
pub mod view;
