//! Application services. `storage_service` is the bucket backend; the rest
//! sit above the `ObjectStore` seam.

pub mod image_codec;
pub mod listing_service;
pub mod media;
pub mod object_store;
pub mod storage_service;
pub mod thumbnail_service;
pub mod transcoder;
pub mod upload_service;
