pub mod browser_handlers;
pub mod conditional;
pub mod health_handlers;
pub mod thumb_handlers;
pub mod upload_handlers;
