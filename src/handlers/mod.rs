//! HTTP handlers, one module per resource.

pub mod catalog_handlers;
pub mod health_handlers;
pub mod item_handlers;
pub mod upload_handlers;
