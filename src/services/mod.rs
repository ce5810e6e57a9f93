//! Services behind the HTTP handlers.

pub mod item_service;
pub mod storage_service;
pub mod token_service;
