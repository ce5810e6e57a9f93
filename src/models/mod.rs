//! Core data models for the walnut gallery.
//!
//! Items map to the `items` table via an intermediate `ItemRow` and
//! serialize as camelCase JSON; objects map directly via `sqlx::FromRow`.

pub mod item;
pub mod object;
pub mod tag;
