//! # Rultor Common Library
//!
//! Shared code for the stand migration tooling:
//! - Stand document model (coordinates, tags, levels)
//! - Document store abstraction with in-memory and SQLite backends
//! - Configuration loading
//! - Error types

pub mod config;
pub mod db;
pub mod error;
pub mod model;

pub use error::{Error, Result};
pub use model::{Coordinates, Level, Tag, TagEntry, TagRecord};
