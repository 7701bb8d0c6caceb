//! urban-audit: local record keeping for urban-audit field data
//!
//! Photographs, ward maps, survey CSVs, interviews, street imagery and
//! solved-problem references are kept per user in a single JSON document
//! persisted in a local SQLite file.

pub mod config;
pub mod error;
pub mod media;
pub mod parse;
pub mod state;
pub mod viewer;

pub use error::{Error, Result};
pub use state::library::Library;
pub use state::session::Session;
