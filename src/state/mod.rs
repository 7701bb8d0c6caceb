/// State management module
///
/// This module handles all application state, including:
/// - The persisted store blob and its SQLite backing (library.rs)
/// - Shared data structures (data.rs)
/// - Repair of per-user module collections (namespace.rs)
/// - Generic per-module CRUD (collection.rs)
/// - The logged-in session and its commands (session.rs)

pub mod collection;
pub mod data;
pub mod library;
pub mod namespace;
pub mod session;
