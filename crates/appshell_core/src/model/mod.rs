//! Domain model shared by the services.
//!
//! # Responsibility
//! - Define the value types crossing the backend boundary: sessions,
//!   documents, query constraints and file objects.
//! - Keep validation of identifiers and paths next to the types they guard.

pub mod document;
pub mod file;
pub mod query;
pub mod session;
