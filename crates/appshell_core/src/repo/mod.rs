//! Repository layer over the remote document store.
//!
//! # Responsibility
//! - Expose schema-agnostic CRUD and constraint queries to callers.
//! - Isolate system-field bookkeeping from record types.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `InvalidQuery`) in
//!   addition to transport errors.

pub mod document_repo;
