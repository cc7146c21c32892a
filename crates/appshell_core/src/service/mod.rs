//! Use-case services called by UI consumers.
//!
//! # Responsibility
//! - Wrap backend calls into stable entry points with local validation,
//!   error mapping and logging.
//! - Keep UI layers decoupled from the remote platform.

pub mod file_service;
pub mod session_service;
