//! Discord interaction handlers
//!
//! This module provides handlers for Discord interactions such as autocomplete
//! and command failures.

/// Autocomplete handlers for projects, stages, tasks, roles and capabilities
pub mod autocomplete;
/// Framework error handler
pub mod error;

pub use error::on_error;
