//! Aqua CLI library components.
//!
//! Exposes the command handlers and the directory-backed file provider for testing.

pub mod commands;
pub mod files;
