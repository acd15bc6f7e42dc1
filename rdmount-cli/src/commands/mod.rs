//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`mount`] - Mount, background mount and unmount
//! - [`info`] - Account and library overview
//! - [`resolver`] - Organized library (run-once, watch)
//! - [`health`] - Item health (check, summary, unhealthy, cleanup, watch)

pub mod health;
pub mod info;
pub mod mount;
pub mod resolver;
