//! rdmount - debrid storage as a local read-only filesystem
//!
//! This library mounts the files of a debrid account through FUSE, keeps an
//! organized movie/TV library of symlinks into that mount, and monitors the
//! health of remote items.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module wires everything together:
//!
//! ```ignore
//! use rdmount::config::ConfigFile;
//! use rdmount::service::MountService;
//!
//! let config = ConfigFile::load()?;
//! MountService::new(config).run().await?;
//! ```
//!
//! # Modules
//!
//! - [`remote`] - API client with shared rate limiting and retries
//! - [`cache`] - Metadata cache with single-flight refresh
//! - [`fuse`] - Virtual filesystem driver and fuse3 adapter
//! - [`resolver`] - Organized library reconciliation
//! - [`health`] - Health monitoring and repair
//! - [`notify`] - Change notifications

pub mod cache;
pub mod config;
pub mod fuse;
pub mod health;
pub mod logging;
pub mod media;
pub mod notify;
pub mod remote;
pub mod resolver;
pub mod service;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
