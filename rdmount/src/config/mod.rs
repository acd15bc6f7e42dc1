//! Configuration for every rdmount component.
//!
//! A single INI file at `~/.config/rdmount/config.ini` carries the API token,
//! the mountpoint and the organized library roots. It is read once at
//! startup; nothing in this crate writes it back.
//!
//! # Example
//!
//! ```no_run
//! use rdmount::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! println!("mounting at {}", config.mount.mountpoint.display());
//! # Ok::<(), rdmount::config::ConfigFileError>(())
//! ```

mod defaults;
mod file;
mod parser;
mod settings;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use defaults::*;
pub use settings::*;
