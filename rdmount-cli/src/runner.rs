//! CLI runner for common setup and operations.
//!
//! Encapsulates configuration loading, logging initialization and runtime
//! creation to reduce duplication across command handlers.

use std::path::PathBuf;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rdmount::config::ConfigFile;
use rdmount::logging::{init_logging_full, split_log_path, LoggingGuard};

use crate::error::CliError;

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub debug: bool,
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Create a runner, loading config and initializing logging.
    ///
    /// # Arguments
    ///
    /// * `options` - Global flags (config path, debug)
    /// * `stdout_logging` - Mirror logs to stdout; off for commands whose
    ///   stdout is machine-readable
    pub fn new(options: &GlobalOptions, stdout_logging: bool) -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = match &options.config {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let (log_dir, log_file) = split_log_path(&config.logging.file);
        let logging_guard = init_logging_full(&log_dir, &log_file, stdout_logging, options.debug)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            logging_guard,
            config,
            runtime,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("rdmount v{}", rdmount::VERSION);
        info!("rdmount CLI: {} command", command);
    }

    /// Run a future to completion on the runner's runtime.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Token cancelled on Ctrl-C, for the `watch` commands.
    pub fn ctrl_c_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        self.runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                cancel.cancel();
            }
        });
        token
    }
}
