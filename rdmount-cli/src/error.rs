//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::io;
use std::process;

use rdmount::config::ConfigFileError;
use rdmount::health::HealthError;
use rdmount::remote::RemoteError;
use rdmount::resolver::ResolveError;
use rdmount::service::ServiceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(ConfigFileError),
    /// Failed to build the async runtime
    Runtime(io::Error),
    /// Mount service failure
    Service(ServiceError),
    /// Remote API failure
    Remote(RemoteError),
    /// Resolver cycle failure
    Resolver(ResolveError),
    /// Health check failure
    Health(HealthError),
    /// Neither fusermount3 nor fusermount could unmount
    Unmount(String),
    /// Failed to launch the background mount process
    Spawn(io::Error),
    /// Failed to render output
    Output(serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Service(ServiceError::Unauthorized)
            | CliError::Remote(RemoteError::Unauthorized)
            | CliError::Health(HealthError::Remote(RemoteError::Unauthorized)) => {
                eprintln!();
                eprintln!("Check api_token in the [remote] section of your config.ini");
            }
            CliError::Service(ServiceError::Mount(_)) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. FUSE not installed: sudo apt install fuse3 (Linux)");
                eprintln!("  2. Mountpoint in use: try rdmount unmount <mountpoint>");
            }
            CliError::Resolver(ResolveError::NotMounted(_)) => {
                eprintln!();
                eprintln!("Start the mount first with: rdmount mount <mountpoint>");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Remote(e) => write!(f, "Remote error: {}", e),
            CliError::Resolver(e) => write!(f, "Resolver failed: {}", e),
            CliError::Health(e) => write!(f, "Health check failed: {}", e),
            CliError::Unmount(path) => write!(f, "Failed to unmount {}", path),
            CliError::Spawn(e) => write!(f, "Failed to start background mount: {}", e),
            CliError::Output(e) => write!(f, "Failed to render output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Remote(e) => Some(e),
            CliError::Resolver(e) => Some(e),
            CliError::Health(e) => Some(e),
            CliError::Spawn(e) => Some(e),
            CliError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<RemoteError> for CliError {
    fn from(e: RemoteError) -> Self {
        CliError::Remote(e)
    }
}

impl From<ResolveError> for CliError {
    fn from(e: ResolveError) -> Self {
        CliError::Resolver(e)
    }
}

impl From<HealthError> for CliError {
    fn from(e: HealthError) -> Self {
        CliError::Health(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}
