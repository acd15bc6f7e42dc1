//! Service error types.

use std::fmt;
use std::io;

use crate::config::ConfigFileError;
use crate::fuse::Fuse3Error;
use crate::health::HealthError;
use crate::remote::RemoteError;
use crate::resolver::ResolveError;

/// Errors that stop the mount service from starting or running.
#[derive(Debug)]
pub enum ServiceError {
    /// Missing or invalid configuration
    Config(ConfigFileError),
    /// The API token was rejected
    Unauthorized,
    /// Remote failure during startup
    Remote(RemoteError),
    /// Mounting failed or the mountpoint is unusable
    Mount(Fuse3Error),
    /// The resolver loop stopped
    Resolver(ResolveError),
    /// I/O error while running or unmounting
    Io(io::Error),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Unauthorized => write!(f, "API token rejected by the remote service"),
            Self::Remote(e) => write!(f, "Remote error: {}", e),
            Self::Mount(e) => write!(f, "Mount error: {}", e),
            Self::Resolver(e) => write!(f, "Resolver stopped: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Remote(e) => Some(e),
            Self::Mount(e) => Some(e),
            Self::Resolver(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Unauthorized => None,
        }
    }
}

impl From<ConfigFileError> for ServiceError {
    fn from(e: ConfigFileError) -> Self {
        Self::Config(e)
    }
}

impl From<RemoteError> for ServiceError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unauthorized => Self::Unauthorized,
            other => Self::Remote(other),
        }
    }
}

impl From<HealthError> for ServiceError {
    fn from(e: HealthError) -> Self {
        match e {
            HealthError::Remote(remote) => remote.into(),
        }
    }
}

impl From<ResolveError> for ServiceError {
    fn from(e: ResolveError) -> Self {
        Self::Resolver(e)
    }
}

impl From<Fuse3Error> for ServiceError {
    fn from(e: Fuse3Error) -> Self {
        Self::Mount(e)
    }
}

impl From<io::Error> for ServiceError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
