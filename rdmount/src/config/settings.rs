//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing logic.

use std::path::PathBuf;
use std::time::Duration;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Remote API settings
    pub remote: RemoteSettings,
    /// Mount and cache settings
    pub mount: MountSettings,
    /// Organized library settings
    pub resolver: ResolverSettings,
    /// Health monitor settings
    pub health: HealthSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Remote API configuration.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Bearer token for the debrid API
    pub api_token: String,
    /// Base URL of the REST API
    pub api_url: String,
    /// Request budget shared by every component
    pub requests_per_minute: u32,
    /// Requests allowed back-to-back before spacing applies
    pub burst: u32,
    /// Per-request timeout in seconds
    pub request_timeout: u64,
    /// Retries for transient failures
    pub max_retries: u32,
    /// Initial backoff in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub retry_max_delay_ms: u64,
    /// Pause applied on a 429 without Retry-After, in seconds
    pub rate_limit_pause: u64,
}

/// Mount configuration.
#[derive(Debug, Clone)]
pub struct MountSettings {
    /// Where the read-only filesystem is mounted
    pub mountpoint: PathBuf,
    /// Pass `allow_other` to the kernel
    pub allow_other: bool,
    /// Upper bound for one read, in seconds
    pub read_timeout: u64,
    /// Directory listing freshness, in seconds
    pub directory_ttl: u64,
    /// Lifetime of a resolved download link, in seconds
    pub link_ttl: u64,
    /// Unused cache entries are evicted after this many seconds
    pub cache_max_age: u64,
}

impl MountSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn directory_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_ttl)
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age)
    }
}

/// Organized library configuration.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Run the resolver loop alongside the mount
    pub enabled: bool,
    /// Root of the movie tree
    pub movies_path: PathBuf,
    /// Root of the TV tree
    pub tv_path: PathBuf,
    /// Seconds between resolver cycles
    pub interval: u64,
    /// Shell command run after a cycle that changed the library
    pub on_update: Option<String>,
}

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// Run the health loop alongside the mount
    pub enabled: bool,
    /// Seconds between health checks
    pub interval: u64,
    /// Re-add unhealthy items automatically
    pub repair: bool,
    /// Repairs attempted per item before giving up
    pub max_repair_attempts: u32,
    /// Delete items holding only archives
    pub cleanup_archives: bool,
    /// Consecutive checks without progress before an item counts as stalled
    pub stall_checks: u32,
    /// Shell command run after a check that repaired or deleted items
    pub on_change: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Path to the log file
    pub file: PathBuf,
}
