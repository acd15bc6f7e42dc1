//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()` implementation.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;

// =============================================================================
// Remote
// =============================================================================

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.real-debrid.com/rest/1.0";

/// Default request budget (the service allows 250 requests per minute).
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 250;

/// Default burst allowance.
pub const DEFAULT_BURST: u32 = 10;

/// Default HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial backoff.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Default backoff ceiling.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 8_000;

/// Default pause on 429 when the server sends no Retry-After.
pub const DEFAULT_RATE_LIMIT_PAUSE_SECS: u64 = 60;

// =============================================================================
// Mount
// =============================================================================

/// Default read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default directory listing TTL in seconds.
pub const DEFAULT_DIRECTORY_TTL_SECS: u64 = 30;

/// Default download link lifetime in seconds.
pub const DEFAULT_LINK_TTL_SECS: u64 = 1_800;

/// Default max age for unused cache entries in seconds.
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 3_600;

// =============================================================================
// Resolver / health
// =============================================================================

/// Default resolver interval in seconds.
pub const DEFAULT_RESOLVER_INTERVAL_SECS: u64 = 60;

/// Default health check interval in seconds.
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 300;

/// Default repair attempts per item.
pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u32 = 3;

/// Default consecutive checks before an item counts as stalled.
pub const DEFAULT_STALL_CHECKS: u32 = 2;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "rdmount.log";

fn home_join(relative: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(relative)
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            remote: RemoteSettings::default(),
            mount: MountSettings::default(),
            resolver: ResolverSettings::default(),
            health: HealthSettings::default(),
            logging: LoggingSettings {
                file: config_directory().join(DEFAULT_LOG_FILE),
            },
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst: DEFAULT_BURST,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            rate_limit_pause: DEFAULT_RATE_LIMIT_PAUSE_SECS,
        }
    }
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            mountpoint: home_join("realdebrid"),
            allow_other: false,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            directory_ttl: DEFAULT_DIRECTORY_TTL_SECS,
            link_ttl: DEFAULT_LINK_TTL_SECS,
            cache_max_age: DEFAULT_CACHE_MAX_AGE_SECS,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            movies_path: home_join("media/movies"),
            tv_path: home_join("media/tv"),
            interval: DEFAULT_RESOLVER_INTERVAL_SECS,
            on_update: None,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_HEALTH_INTERVAL_SECS,
            repair: true,
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            cleanup_archives: true,
            stall_checks: DEFAULT_STALL_CHECKS,
            on_change: None,
        }
    }
}
