//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [remote] section
    if let Some(section) = ini.section(Some("remote")) {
        if let Some(v) = section.get("api_token") {
            config.remote.api_token = v.trim().to_string();
        }
        if let Some(v) = non_empty(section, "api_url") {
            config.remote.api_url = v.trim_end_matches('/').to_string();
        }
        let s = "remote";
        set_positive(section, s, "requests_per_minute", &mut config.remote.requests_per_minute)?;
        set_positive(section, s, "burst", &mut config.remote.burst)?;
        set_positive(section, s, "request_timeout", &mut config.remote.request_timeout)?;
        set_number(section, s, "max_retries", &mut config.remote.max_retries)?;
        set_number(section, s, "retry_base_delay_ms", &mut config.remote.retry_base_delay_ms)?;
        set_number(section, s, "retry_max_delay_ms", &mut config.remote.retry_max_delay_ms)?;
        set_positive(section, s, "rate_limit_pause", &mut config.remote.rate_limit_pause)?;
    }

    // [mount] section
    if let Some(section) = ini.section(Some("mount")) {
        if let Some(v) = non_empty(section, "mountpoint") {
            config.mount.mountpoint = expand_tilde(v);
        }
        let s = "mount";
        set_bool(section, s, "allow_other", &mut config.mount.allow_other)?;
        set_positive(section, s, "read_timeout", &mut config.mount.read_timeout)?;
        set_positive(section, s, "directory_ttl", &mut config.mount.directory_ttl)?;
        set_positive(section, s, "link_ttl", &mut config.mount.link_ttl)?;
        set_positive(section, s, "cache_max_age", &mut config.mount.cache_max_age)?;
    }

    // [resolver] section
    if let Some(section) = ini.section(Some("resolver")) {
        let s = "resolver";
        set_bool(section, s, "enabled", &mut config.resolver.enabled)?;
        if let Some(v) = non_empty(section, "movies_path") {
            config.resolver.movies_path = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "tv_path") {
            config.resolver.tv_path = expand_tilde(v);
        }
        set_positive(section, s, "interval", &mut config.resolver.interval)?;
        config.resolver.on_update = non_empty(section, "on_update").map(str::to_string);
    }

    // [health] section
    if let Some(section) = ini.section(Some("health")) {
        let s = "health";
        set_bool(section, s, "enabled", &mut config.health.enabled)?;
        set_positive(section, s, "interval", &mut config.health.interval)?;
        set_bool(section, s, "repair", &mut config.health.repair)?;
        set_number(section, s, "max_repair_attempts", &mut config.health.max_repair_attempts)?;
        set_bool(section, s, "cleanup_archives", &mut config.health.cleanup_archives)?;
        set_positive(section, s, "stall_checks", &mut config.health.stall_checks)?;
        config.health.on_change = non_empty(section, "on_change").map(str::to_string);
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = expand_tilde(v);
        }
    }

    if config.resolver.movies_path == config.resolver.tv_path {
        return Err(ConfigFileError::InvalidValue {
            section: "resolver".to_string(),
            key: "tv_path".to_string(),
            value: config.resolver.tv_path.display().to_string(),
            reason: "must differ from movies_path".to_string(),
        });
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn set_number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigFileError> {
    if let Some(v) = non_empty(section, key) {
        *target = v.parse().map_err(|_| ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })?;
    }
    Ok(())
}

fn set_positive<T: FromStr + PartialEq + Default>(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigFileError> {
    if let Some(v) = non_empty(section, key) {
        let parsed: T = v
            .parse()
            .ok()
            .filter(|n: &T| *n != T::default())
            .ok_or_else(|| ConfigFileError::InvalidValue {
                section: section_name.to_string(),
                key: key.to_string(),
                value: v.to_string(),
                reason: "must be a positive integer".to_string(),
            })?;
        *target = parsed;
    }
    Ok(())
}

fn set_bool(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut bool,
) -> Result<(), ConfigFileError> {
    if let Some(v) = non_empty(section, key) {
        *target = match v.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => {
                return Err(ConfigFileError::InvalidValue {
                    section: section_name.to_string(),
                    key: key.to_string(),
                    value: v.to_string(),
                    reason: "must be true or false".to_string(),
                })
            }
        };
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
