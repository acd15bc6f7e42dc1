//! File-name helpers shared by the mount, resolver and health monitor.

use regex::Regex;
use std::sync::LazyLock;

/// Extensions of playable video files.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "m4v", "mpg", "mpeg", "webm", "ts", "m2ts",
];

/// Extensions of archive containers.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["rar", "zip", "7z", "tar", "gz", "001"];

/// Split-RAR volumes: `.r00` … `.r99`.
static RAR_VOLUME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^r\d{2}$").expect("valid regex"));

/// Lowercased extension of the final path component.
pub fn extension(name: &str) -> Option<String> {
    let file = name.rsplit('/').next().unwrap_or(name);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_video(name: &str) -> bool {
    extension(name).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_archive(name: &str) -> bool {
    extension(name).is_some_and(|ext| {
        ARCHIVE_EXTENSIONS.contains(&ext.as_str()) || RAR_VOLUME_RE.is_match(&ext)
    })
}

/// Strip a trailing video or archive extension, if present.
pub fn strip_media_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && (is_video(name) || is_archive(name)) => stem,
        _ => name,
    }
}

/// Make a string usable as a single path component.
///
/// Path separators and control characters are replaced, surrounding
/// whitespace trimmed, and names that would be special to the kernel
/// (`.`/`..`/empty) replaced with `_`.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    match trimmed {
        "" | "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}
