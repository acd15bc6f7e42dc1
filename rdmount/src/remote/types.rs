//! Domain types shared by every consumer of the remote client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of a remote item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Queued,
    NeedsSelection,
    Downloading,
    Downloaded,
    Error,
    Dead,
    Virus,
}

impl ItemStatus {
    /// Map the service's status string.
    ///
    /// Unknown strings map to `Queued` so new remote states stay hidden from
    /// the mount instead of failing a listing.
    pub fn from_remote(status: &str) -> Self {
        match status {
            "magnet_conversion" | "queued" => Self::Queued,
            "waiting_files_selection" => Self::NeedsSelection,
            "downloading" | "compressing" | "uploading" => Self::Downloading,
            "downloaded" => Self::Downloaded,
            "error" | "magnet_error" => Self::Error,
            "virus" => Self::Virus,
            "dead" => Self::Dead,
            _ => Self::Queued,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::NeedsSelection => "needs-selection",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Error => "error",
            Self::Dead => "dead",
            Self::Virus => "virus",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file inside a remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: u64,
    /// Path relative to the item root, without a leading `/`.
    pub path: String,
    pub bytes: u64,
    pub selected: bool,
}

impl RemoteFile {
    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A torrent-like unit tracked by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub status: ItemStatus,
    /// Download progress, 0–100.
    pub progress: f64,
    /// Info hash, used to rebuild the source when repairing.
    pub hash: String,
    pub bytes: u64,
    pub added: Option<DateTime<Utc>>,
    /// Empty when the item came from a listing rather than a detail call.
    pub files: Vec<RemoteFile>,
    /// Hoster links, one per selected file in file-id order.
    pub links: Vec<String>,
}

impl RemoteItem {
    /// Selected files in file-id order.
    pub fn selected_files(&self) -> Vec<&RemoteFile> {
        let mut files: Vec<&RemoteFile> = self.files.iter().filter(|f| f.selected).collect();
        files.sort_by_key(|f| f.id);
        files
    }

    /// Hoster link for a selected file.
    ///
    /// Links are returned by the service in the same order as the selected
    /// files, so the file's position among them is the link index.
    pub fn link_for(&self, file_id: u64) -> Option<&str> {
        self.selected_files()
            .iter()
            .position(|f| f.id == file_id)
            .and_then(|idx| self.links.get(idx))
            .map(String::as_str)
    }

    /// Whether the item belongs in the mount root.
    pub fn is_listable(&self) -> bool {
        self.status == ItemStatus::Downloaded
            && (self.files.iter().any(|f| f.selected) || !self.links.is_empty())
    }

    /// Source used to re-add the item.
    pub fn source(&self) -> SourceDescriptor {
        SourceDescriptor::from_hash(&self.hash)
    }
}

/// Reference to a file whose link should be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    pub item_id: String,
    pub file_id: u64,
    /// The restricted hoster link the service hands out for this file.
    pub hoster_link: String,
}

impl FileRef {
    /// Key identifying the file regardless of its hoster link.
    pub fn key(&self) -> (String, u64) {
        (self.item_id.clone(), self.file_id)
    }
}

/// Time-limited direct download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub issued_at: Instant,
    pub ttl: Duration,
    /// File size reported by the link resolver, when known.
    pub size: Option<u64>,
}

impl Link {
    pub fn new(url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            url: url.into(),
            issued_at: Instant::now(),
            ttl,
            size: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.issued_at.elapsed() >= self.ttl
    }
}

/// Where an item can be re-added from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Magnet(String),
}

impl SourceDescriptor {
    pub fn from_hash(hash: &str) -> Self {
        Self::Magnet(format!("magnet:?xt=urn:btih:{}", hash))
    }
}

/// Account details.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub account_type: String,
    pub premium_until: Option<DateTime<Utc>>,
    pub points: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: u64, path: &str, selected: bool) -> RemoteFile {
        RemoteFile {
            id,
            path: path.to_string(),
            bytes: 100,
            selected,
        }
    }

    fn item(files: Vec<RemoteFile>, links: Vec<&str>) -> RemoteItem {
        RemoteItem {
            id: "ABC".to_string(),
            name: "Item".to_string(),
            status: ItemStatus::Downloaded,
            progress: 100.0,
            hash: "deadbeef".to_string(),
            bytes: 0,
            added: None,
            files,
            links: links.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ItemStatus::from_remote("magnet_conversion"), ItemStatus::Queued);
        assert_eq!(
            ItemStatus::from_remote("waiting_files_selection"),
            ItemStatus::NeedsSelection
        );
        assert_eq!(ItemStatus::from_remote("compressing"), ItemStatus::Downloading);
        assert_eq!(ItemStatus::from_remote("downloaded"), ItemStatus::Downloaded);
        assert_eq!(ItemStatus::from_remote("magnet_error"), ItemStatus::Error);
        assert_eq!(ItemStatus::from_remote("virus"), ItemStatus::Virus);
        assert_eq!(ItemStatus::from_remote("dead"), ItemStatus::Dead);
        assert_eq!(ItemStatus::from_remote("something_new"), ItemStatus::Queued);
    }

    #[test]
    fn test_link_for_skips_unselected_files() {
        let item = item(
            vec![
                file(3, "b.mkv", true),
                file(1, "a.nfo", false),
                file(2, "a.mkv", true),
            ],
            vec!["https://host/2", "https://host/3"],
        );

        assert_eq!(item.link_for(2), Some("https://host/2"));
        assert_eq!(item.link_for(3), Some("https://host/3"));
        assert_eq!(item.link_for(1), None);
    }

    #[test]
    fn test_listable_requires_downloaded_and_selection() {
        let mut it = item(vec![file(1, "a.mkv", true)], vec![]);
        assert!(it.is_listable());

        it.status = ItemStatus::Downloading;
        assert!(!it.is_listable());

        let none_selected = item(vec![file(1, "a.mkv", false)], vec![]);
        assert!(!none_selected.is_listable());
    }

    #[test]
    fn test_source_is_magnet_from_hash() {
        let it = item(vec![], vec![]);
        assert_eq!(
            it.source(),
            SourceDescriptor::Magnet("magnet:?xt=urn:btih:deadbeef".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_expiry() {
        let link = Link::new("https://dl/1", Duration::from_secs(10));
        assert!(!link.is_expired());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(link.is_expired());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file(1, "Season 1/ep.mkv", true).file_name(), "ep.mkv");
        assert_eq!(file(1, "movie.mkv", true).file_name(), "movie.mkv");
    }
}
