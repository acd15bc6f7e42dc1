//! JSON bodies of the REST API and their conversion into domain types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{ItemStatus, RemoteFile, RemoteItem, UserInfo};

#[derive(Debug, Deserialize)]
pub(super) struct WireUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub points: u64,
}

impl From<WireUser> for UserInfo {
    fn from(w: WireUser) -> Self {
        Self {
            username: w.username,
            email: w.email,
            account_type: w.account_type,
            premium_until: w.expiration,
            points: w.points,
        }
    }
}

/// Entry of `GET /torrents`.
#[derive(Debug, Deserialize)]
pub(super) struct WireTorrent {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub progress: f64,
    pub status: String,
    #[serde(default)]
    pub added: Option<DateTime<Utc>>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl From<WireTorrent> for RemoteItem {
    fn from(w: WireTorrent) -> Self {
        Self {
            id: w.id,
            name: w.filename,
            status: ItemStatus::from_remote(&w.status),
            progress: w.progress,
            hash: w.hash,
            bytes: w.bytes,
            added: w.added,
            files: Vec::new(),
            links: w.links,
        }
    }
}

/// Body of `GET /torrents/info/{id}`.
#[derive(Debug, Deserialize)]
pub(super) struct WireTorrentInfo {
    #[serde(flatten)]
    pub summary: WireTorrent,
    #[serde(default)]
    pub files: Vec<WireFile>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireFile {
    pub id: u64,
    pub path: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub selected: u8,
}

impl From<WireTorrentInfo> for RemoteItem {
    fn from(w: WireTorrentInfo) -> Self {
        let mut item = RemoteItem::from(w.summary);
        item.files = w
            .files
            .into_iter()
            .map(|f| RemoteFile {
                id: f.id,
                path: f.path.trim_start_matches('/').to_string(),
                bytes: f.bytes,
                selected: f.selected == 1,
            })
            .collect();
        item
    }
}

/// Body of `POST /unrestrict/link`.
#[derive(Debug, Deserialize)]
pub(super) struct WireUnrestricted {
    pub download: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

/// Body of `POST /torrents/addMagnet`.
#[derive(Debug, Deserialize)]
pub(super) struct WireAdded {
    pub id: String,
}

/// Error body returned alongside non-success statuses.
#[derive(Debug, Deserialize)]
pub(super) struct WireError {
    #[serde(default)]
    pub error: String,
}

/// Best-effort extraction of the service's error message.
pub(super) fn error_detail(body: &[u8]) -> String {
    serde_json::from_slice::<WireError>(body)
        .map(|e| e.error)
        .ok()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect())
}
