//! Read-through cache of remote listings, item trees and download links.
//!
//! Three kinds of entry are cached, each behind its own single-flight
//! [`Coalescer`] so concurrent misses cost one remote call:
//!
//! | Entry       | Key              | Fresh for          | Evicted after idle  |
//! |-------------|------------------|--------------------|---------------------|
//! | root        | -                | `directory_ttl`    | never               |
//! | item tree   | item id          | `directory_ttl`    | `max_age`           |
//! | link        | (item, file id)  | the link's own TTL | `max_age` or expiry |
//!
//! A refresh that fails for any reason other than `Unauthorized` falls
//! back to the stale entry when there is one. Links held by an open file
//! handle are never evicted.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use dashmap::DashMap;

use super::coalesce::Coalescer;
use super::node::{join_path, split_path, NodeKind, VirtualNode};
use crate::config::{DEFAULT_CACHE_MAX_AGE_SECS, DEFAULT_DIRECTORY_TTL_SECS};
use crate::media::{sanitize_component, strip_media_extension};
use crate::remote::{FileRef, Link, RemoteApi, RemoteError, RemoteItem};

/// Errors returned by cache lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// Cache timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a listing is served without asking the remote.
    pub directory_ttl: Duration,
    /// Idle time after which item trees and links are dropped.
    pub max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory_ttl: Duration::from_secs(DEFAULT_DIRECTORY_TTL_SECS),
            max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
        }
    }
}

/// Counters exposed for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub items: usize,
    pub links: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone)]
struct RootSnapshot {
    fetched_at: Instant,
    populated_at: SystemTime,
    /// Item directories sorted by name.
    dirs: Vec<VirtualNode>,
    by_name: HashMap<String, String>,
    by_id: HashMap<String, String>,
}

impl RootSnapshot {
    fn build(items: &[RemoteItem]) -> Self {
        let populated_at = SystemTime::now();

        let mut groups: BTreeMap<String, Vec<&RemoteItem>> = BTreeMap::new();
        for item in items.iter().filter(|i| i.is_listable()) {
            groups
                .entry(directory_name(&item.name))
                .or_default()
                .push(item);
        }

        let mut dirs = Vec::new();
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (name, mut group) in groups {
            group.sort_by(|a, b| a.id.cmp(&b.id));
            for (idx, item) in group.into_iter().enumerate() {
                let dir = if idx == 0 {
                    name.clone()
                } else {
                    format!("{} [{}]", name, item.id)
                };
                by_name.insert(dir.clone(), item.id.clone());
                by_id.insert(item.id.clone(), dir.clone());
                dirs.push(VirtualNode {
                    name: dir.clone(),
                    path: dir,
                    parent: String::new(),
                    size: item.bytes,
                    populated_at,
                    kind: NodeKind::Directory,
                    item_id: item.id.clone(),
                });
            }
        }
        dirs.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            fetched_at: Instant::now(),
            populated_at,
            dirs,
            by_name,
            by_id,
        }
    }
}

/// Directory name for an item in the mount root.
pub fn directory_name(item_name: &str) -> String {
    let sanitized = sanitize_component(item_name);
    strip_media_extension(&sanitized).to_string()
}

#[derive(Debug, Clone)]
struct TreeEntry {
    name: String,
    size: u64,
    file: Option<FileRef>,
}

#[derive(Debug)]
struct ItemTree {
    fetched_at: Instant,
    populated_at: SystemTime,
    last_used_ms: AtomicU64,
    /// Children per item-relative directory; `""` is the item root.
    dirs: HashMap<String, Vec<TreeEntry>>,
    /// Every entry keyed by its item-relative path.
    entries: HashMap<String, TreeEntry>,
}

impl ItemTree {
    fn build(item: &RemoteItem, now_ms: u64) -> Self {
        let mut dirs: HashMap<String, Vec<TreeEntry>> = HashMap::new();
        let mut entries: HashMap<String, TreeEntry> = HashMap::new();
        dirs.insert(String::new(), Vec::new());

        for file in item.selected_files() {
            let Some(link) = item.link_for(file.id) else {
                debug!(item = %item.id, file = file.id, "Selected file has no link yet, skipping");
                continue;
            };
            let components: Vec<String> = split_path(&file.path)
                .into_iter()
                .map(sanitize_component)
                .collect();
            let Some((leaf, folders)) = components.split_last() else {
                continue;
            };

            let mut parent = String::new();
            let mut blocked = false;
            for folder in folders {
                let rel = join_path(&parent, folder);
                match entries.get(&rel) {
                    Some(existing) if existing.file.is_some() => {
                        blocked = true;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        let entry = TreeEntry {
                            name: folder.clone(),
                            size: 0,
                            file: None,
                        };
                        entries.insert(rel.clone(), entry.clone());
                        dirs.entry(parent.clone()).or_default().push(entry);
                        dirs.entry(rel.clone()).or_default();
                    }
                }
                parent = rel;
            }

            let rel = join_path(&parent, leaf);
            if blocked || entries.contains_key(&rel) {
                warn!(item = %item.id, path = %file.path, "Conflicting file path, skipping");
                continue;
            }
            let entry = TreeEntry {
                name: leaf.clone(),
                size: file.bytes,
                file: Some(FileRef {
                    item_id: item.id.clone(),
                    file_id: file.id,
                    hoster_link: link.to_string(),
                }),
            };
            entries.insert(rel, entry.clone());
            dirs.entry(parent).or_default().push(entry);
        }

        for children in dirs.values_mut() {
            children.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Self {
            fetched_at: Instant::now(),
            populated_at: SystemTime::now(),
            last_used_ms: AtomicU64::new(now_ms),
            dirs,
            entries,
        }
    }

    fn node(&self, dir_name: &str, item_id: &str, rel: &str, entry: &TreeEntry) -> VirtualNode {
        let parent_rel = rel.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        VirtualNode {
            name: entry.name.clone(),
            path: join_path(dir_name, rel),
            parent: join_path(dir_name, parent_rel),
            size: entry.size,
            populated_at: self.populated_at,
            kind: match &entry.file {
                Some(file) => NodeKind::File(file.clone()),
                None => NodeKind::Directory,
            },
            item_id: item_id.to_string(),
        }
    }

    fn children(&self, dir_name: &str, item_id: &str, rel: &str) -> Option<Vec<VirtualNode>> {
        self.dirs.get(rel).map(|children| {
            children
                .iter()
                .map(|entry| {
                    let child_rel = join_path(rel, &entry.name);
                    self.node(dir_name, item_id, &child_rel, entry)
                })
                .collect()
        })
    }
}

struct CachedLink {
    link: Arc<Link>,
    last_used_ms: AtomicU64,
}

/// Shared cache in front of the remote client.
pub struct MetadataCache {
    remote: Arc<dyn RemoteApi>,
    config: CacheConfig,
    epoch: Instant,
    root: RwLock<Option<Arc<RootSnapshot>>>,
    root_invalidated: AtomicBool,
    items: RwLock<HashMap<String, Arc<ItemTree>>>,
    invalidated_items: RwLock<HashSet<String>>,
    links: DashMap<(String, u64), CachedLink>,
    root_flight: Coalescer<(), Result<Arc<RootSnapshot>, CacheError>>,
    item_flight: Coalescer<String, Result<Arc<ItemTree>, CacheError>>,
    link_flight: Coalescer<(String, u64), Result<Arc<Link>, CacheError>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(remote: Arc<dyn RemoteApi>, config: CacheConfig) -> Self {
        Self {
            remote,
            config,
            epoch: Instant::now(),
            root: RwLock::new(None),
            root_invalidated: AtomicBool::new(false),
            items: RwLock::new(HashMap::new()),
            invalidated_items: RwLock::new(HashSet::new()),
            links: DashMap::new(),
            root_flight: Coalescer::new(),
            item_flight: Coalescer::new(),
            link_flight: Coalescer::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    // ---------------------------------------------------------------
    // Root
    // ---------------------------------------------------------------

    fn fresh_root(&self) -> Option<Arc<RootSnapshot>> {
        if self.root_invalidated.load(Ordering::Acquire) {
            return None;
        }
        self.root
            .read()
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.config.directory_ttl)
            .cloned()
    }

    async fn root(&self) -> Result<Arc<RootSnapshot>, CacheError> {
        if let Some(snapshot) = self.fresh_root() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.root_flight.run((), || self.refresh_root()).await
    }

    async fn refresh_root(&self) -> Result<Arc<RootSnapshot>, CacheError> {
        // Cleared before the call so an invalidation landing mid-flight
        // forces another refresh
        self.root_invalidated.store(false, Ordering::Release);

        match self.remote.list_items().await {
            Ok(items) => {
                let snapshot = Arc::new(RootSnapshot::build(&items));
                debug!(items = snapshot.dirs.len(), "Refreshed root listing");
                *self.root.write() = Some(snapshot.clone());
                self.items
                    .write()
                    .retain(|id, _| snapshot.by_id.contains_key(id));
                Ok(snapshot)
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                let stale = self.root.read().clone();
                match stale {
                    Some(stale) => {
                        warn!(error = %err, "Root refresh failed, serving stale listing");
                        let retained = Arc::new(RootSnapshot {
                            fetched_at: Instant::now(),
                            ..(*stale).clone()
                        });
                        *self.root.write() = Some(retained.clone());
                        Ok(retained)
                    }
                    None => Err(err.into()),
                }
            }
        }
    }

    /// Item directories in the mount root.
    pub async fn list_root(&self) -> Result<Vec<VirtualNode>, CacheError> {
        Ok(self.root().await?.dirs.clone())
    }

    // ---------------------------------------------------------------
    // Item trees
    // ---------------------------------------------------------------

    fn fresh_tree(&self, id: &str) -> Option<Arc<ItemTree>> {
        if self.invalidated_items.read().contains(id) {
            return None;
        }
        self.items
            .read()
            .get(id)
            .filter(|t| t.fetched_at.elapsed() < self.config.directory_ttl)
            .cloned()
    }

    async fn tree(&self, id: &str) -> Result<Arc<ItemTree>, CacheError> {
        if let Some(tree) = self.fresh_tree(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tree.last_used_ms.store(self.now_ms(), Ordering::Relaxed);
            return Ok(tree);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.item_flight
            .run(id.to_string(), || self.refresh_tree(id))
            .await
    }

    async fn refresh_tree(&self, id: &str) -> Result<Arc<ItemTree>, CacheError> {
        self.invalidated_items.write().remove(id);

        match self.remote.get_item(id).await {
            Ok(item) => {
                let tree = Arc::new(ItemTree::build(&item, self.now_ms()));
                self.items.write().insert(id.to_string(), tree.clone());
                Ok(tree)
            }
            Err(RemoteError::NotFound(_)) => {
                info!(item = %id, "Item disappeared remotely");
                self.invalidate(id);
                Err(CacheError::NotFound(id.to_string()))
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                let stale = self.items.read().get(id).cloned();
                match stale {
                    Some(stale) => {
                        warn!(item = %id, error = %err, "Item refresh failed, serving stale tree");
                        Ok(stale)
                    }
                    None => Err(err.into()),
                }
            }
        }
    }

    fn known_directory_name(&self, id: &str) -> Option<String> {
        self.root.read().as_ref()?.by_id.get(id).cloned()
    }

    /// Top-level entries of one item, fetching its details on a miss.
    pub async fn get_directory(&self, id: &str) -> Result<Vec<VirtualNode>, CacheError> {
        let tree = self.tree(id).await?;
        let dir_name = match self.known_directory_name(id) {
            Some(name) => name,
            None => {
                // Not in the root listing yet; name it the way the root would
                let root = self.root().await?;
                root.by_id
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CacheError::NotFound(id.to_string()))?
            }
        };
        Ok(tree.children(&dir_name, id, "").unwrap_or_default())
    }

    /// Children of a directory path.
    pub async fn list(&self, path: &str) -> Result<Vec<VirtualNode>, CacheError> {
        let components = split_path(path);
        let Some((dir_name, rest)) = components.split_first() else {
            return self.list_root().await;
        };

        let root = self.root().await?;
        let id = root
            .by_name
            .get(*dir_name)
            .ok_or_else(|| CacheError::NotFound(path.to_string()))?;
        let tree = self.tree(id).await?;
        let rel = rest.join("/");

        match tree.children(dir_name, id, &rel) {
            Some(children) => Ok(children),
            None if tree.entries.contains_key(&rel) => {
                Err(CacheError::NotADirectory(path.to_string()))
            }
            None => Err(CacheError::NotFound(path.to_string())),
        }
    }

    /// Metadata of a single path.
    pub async fn stat(&self, path: &str) -> Result<VirtualNode, CacheError> {
        let components = split_path(path);
        let Some((dir_name, rest)) = components.split_first() else {
            let root = self.root().await?;
            return Ok(VirtualNode::root(root.populated_at));
        };

        let root = self.root().await?;
        let id = root
            .by_name
            .get(*dir_name)
            .ok_or_else(|| CacheError::NotFound(path.to_string()))?;

        if rest.is_empty() {
            return root
                .dirs
                .iter()
                .find(|d| d.name == *dir_name)
                .cloned()
                .ok_or_else(|| CacheError::NotFound(path.to_string()));
        }

        let tree = self.tree(id).await?;
        let rel = rest.join("/");
        tree.entries
            .get(&rel)
            .map(|entry| tree.node(dir_name, id, &rel, entry))
            .ok_or_else(|| CacheError::NotFound(path.to_string()))
    }

    // ---------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------

    fn cached_link(&self, key: &(String, u64)) -> Option<Arc<Link>> {
        let entry = self.links.get(key)?;
        if entry.link.is_expired() {
            return None;
        }
        entry.last_used_ms.store(self.now_ms(), Ordering::Relaxed);
        Some(entry.link.clone())
    }

    /// Download link for a file, resolving it when absent or expired.
    pub async fn get_link(&self, file: &FileRef) -> Result<Arc<Link>, CacheError> {
        let key = file.key();
        if let Some(link) = self.cached_link(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(link);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        self.link_flight
            .run(key.clone(), || async {
                match self.remote.resolve_link(file).await {
                    Ok(link) => {
                        let link = Arc::new(link);
                        self.links.insert(
                            key.clone(),
                            CachedLink {
                                link: link.clone(),
                                last_used_ms: AtomicU64::new(self.now_ms()),
                            },
                        );
                        Ok(link)
                    }
                    Err(RemoteError::NotFound(detail)) => {
                        self.invalidate(&file.item_id);
                        Err(CacheError::Remote(RemoteError::NotFound(detail)))
                    }
                    Err(err) => Err(err.into()),
                }
            })
            .await
    }

    /// Drop the cached link for a file so the next read re-resolves it.
    pub fn invalidate_link(&self, file: &FileRef) {
        self.links.remove(&file.key());
    }

    /// Forget everything known about an item.
    ///
    /// The next root listing and the next lookup of the item both go to
    /// the remote.
    pub fn invalidate(&self, id: &str) {
        self.items.write().remove(id);
        self.invalidated_items.write().insert(id.to_string());
        self.links.retain(|(item_id, _), _| item_id != id);
        self.root_invalidated.store(true, Ordering::Release);
        debug!(item = %id, "Invalidated cached item");
    }

    /// Drop idle item trees and links. Links still held by a reader stay.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.now_ms();
        let max_age = self.config.max_age.as_millis() as u64;
        let idle = |last_used: &AtomicU64| {
            now.saturating_sub(last_used.load(Ordering::Relaxed)) >= max_age
        };

        let mut evicted = 0;
        self.items.write().retain(|_, tree| {
            let keep = Arc::strong_count(tree) > 1 || !idle(&tree.last_used_ms);
            if !keep {
                evicted += 1;
            }
            keep
        });
        self.links.retain(|_, cached| {
            let keep = Arc::strong_count(&cached.link) > 1
                || !(cached.link.is_expired() || idle(&cached.last_used_ms));
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!(evicted, "Evicted idle cache entries");
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            items: self.items.read().len(),
            links: self.links.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemote;
    use crate::remote::ItemStatus;

    fn cache(remote: Arc<MockRemote>) -> MetadataCache {
        MetadataCache::new(
            remote,
            CacheConfig {
                directory_ttl: Duration::from_secs(30),
                max_age: Duration::from_secs(300),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_lists_only_downloaded_items() {
        let remote = Arc::new(
            MockRemote::new()
                .with_file("A", "Movie.Title.2021.mkv", b"data")
                .with_item(MockRemote::item(
                    "B",
                    "Still.Going",
                    ItemStatus::Downloading,
                    &[("x.mkv", 1)],
                )),
        );
        let cache = cache(remote);

        let root = cache.list_root().await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].name, "Movie.Title.2021");
        assert_eq!(root[0].item_id, "A");
        assert!(root[0].is_dir());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_names_get_id_suffix() {
        let second = MockRemote::item("B", "Same.mkv", ItemStatus::Downloaded, &[("a.mkv", 1)]);
        let first = MockRemote::item("A", "Same", ItemStatus::Downloaded, &[("b.mkv", 1)]);
        let remote = Arc::new(MockRemote::new().with_item(second).with_item(first));
        let cache = cache(remote);

        let names: Vec<String> = cache
            .list_root()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["Same".to_string(), "Same [B]".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_files_become_directories() {
        let item = MockRemote::item(
            "S",
            "Show.S01",
            ItemStatus::Downloaded,
            &[
                ("Show.S01/Show.S01E01.mkv", 10),
                ("Show.S01/Show.S01E02.mkv", 20),
                ("Show.S01/Subs/en.srt", 1),
            ],
        );
        let remote = Arc::new(MockRemote::new().with_item(item));
        let cache = cache(remote);

        let top = cache.list("Show.S01").await.unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].is_dir());
        assert_eq!(top[0].path, "Show.S01/Show.S01");

        let inner = cache.list("/Show.S01/Show.S01").await.unwrap();
        let names: Vec<&str> = inner.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Show.S01E01.mkv", "Show.S01E02.mkv", "Subs"]);

        let ep = cache.stat("Show.S01/Show.S01/Show.S01E02.mkv").await.unwrap();
        assert_eq!(ep.size, 20);
        assert_eq!(ep.parent, "Show.S01/Show.S01");
        assert_eq!(ep.file_ref().unwrap().file_id, 2);

        assert_eq!(
            cache.list("Show.S01/Show.S01/Show.S01E01.mkv").await,
            Err(CacheError::NotADirectory(
                "Show.S01/Show.S01/Show.S01E01.mkv".to_string()
            ))
        );
        assert!(matches!(
            cache.stat("Show.S01/missing").await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_is_cached_within_ttl() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let cache = cache(remote.clone());

        cache.list_root().await.unwrap();
        cache.list_root().await.unwrap();
        assert_eq!(remote.calls.list.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.list_root().await.unwrap();
        assert_eq!(remote.calls.list.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_make_one_call() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        remote.set_delay(Duration::from_millis(100));
        let cache = Arc::new(cache(remote.clone()));
        cache.list_root().await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get_directory("A").await }));
        }
        for task in tasks {
            let entries = task.await.unwrap().unwrap();
            assert_eq!(entries.len(), 1);
        }

        assert_eq!(remote.calls.get.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let cache = cache(remote.clone());
        assert_eq!(cache.list("a").await.unwrap().len(), 1);

        remote.update("A", |item| {
            item.files.push(crate::remote::RemoteFile {
                id: 2,
                path: "b.mkv".into(),
                bytes: 5,
                selected: true,
            });
            item.links.push("https://hoster.test/A/2".into());
        });
        // Still served from cache
        assert_eq!(cache.list("a").await.unwrap().len(), 1);

        cache.invalidate("A");
        assert_eq!(cache.list("a").await.unwrap().len(), 2);
        assert_eq!(remote.calls.list.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_item_disappears_after_invalidate() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let cache = cache(remote.clone());
        assert_eq!(cache.list_root().await.unwrap().len(), 1);

        remote.remove("A");
        cache.invalidate("A");

        assert!(cache.list_root().await.unwrap().is_empty());
        assert!(matches!(cache.list("a").await, Err(CacheError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_root_served_when_refresh_fails() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let cache = cache(remote.clone());
        cache.list_root().await.unwrap();

        remote.fail_next_list(RemoteError::Transient("connection reset".into()));
        tokio::time::advance(Duration::from_secs(31)).await;

        let root = cache.list_root().await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(remote.calls.list.load(Ordering::SeqCst), 2);
        // The retained snapshot counts as fresh again
        cache.list_root().await.unwrap();
        assert_eq!(remote.calls.list.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_masked_by_stale_root() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let cache = cache(remote.clone());
        cache.list_root().await.unwrap();

        remote.set_unauthorized();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(
            cache.list_root().await,
            Err(CacheError::Remote(RemoteError::Unauthorized))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_is_cached_and_invalidated() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let cache = cache(remote.clone());
        let node = cache.stat("a/a.mkv").await.unwrap();
        let file = node.file_ref().unwrap().clone();

        let first = cache.get_link(&file).await.unwrap();
        let second = cache.get_link(&file).await.unwrap();
        assert_eq!(first.url, second.url);
        assert_eq!(remote.calls.resolve.load(Ordering::SeqCst), 1);

        cache.invalidate_link(&file);
        cache.get_link(&file).await.unwrap();
        assert_eq!(remote.calls.resolve.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_keeps_links_in_use() {
        let remote = Arc::new(
            MockRemote::new()
                .with_file("A", "a.mkv", b"x")
                .with_file("B", "b.mkv", b"y"),
        );
        let cache = cache(remote.clone());
        let a = cache.stat("a/a.mkv").await.unwrap().file_ref().unwrap().clone();
        let b = cache.stat("b/b.mkv").await.unwrap().file_ref().unwrap().clone();

        let held = cache.get_link(&a).await.unwrap();
        drop(cache.get_link(&b).await.unwrap());

        tokio::time::advance(Duration::from_secs(301)).await;
        let evicted = cache.evict_expired();

        // Both trees plus the unheld link
        assert_eq!(evicted, 3);
        assert_eq!(cache.stats().links, 1);
        assert_eq!(cache.cached_link(&a.key()).unwrap().url, held.url);
        assert!(cache.cached_link(&b.key()).is_none());
    }
}
