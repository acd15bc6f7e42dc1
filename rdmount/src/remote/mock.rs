//! In-memory [`RemoteApi`] used by unit tests across the crate.

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    FileRef, ItemStatus, Link, RemoteApi, RemoteError, RemoteFile, RemoteItem, SourceDescriptor,
    UserInfo,
};

#[derive(Default)]
pub(crate) struct CallCounts {
    pub list: AtomicUsize,
    pub get: AtomicUsize,
    pub resolve: AtomicUsize,
    pub add: AtomicUsize,
    pub delete: AtomicUsize,
    pub fetch: AtomicUsize,
}

struct State {
    items: Vec<RemoteItem>,
    deleted: Vec<RemoteItem>,
    contents: HashMap<(String, u64), Bytes>,
    link_generation: u64,
    fetch_failures: VecDeque<RemoteError>,
    list_failures: VecDeque<RemoteError>,
    readd_status: ItemStatus,
    next_id: u64,
    unauthorized: bool,
    delay: Duration,
    fetch_delay: Duration,
}

pub(crate) struct MockRemote {
    state: Mutex<State>,
    pub calls: CallCounts,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: Vec::new(),
                deleted: Vec::new(),
                contents: HashMap::new(),
                link_generation: 0,
                fetch_failures: VecDeque::new(),
                list_failures: VecDeque::new(),
                readd_status: ItemStatus::Downloaded,
                next_id: 1,
                unauthorized: false,
                delay: Duration::ZERO,
                fetch_delay: Duration::ZERO,
            }),
            calls: CallCounts::default(),
        }
    }

    /// Build an item in the given status with one selected file per entry.
    pub fn item(id: &str, name: &str, status: ItemStatus, files: &[(&str, u64)]) -> RemoteItem {
        let files: Vec<RemoteFile> = files
            .iter()
            .enumerate()
            .map(|(i, (path, bytes))| RemoteFile {
                id: i as u64 + 1,
                path: path.to_string(),
                bytes: *bytes,
                selected: true,
            })
            .collect();
        let links = files
            .iter()
            .map(|f| format!("https://hoster.test/{}/{}", id, f.id))
            .collect();
        RemoteItem {
            id: id.to_string(),
            name: name.to_string(),
            status,
            progress: if status == ItemStatus::Downloaded { 100.0 } else { 0.0 },
            hash: format!("hash-{}", id),
            bytes: files.iter().map(|f| f.bytes).sum(),
            added: None,
            files,
            links,
        }
    }

    /// A downloaded single-file item whose file serves `content`.
    pub fn with_file(self, id: &str, file_name: &str, content: &[u8]) -> Self {
        let item = Self::item(
            id,
            file_name,
            ItemStatus::Downloaded,
            &[(file_name, content.len() as u64)],
        );
        self.state
            .lock()
            .contents
            .insert((id.to_string(), 1), Bytes::copy_from_slice(content));
        self.with_item(item)
    }

    pub fn with_item(self, item: RemoteItem) -> Self {
        self.state.lock().items.push(item);
        self
    }

    pub fn set_content(&self, item_id: &str, file_id: u64, content: &[u8]) {
        self.state
            .lock()
            .contents
            .insert((item_id.to_string(), file_id), Bytes::copy_from_slice(content));
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut RemoteItem)) {
        if let Some(item) = self.state.lock().items.iter_mut().find(|i| i.id == id) {
            f(item);
        }
    }

    pub fn remove(&self, id: &str) {
        self.state.lock().items.retain(|i| i.id != id);
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.lock().items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn find(&self, id: &str) -> Option<RemoteItem> {
        self.state.lock().items.iter().find(|i| i.id == id).cloned()
    }

    /// Invalidate every link handed out so far.
    pub fn expire_links(&self) {
        self.state.lock().link_generation += 1;
    }

    pub fn fail_next_fetch(&self, err: RemoteError) {
        self.state.lock().fetch_failures.push_back(err);
    }

    pub fn fail_next_list(&self, err: RemoteError) {
        self.state.lock().list_failures.push_back(err);
    }

    pub fn set_readd_status(&self, status: ItemStatus) {
        self.state.lock().readd_status = status;
    }

    pub fn set_unauthorized(&self) {
        self.state.lock().unauthorized = true;
    }

    /// Delay applied to listing and detail calls.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    /// Delay applied to range fetches.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = delay;
    }

    fn check_auth(&self) -> Result<Duration, RemoteError> {
        let state = self.state.lock();
        if state.unauthorized {
            return Err(RemoteError::Unauthorized);
        }
        Ok(state.delay)
    }
}

fn parse_mock_url(url: &str) -> Option<(String, u64, u64)> {
    let rest = url.strip_prefix("mock://")?;
    let mut parts = rest.split('/');
    let item = parts.next()?.to_string();
    let file = parts.next()?.parse().ok()?;
    let generation = parts.next()?.parse().ok()?;
    Some((item, file, generation))
}

impl RemoteApi for MockRemote {
    fn user_info(&self) -> BoxFuture<'_, Result<UserInfo, RemoteError>> {
        Box::pin(async move {
            self.check_auth()?;
            Ok(UserInfo {
                username: "tester".into(),
                email: "tester@example.com".into(),
                account_type: "premium".into(),
                premium_until: None,
                points: 0,
            })
        })
    }

    fn list_items(&self) -> BoxFuture<'_, Result<Vec<RemoteItem>, RemoteError>> {
        Box::pin(async move {
            self.calls.list.fetch_add(1, Ordering::SeqCst);
            let delay = self.check_auth()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.state.lock().list_failures.pop_front() {
                return Err(err);
            }
            let items = self
                .state
                .lock()
                .items
                .iter()
                .cloned()
                .map(|mut i| {
                    i.files.clear();
                    i
                })
                .collect();
            Ok(items)
        })
    }

    fn get_item<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<RemoteItem, RemoteError>> {
        Box::pin(async move {
            self.calls.get.fetch_add(1, Ordering::SeqCst);
            let delay = self.check_auth()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.find(id)
                .ok_or_else(|| RemoteError::NotFound(format!("item {}", id)))
        })
    }

    fn resolve_link<'a>(&'a self, file: &'a FileRef) -> BoxFuture<'a, Result<Link, RemoteError>> {
        Box::pin(async move {
            self.calls.resolve.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            let state = self.state.lock();
            let size = state
                .contents
                .get(&file.key())
                .map(|c| c.len() as u64);
            Ok(Link {
                url: format!(
                    "mock://{}/{}/{}",
                    file.item_id, file.file_id, state.link_generation
                ),
                issued_at: tokio::time::Instant::now(),
                ttl: Duration::from_secs(3600),
                size,
            })
        })
    }

    fn add_item<'a>(
        &'a self,
        source: &'a SourceDescriptor,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        Box::pin(async move {
            self.calls.add.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            let SourceDescriptor::Magnet(magnet) = source;
            let mut state = self.state.lock();
            let id = format!("R{}", state.next_id);
            state.next_id += 1;

            let template = state
                .deleted
                .iter()
                .rev()
                .find(|i| magnet.ends_with(&i.hash))
                .cloned();
            let mut item = template.unwrap_or_else(|| Self::item(&id, "added", ItemStatus::Queued, &[]));
            item.id = id.clone();
            item.status = state.readd_status;
            item.progress = if item.status == ItemStatus::Downloaded { 100.0 } else { 0.0 };
            state.items.push(item);
            Ok(id)
        })
    }

    fn delete_item<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            self.calls.delete.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            let mut state = self.state.lock();
            let pos = state
                .items
                .iter()
                .position(|i| i.id == id)
                .ok_or_else(|| RemoteError::NotFound(format!("item {}", id)))?;
            let removed = state.items.remove(pos);
            state.deleted.push(removed);
            Ok(())
        })
    }

    fn fetch_range<'a>(
        &'a self,
        link: &'a Link,
        offset: u64,
        length: u64,
    ) -> BoxFuture<'a, Result<Bytes, RemoteError>> {
        Box::pin(async move {
            self.calls.fetch.fetch_add(1, Ordering::SeqCst);
            let delay = self.state.lock().fetch_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state.lock();
            if let Some(err) = state.fetch_failures.pop_front() {
                return Err(err);
            }
            let (item, file, generation) =
                parse_mock_url(&link.url).ok_or(RemoteError::LinkExpired)?;
            if generation < state.link_generation {
                return Err(RemoteError::LinkExpired);
            }
            let content = state
                .contents
                .get(&(item, file))
                .cloned()
                .ok_or(RemoteError::LinkExpired)?;
            let len = content.len() as u64;
            let start = offset.min(len) as usize;
            let end = offset.saturating_add(length).min(len) as usize;
            Ok(content.slice(start..end))
        })
    }
}
