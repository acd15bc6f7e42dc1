//! Open-file arena.
//!
//! Each `open` gets its own [`FileHandle`] keyed by an opaque id; two opens
//! of the same file never share a handle or its link slot.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::VirtualNode;
use crate::remote::{FileRef, Link};

/// State of one open file.
#[derive(Debug)]
pub struct FileHandle {
    node: VirtualNode,
    file: FileRef,
    link: Mutex<Option<Arc<Link>>>,
    last_offset: AtomicU64,
}

impl FileHandle {
    fn new(node: VirtualNode, file: FileRef) -> Self {
        Self {
            node,
            file,
            link: Mutex::new(None),
            last_offset: AtomicU64::new(0),
        }
    }

    pub fn node(&self) -> &VirtualNode {
        &self.node
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    /// The handle's link if it has one that has not expired.
    pub fn link(&self) -> Option<Arc<Link>> {
        self.link.lock().clone().filter(|link| !link.is_expired())
    }

    pub fn set_link(&self, link: Option<Arc<Link>>) {
        *self.link.lock() = link;
    }

    /// End offset of the last successful read.
    pub fn last_offset(&self) -> u64 {
        self.last_offset.load(Ordering::Relaxed)
    }

    pub fn record_read(&self, offset: u64, len: usize) {
        self.last_offset.store(offset + len as u64, Ordering::Relaxed);
    }
}

/// Handles keyed by id. Ids are never reused within a process.
pub struct HandleTable {
    next_id: AtomicU64,
    handles: DashMap<u64, Arc<FileHandle>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handles: DashMap::new(),
        }
    }

    pub fn insert(&self, node: VirtualNode, file: FileRef) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, Arc::new(FileHandle::new(node, file)));
        id
    }

    pub fn get(&self, id: u64) -> Option<Arc<FileHandle>> {
        self.handles.get(&id).map(|h| Arc::clone(h.value()))
    }

    pub fn remove(&self, id: u64) -> Option<Arc<FileHandle>> {
        self.handles.remove(&id).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NodeKind;
    use std::time::{Duration, SystemTime};

    fn file_node() -> (VirtualNode, FileRef) {
        let file = FileRef {
            item_id: "A".into(),
            file_id: 1,
            hoster_link: "https://hoster.test/A/1".into(),
        };
        let node = VirtualNode {
            name: "a.mkv".into(),
            path: "a/a.mkv".into(),
            parent: "a".into(),
            size: 10,
            populated_at: SystemTime::now(),
            kind: NodeKind::File(file.clone()),
            item_id: "A".into(),
        };
        (node, file)
    }

    #[test]
    fn test_ids_are_unique_per_open() {
        let table = HandleTable::new();
        let (node, file) = file_node();
        let a = table.insert(node.clone(), file.clone());
        let b = table.insert(node, file);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        assert!(table.remove(a).is_some());
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_slot_hides_expired_links() {
        let table = HandleTable::new();
        let (node, file) = file_node();
        let handle = table.get(table.insert(node, file)).unwrap();

        handle.set_link(Some(Arc::new(Link::new("https://dl/1", Duration::from_secs(5)))));
        assert!(handle.link().is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(handle.link().is_none());
    }
}
