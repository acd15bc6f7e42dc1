//! Path-addressed entries of the mount.

use std::time::SystemTime;

use crate::remote::FileRef;

/// What a [`VirtualNode`] stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The mount root, an item, or a folder inside an item.
    Directory,
    /// A selected remote file.
    File(FileRef),
}

/// One entry of the mount.
///
/// `path` and `parent` are mount-relative with `/` separators; the mount
/// root is the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    pub name: String,
    pub path: String,
    pub parent: String,
    pub size: u64,
    /// When the listing this node came from was fetched.
    pub populated_at: SystemTime,
    pub kind: NodeKind,
    /// Owning remote item; empty for the mount root.
    pub item_id: String,
}

impl VirtualNode {
    pub fn root(populated_at: SystemTime) -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            parent: String::new(),
            size: 0,
            populated_at,
            kind: NodeKind::Directory,
            item_id: String::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn file_ref(&self) -> Option<&FileRef> {
        match &self.kind {
            NodeKind::File(file) => Some(file),
            NodeKind::Directory => None,
        }
    }
}

/// Join two mount-relative paths.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Split a path into its non-empty components.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".").collect()
}
