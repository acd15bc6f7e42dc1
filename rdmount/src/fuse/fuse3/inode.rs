//! Inode allocation for the kernel adapter.
//!
//! Maps mount-relative paths to inode numbers and back. The root is
//! always inode 1; other inodes are handed out on first sight and stay
//! stable for the life of the mount.

use parking_lot::Mutex;
use std::collections::HashMap;

/// FUSE root inode.
pub const ROOT_INODE: u64 = 1;

struct Tables {
    inode_to_path: HashMap<u64, String>,
    path_to_inode: HashMap<String, u64>,
    next_inode: u64,
}

/// Thread-safe path/inode mapping.
pub struct InodeManager {
    tables: Mutex<Tables>,
}

impl InodeManager {
    pub fn new() -> Self {
        let mut inode_to_path = HashMap::new();
        let mut path_to_inode = HashMap::new();
        inode_to_path.insert(ROOT_INODE, String::new());
        path_to_inode.insert(String::new(), ROOT_INODE);

        Self {
            tables: Mutex::new(Tables {
                inode_to_path,
                path_to_inode,
                next_inode: ROOT_INODE + 1,
            }),
        }
    }

    /// Get or allocate the inode for a path.
    pub fn get_or_create_inode(&self, path: &str) -> u64 {
        let mut tables = self.tables.lock();
        if let Some(&inode) = tables.path_to_inode.get(path) {
            return inode;
        }

        let inode = tables.next_inode;
        tables.next_inode += 1;
        tables.path_to_inode.insert(path.to_string(), inode);
        tables.inode_to_path.insert(inode, path.to_string());
        inode
    }

    pub fn get_path(&self, inode: u64) -> Option<String> {
        self.tables.lock().inode_to_path.get(&inode).cloned()
    }

    /// Inode for a path without allocating.
    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.tables.lock().path_to_inode.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InodeManager {
    fn default() -> Self {
        Self::new()
    }
}
