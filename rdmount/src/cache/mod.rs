//! Metadata cache between the filesystem and the remote client.
//!
//! Holds the root listing, per-item file trees and resolved download
//! links. Concurrent misses on the same key are coalesced into a single
//! remote call.

mod coalesce;
mod metadata;
mod node;

pub use coalesce::Coalescer;
pub use metadata::{directory_name, CacheConfig, CacheError, CacheStats, MetadataCache};
pub use node::{join_path, split_path, NodeKind, VirtualNode};
