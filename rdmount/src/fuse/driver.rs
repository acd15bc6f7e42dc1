//! Host-independent filesystem surface.
//!
//! [`VirtualFs`] answers path-based calls against the [`MetadataCache`]; the
//! kernel adapter in [`super::fuse3`] only translates inodes to paths. Every
//! read is exactly one range request and nothing read is kept.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::error::FsError;
use super::handles::{FileHandle, HandleTable};
use crate::cache::{MetadataCache, VirtualNode};
use crate::config::DEFAULT_READ_TIMEOUT_SECS;
use crate::remote::{Link, RemoteError};

/// Read-only view of the remote library.
pub struct VirtualFs {
    cache: Arc<MetadataCache>,
    handles: HandleTable,
    read_timeout: Duration,
}

impl VirtualFs {
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self {
            cache,
            handles: HandleTable::new(),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }

    /// Upper bound for a single read, link resolution included.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Number of open file handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    pub async fn list(&self, path: &str) -> Result<Vec<VirtualNode>, FsError> {
        trace!(path, "list");
        Ok(self.cache.list(path).await?)
    }

    pub async fn stat(&self, path: &str) -> Result<VirtualNode, FsError> {
        trace!(path, "stat");
        Ok(self.cache.stat(path).await?)
    }

    /// Open a file for reading. No bytes are fetched.
    pub async fn open(&self, path: &str) -> Result<u64, FsError> {
        let node = self.stat(path).await?;
        let file = node
            .file_ref()
            .cloned()
            .ok_or_else(|| FsError::IsADirectory(path.to_string()))?;
        let fh = self.handles.insert(node, file);
        debug!(path, fh, "Opened file");
        Ok(fh)
    }

    /// Read up to `size` bytes at `offset`.
    ///
    /// Reads at or past the end of the file return an empty buffer.
    pub async fn read(&self, fh: u64, offset: u64, size: u32) -> Result<Bytes, FsError> {
        let handle = self.handles.get(fh).ok_or(FsError::BadHandle(fh))?;
        let file_size = handle.node().size;
        if offset >= file_size || size == 0 {
            return Ok(Bytes::new());
        }
        let length = u64::from(size).min(file_size - offset);

        match tokio::time::timeout(self.read_timeout, self.read_range(&handle, offset, length))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    path = %handle.node().path,
                    offset,
                    length,
                    timeout_secs = self.read_timeout.as_secs(),
                    "Read timed out"
                );
                Err(FsError::TimedOut(self.read_timeout.as_secs()))
            }
        }
    }

    async fn read_range(
        &self,
        handle: &FileHandle,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, FsError> {
        let link = self.link_for(handle).await?;
        let remote = self.cache.remote();

        let data = match remote.fetch_range(&link, offset, length).await {
            Ok(data) => data,
            Err(RemoteError::LinkExpired) => {
                debug!(path = %handle.node().path, "Download link refused, re-resolving");
                handle.set_link(None);
                self.cache.invalidate_link(handle.file());
                let link = self.link_for(handle).await?;
                remote
                    .fetch_range(&link, offset, length)
                    .await
                    .map_err(|err| FsError::Io(err.to_string()))?
            }
            Err(err) => return Err(FsError::Io(err.to_string())),
        };

        handle.record_read(offset, data.len());
        Ok(data)
    }

    async fn link_for(&self, handle: &FileHandle) -> Result<Arc<Link>, FsError> {
        if let Some(link) = handle.link() {
            return Ok(link);
        }
        let link = self.cache.get_link(handle.file()).await?;
        handle.set_link(Some(link.clone()));
        Ok(link)
    }

    pub fn release(&self, fh: u64) -> Result<(), FsError> {
        let handle = self.handles.remove(fh).ok_or(FsError::BadHandle(fh))?;
        debug!(
            path = %handle.node().path,
            fh,
            last_offset = handle.last_offset(),
            "Released file"
        );
        Ok(())
    }

    /// The mount holds no symlinks.
    pub async fn readlink(&self, path: &str) -> Result<String, FsError> {
        self.stat(path).await?;
        Err(FsError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::remote::mock::MockRemote;
    use std::sync::atomic::Ordering;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn driver(remote: Arc<MockRemote>) -> VirtualFs {
        let cache = Arc::new(MetadataCache::new(remote, CacheConfig::default()));
        VirtualFs::new(cache).with_read_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_open_fetches_nothing() {
        let remote = Arc::new(MockRemote::new().with_file("A", "Movie.2021.mkv", &content(10)));
        let fs = driver(remote.clone());

        let fh = fs.open("Movie.2021/Movie.2021.mkv").await.unwrap();
        assert_eq!(fs.open_handles(), 1);
        assert_eq!(remote.calls.resolve.load(Ordering::SeqCst), 0);
        assert_eq!(remote.calls.fetch.load(Ordering::SeqCst), 0);

        fs.release(fh).unwrap();
        assert_eq!(fs.open_handles(), 0);
        assert_eq!(fs.release(fh), Err(FsError::BadHandle(fh)));
    }

    #[tokio::test]
    async fn test_read_issues_one_range_request() {
        let data = content(4096);
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &data));
        let fs = driver(remote.clone());
        let fh = fs.open("a/a.mkv").await.unwrap();

        let bytes = fs.read(fh, 100, 1000).await.unwrap();
        assert_eq!(&bytes[..], &data[100..1100]);
        assert_eq!(remote.calls.fetch.load(Ordering::SeqCst), 1);

        // Second read reuses the handle's link
        fs.read(fh, 1100, 10).await.unwrap();
        assert_eq!(remote.calls.resolve.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_past_end_is_short_or_empty() {
        let data = content(100);
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &data));
        let fs = driver(remote.clone());
        let fh = fs.open("a/a.mkv").await.unwrap();

        let tail = fs.read(fh, 90, 64).await.unwrap();
        assert_eq!(&tail[..], &data[90..]);

        let past = fs.read(fh, 100, 64).await.unwrap();
        assert!(past.is_empty());
        let far = fs.read(fh, 10_000, 64).await.unwrap();
        assert!(far.is_empty());
        assert_eq!(remote.calls.fetch.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_reads_of_a_range_agree() {
        let data = content(2048);
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &data));
        let fs = driver(remote.clone());

        let first = fs.open("a/a.mkv").await.unwrap();
        let second = fs.open("a/a.mkv").await.unwrap();
        let once = fs.read(first, 512, 256).await.unwrap();
        let again = fs.read(first, 512, 256).await.unwrap();
        let other_handle = fs.read(second, 512, 256).await.unwrap();

        assert_eq!(once, again);
        assert_eq!(once, other_handle);
        assert_eq!(&once[..], &data[512..768]);
    }

    #[tokio::test]
    async fn test_invalidate_exposes_changed_file() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &content(100)));
        let cache = Arc::new(MetadataCache::new(remote.clone(), CacheConfig::default()));
        let fs = VirtualFs::new(cache.clone());
        assert_eq!(fs.stat("a/a.mkv").await.unwrap().size, 100);

        let grown = content(300);
        remote.update("A", |item| {
            item.files[0].bytes = 300;
            item.bytes = 300;
        });
        remote.set_content("A", 1, &grown);

        // Still within the directory TTL
        assert_eq!(fs.stat("a/a.mkv").await.unwrap().size, 100);

        cache.invalidate("A");
        assert_eq!(fs.stat("a/a.mkv").await.unwrap().size, 300);

        let fh = fs.open("a/a.mkv").await.unwrap();
        let tail = fs.read(fh, 250, 100).await.unwrap();
        assert_eq!(&tail[..], &grown[250..]);
    }

    #[tokio::test]
    async fn test_expired_link_is_re_resolved_once() {
        let data = content(256);
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &data));
        let fs = driver(remote.clone());
        let fh = fs.open("a/a.mkv").await.unwrap();
        fs.read(fh, 0, 16).await.unwrap();

        remote.expire_links();
        let bytes = fs.read(fh, 16, 16).await.unwrap();

        assert_eq!(&bytes[..], &data[16..32]);
        assert_eq!(remote.calls.resolve.load(Ordering::SeqCst), 2);
        assert_eq!(remote.calls.fetch.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_second_link_failure_is_io_error() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &content(64)));
        let fs = driver(remote.clone());
        let fh = fs.open("a/a.mkv").await.unwrap();

        remote.fail_next_fetch(RemoteError::LinkExpired);
        remote.fail_next_fetch(RemoteError::LinkExpired);
        let err = fs.read(fh, 0, 16).await.unwrap_err();
        assert_eq!(err.errno(), libc::EIO);

        // Only that read failed
        assert_eq!(fs.read(fh, 0, 16).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_directories_cannot_be_opened() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &content(8)));
        let fs = driver(remote);

        assert_eq!(
            fs.open("a").await,
            Err(FsError::IsADirectory("a".to_string()))
        );
        assert!(matches!(fs.open("a/missing.mkv").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_readlink_is_invalid() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &content(8)));
        let fs = driver(remote);
        assert_eq!(fs.readlink("a/a.mkv").await, Err(FsError::InvalidArgument));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &content(8)));
        let cache = Arc::new(MetadataCache::new(remote.clone(), CacheConfig::default()));
        let fs = VirtualFs::new(cache).with_read_timeout(Duration::from_secs(2));
        let fh = fs.open("a/a.mkv").await.unwrap();

        remote.set_fetch_delay(Duration::from_secs(10));
        assert_eq!(fs.read(fh, 0, 4).await, Err(FsError::TimedOut(2)));

        remote.set_fetch_delay(Duration::ZERO);
        assert_eq!(fs.read(fh, 0, 4).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_is_io_error() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", &content(8)));
        let fs = driver(remote.clone());
        let fh = fs.open("a/a.mkv").await.unwrap();

        remote.fail_next_fetch(RemoteError::Transient("reset".into()));
        assert!(matches!(fs.read(fh, 0, 4).await, Err(FsError::Io(_))));
        assert_eq!(remote.calls.fetch.load(Ordering::SeqCst), 1);
    }
}
