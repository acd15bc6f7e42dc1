//! Mount service wiring.
//!
//! [`MountService`] builds the single shared remote client, the metadata
//! cache and the driver, mounts it, and runs the background loops next to
//! the mount:
//!
//! ```text
//!                    ┌──────────────┐
//!                    │  RemoteApi   │  one client, one rate limiter
//!                    └──────┬───────┘
//!              ┌────────────┼──────────────┐
//!      ┌───────▼──────┐     │       ┌──────▼────────┐
//!      │MetadataCache │◄────┼───────│ HealthMonitor │
//!      └───────┬──────┘     │       └───────────────┘
//!      ┌───────▼──────┐     │
//!      │  VirtualFs   │◄────┴──── Resolver (DriverScanner)
//!      └───────┬──────┘
//!      ┌───────▼──────┐
//!      │Fuse3DebridFS │
//!      └──────────────┘
//! ```
//!
//! Every loop observes one [`CancellationToken`]. Ctrl-C, an external
//! unmount or a loop stopping on a fatal error cancels it and the service
//! returns. The loop's error, if any, is what the service returns.

mod error;

pub use error::ServiceError;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, MetadataCache};
use crate::config::ConfigFile;
use crate::fuse::{Fuse3DebridFS, SpawnedMountHandle, VirtualFs};
use crate::health::{HealthConfig, HealthDaemon, HealthMonitor};
use crate::notify::notifier_for;
use crate::remote::{client_from_config, RemoteApi};
use crate::resolver::{DriverScanner, LibraryRoots, Resolver, ResolverDaemon, SourceScanner};

/// Library roots configured in `[resolver]`.
pub fn library_roots(config: &ConfigFile) -> LibraryRoots {
    LibraryRoots::new(&config.resolver.movies_path, &config.resolver.tv_path)
}

/// Resolver over `scanner` with the configured roots and update hook.
pub fn build_resolver<S: SourceScanner>(config: &ConfigFile, scanner: S) -> Resolver<S> {
    Resolver::new(
        scanner,
        library_roots(config),
        notifier_for(config.resolver.on_update.as_deref()),
    )
}

/// Health monitor with the configured policy and change hook.
pub fn build_health_monitor(config: &ConfigFile, remote: Arc<dyn RemoteApi>) -> HealthMonitor {
    HealthMonitor::new(
        remote,
        HealthConfig::from(&config.health),
        notifier_for(config.health.on_change.as_deref()),
    )
}

/// Verify the configured token and return the shared client.
pub async fn connect(config: &ConfigFile) -> Result<Arc<dyn RemoteApi>, ServiceError> {
    config.require_token()?;
    let remote = client_from_config(config)?;
    let user = remote.user_info().await?;
    info!(
        username = %user.username,
        account_type = %user.account_type,
        "Authenticated with remote service"
    );
    Ok(remote)
}

/// Builds and runs the mount plus its background loops.
pub struct MountService {
    config: ConfigFile,
    mountpoint: PathBuf,
}

impl MountService {
    pub fn new(config: ConfigFile) -> Self {
        let mountpoint = config.mount.mountpoint.clone();
        Self { config, mountpoint }
    }

    /// Mount somewhere other than the configured mountpoint.
    pub fn with_mountpoint(mut self, mountpoint: impl Into<PathBuf>) -> Self {
        self.mountpoint = mountpoint.into();
        self
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Authenticate, mount and start the background loops.
    pub async fn start(self) -> Result<RunningMount, ServiceError> {
        let remote = connect(&self.config).await?;
        self.start_with(remote).await
    }

    /// Mount with an already verified client.
    pub async fn start_with(self, remote: Arc<dyn RemoteApi>) -> Result<RunningMount, ServiceError> {
        let mount = &self.config.mount;
        let cache = Arc::new(MetadataCache::new(
            remote.clone(),
            CacheConfig {
                directory_ttl: mount.directory_ttl(),
                max_age: mount.cache_max_age(),
            },
        ));
        let fs = Arc::new(VirtualFs::new(cache.clone()).with_read_timeout(mount.read_timeout()));

        let handle = Fuse3DebridFS::new(fs.clone())
            .with_allow_other(mount.allow_other)
            .mount_spawned(&self.mountpoint)
            .await?;
        info!(mountpoint = %self.mountpoint.display(), "Mounted");

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(spawn_loop(
            &shutdown,
            evict_loop(cache.clone(), mount.directory_ttl(), shutdown.clone()),
        ));

        if self.config.resolver.enabled {
            let scanner = DriverScanner::new(fs.clone(), &self.mountpoint);
            let daemon = ResolverDaemon::new(
                build_resolver(&self.config, scanner),
                Duration::from_secs(self.config.resolver.interval),
            );
            tasks.push(spawn_loop(&shutdown, daemon.run(shutdown.clone())));
        }

        if self.config.health.enabled {
            let monitor = build_health_monitor(&self.config, remote).with_cache(cache);
            let daemon =
                HealthDaemon::new(monitor, Duration::from_secs(self.config.health.interval));
            tasks.push(spawn_loop(&shutdown, daemon.run(shutdown.clone())));
        }

        Ok(RunningMount {
            handle,
            shutdown,
            tasks,
            fs,
        })
    }

    /// Run until Ctrl-C or an external unmount.
    pub async fn run(self) -> Result<(), ServiceError> {
        self.start().await?.run_until_stopped().await
    }
}

/// A mounted filesystem and its loops.
pub struct RunningMount {
    handle: SpawnedMountHandle,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<Result<(), ServiceError>>>,
    fs: Arc<VirtualFs>,
}

impl RunningMount {
    /// Wait for Ctrl-C, cancellation or an external unmount, then stop
    /// everything.
    pub async fn run_until_stopped(mut self) -> Result<(), ServiceError> {
        let unmounted_externally = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                }
                info!("Interrupted, unmounting");
                false
            }
            _ = self.shutdown.cancelled() => false,
            result = self.handle.wait() => {
                if let Err(e) = result {
                    warn!(error = %e, "Filesystem session ended with an error");
                }
                info!("Filesystem unmounted externally");
                true
            }
        };

        self.stop(!unmounted_externally).await
    }

    /// Cancel the loops and, when `unmount` is set, unmount. Returns the
    /// first loop failure.
    async fn stop(self, unmount: bool) -> Result<(), ServiceError> {
        self.shutdown.cancel();
        let mut failure = None;
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => warn!(error = %e, "Background task ended abnormally"),
            }
        }
        if unmount {
            self.handle.unmount().await?;
        }
        info!(open_handles = self.fs.open_handles(), "Mount service stopped");
        failure.map_or(Ok(()), Err)
    }
}

/// Spawn a background loop. A loop that fails cancels `shutdown` so the
/// whole service stops with its error.
fn spawn_loop<F, E>(shutdown: &CancellationToken, run: F) -> JoinHandle<Result<(), ServiceError>>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<ServiceError>,
{
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let result = run.await.map_err(Into::into);
        if result.is_err() {
            shutdown.cancel();
        }
        result
    })
}

/// Periodically drop expired links and idle item trees.
async fn evict_loop(
    cache: Arc<MetadataCache>,
    period: Duration,
    shutdown: CancellationToken,
) -> Result<(), ServiceError> {
    let mut interval = tokio::time::interval(period);
    // Skip the first immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => return Ok(()),

            _ = interval.tick() => {
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    let stats = cache.stats();
                    debug!(
                        evicted,
                        items = stats.items,
                        links = stats.links,
                        hits = stats.hits,
                        misses = stats.misses,
                        "Evicted cache entries"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemote;
    use crate::remote::RemoteError;

    #[test]
    fn test_library_roots_follow_config() {
        let mut config = ConfigFile::default();
        config.resolver.movies_path = PathBuf::from("/lib/movies");
        config.resolver.tv_path = PathBuf::from("/lib/tv");

        let roots = library_roots(&config);

        assert_eq!(roots.movies, PathBuf::from("/lib/movies"));
        assert_eq!(roots.tv, PathBuf::from("/lib/tv"));
    }

    #[tokio::test]
    async fn test_connect_requires_token() {
        let config = ConfigFile::default();
        assert!(matches!(
            connect(&config).await,
            Err(ServiceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_mount_refuses_missing_mountpoint() {
        let remote = Arc::new(MockRemote::new());
        let service = MountService::new(ConfigFile::default())
            .with_mountpoint("/definitely/not/a/dir");

        assert!(matches!(
            service.start_with(remote).await,
            Err(ServiceError::Mount(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_loop_stops_on_cancel() {
        let remote = Arc::new(MockRemote::new());
        let cache = Arc::new(MetadataCache::new(remote, CacheConfig::default()));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(evict_loop(cache, Duration::from_secs(30), shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(95)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_loop_cancels_service() {
        let shutdown = CancellationToken::new();
        let task = spawn_loop(&shutdown, async {
            Err::<(), _>(crate::health::HealthError::Remote(RemoteError::Unauthorized))
        });

        let result = task.await.unwrap();

        assert!(matches!(result, Err(ServiceError::Unauthorized)));
        assert!(shutdown.is_cancelled());
    }
}
