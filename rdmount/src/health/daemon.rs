//! Periodic health loop.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::HealthError;
use super::monitor::HealthMonitor;

/// Background daemon driving a [`HealthMonitor`].
///
/// The first check runs immediately so progress baselines exist one
/// interval earlier.
pub struct HealthDaemon {
    monitor: HealthMonitor,
    interval: Duration,
}

impl HealthDaemon {
    pub fn new(monitor: HealthMonitor, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    /// Runs until `shutdown` is cancelled or a check fails fatally.
    ///
    /// A fatal failure, such as a rejected token, is returned.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), HealthError> {
        let config = self.monitor.config();
        info!(
            interval_secs = self.interval.as_secs(),
            repair = config.repair,
            cleanup_archives = config.cleanup_archives,
            "Health daemon starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Health daemon shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    match self.monitor.check().await {
                        Ok(report) => debug!(
                            checked = report.checked,
                            unhealthy = report.summary.unhealthy,
                            "Health check done"
                        ),
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "Health daemon stopping");
                            return Err(e);
                        }
                        Err(e) => warn!(error = %e, "Health check failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthConfig;
    use crate::notify::NoopNotifier;
    use crate::remote::mock::MockRemote;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_daemon_checks_each_interval() {
        let remote = Arc::new(MockRemote::new().with_file("A", "a.mkv", b"x"));
        let monitor = HealthMonitor::new(
            remote.clone(),
            HealthConfig::default(),
            Arc::new(NoopNotifier),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            HealthDaemon::new(monitor, Duration::from_secs(60)).run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(remote.calls.list.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_daemon_stops_on_unauthorized() {
        let remote = Arc::new(MockRemote::new());
        remote.set_unauthorized();
        let monitor = HealthMonitor::new(
            remote,
            HealthConfig::default(),
            Arc::new(NoopNotifier),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            HealthDaemon::new(monitor, Duration::from_secs(1)).run(CancellationToken::new()),
        )
        .await
        .expect("daemon exits on its own");

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            HealthError::Remote(crate::remote::RemoteError::Unauthorized)
        ));
    }
}
