//! Periodic resolver loop.
//!
//! Runs one cycle immediately, then one per interval until cancelled. A
//! cycle that is still running when the next tick is due delays that
//! tick instead of queueing another.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::ResolveError;
use super::library::Resolver;
use super::scanner::SourceScanner;

/// Background daemon driving a [`Resolver`].
pub struct ResolverDaemon<S> {
    resolver: Resolver<S>,
    interval: Duration,
}

impl<S: SourceScanner> ResolverDaemon<S> {
    pub fn new(resolver: Resolver<S>, interval: Duration) -> Self {
        Self { resolver, interval }
    }

    /// Runs until `shutdown` is cancelled or a cycle fails fatally, in
    /// which case the error is returned.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ResolveError> {
        info!(
            interval_secs = self.interval.as_secs(),
            movies = %self.resolver.roots().movies.display(),
            tv = %self.resolver.roots().tv.display(),
            "Resolver daemon starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Resolver daemon shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    match self.resolver.run_once().await {
                        Ok(report) => debug!(?report, "Resolver cycle complete"),
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "Resolver stopping");
                            return Err(e);
                        }
                        Err(e) => warn!(error = %e, "Resolver cycle failed, library left as is"),
                    }
                }
            }
        }
    }
}
