//! Health commands - evaluate, repair and clean up remote items.

use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use rdmount::health::{HealthConfig, HealthDaemon, HealthMonitor};
use rdmount::notify::NoopNotifier;
use rdmount::service::{build_health_monitor, connect};

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Health action subcommands.
#[derive(Debug, Subcommand)]
pub enum HealthAction {
    /// Check every item once, repairing and cleaning up as configured (JSON)
    Check,
    /// Per-status counts without changing anything (JSON)
    Summary,
    /// List unhealthy items without changing anything
    Unhealthy,
    /// Delete every item that holds only archives
    Cleanup,
    /// Check every INTERVAL seconds until interrupted
    Watch {
        /// Seconds between checks
        interval: u64,
    },
}

/// Run a health subcommand.
pub fn run(options: &GlobalOptions, action: HealthAction) -> Result<(), CliError> {
    let runner = CliRunner::new(options, false)?;
    runner.log_startup("health");
    let config = runner.config();
    let remote = runner.block_on(connect(config))?;

    let report_only = || {
        HealthMonitor::new(
            remote.clone(),
            HealthConfig::from(&config.health).report_only(),
            Arc::new(NoopNotifier),
        )
    };

    match action {
        HealthAction::Check => {
            let mut monitor = build_health_monitor(config, remote.clone());
            let report = runner.block_on(monitor.check())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        HealthAction::Summary => {
            let mut monitor = report_only();
            let report = runner.block_on(monitor.check())?;
            println!("{}", serde_json::to_string_pretty(&report.summary)?);
        }
        HealthAction::Unhealthy => {
            let mut monitor = report_only();
            runner.block_on(monitor.check())?;
            let unhealthy = monitor.unhealthy();
            if unhealthy.is_empty() {
                println!("No unhealthy items");
            }
            for record in unhealthy {
                println!(
                    "{}  {}  {}  (repair attempts: {})",
                    record.item_id, record.status, record.name, record.repair_attempts
                );
            }
        }
        HealthAction::Cleanup => {
            let mut monitor = build_health_monitor(config, remote.clone());
            let deleted = runner.block_on(monitor.cleanup())?;
            println!("Deleted {} archive-only items", deleted.len());
            for id in deleted {
                println!("  {}", id);
            }
        }
        HealthAction::Watch { interval } => {
            println!("Checking every {}s, press Ctrl+C to stop", interval);
            let shutdown = runner.ctrl_c_token();
            let monitor = build_health_monitor(config, remote.clone());
            let daemon = HealthDaemon::new(monitor, Duration::from_secs(interval.max(1)));
            runner.block_on(daemon.run(shutdown))?;
        }
    }
    Ok(())
}
