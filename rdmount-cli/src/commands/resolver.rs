//! Resolver commands - organize the mounted library.

use std::time::Duration;

use clap::Subcommand;
use rdmount::resolver::{MountScanner, ResolverDaemon};
use rdmount::service::build_resolver;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Resolver action subcommands.
#[derive(Debug, Subcommand)]
pub enum ResolverAction {
    /// Reconcile the organized library once and exit
    RunOnce,
    /// Reconcile every INTERVAL seconds until interrupted
    Watch {
        /// Seconds between cycles
        interval: u64,
    },
}

/// Run a resolver subcommand.
pub fn run(options: &GlobalOptions, action: ResolverAction) -> Result<(), CliError> {
    let runner = CliRunner::new(options, false)?;
    runner.log_startup("resolver");
    let config = runner.config();
    let scanner = MountScanner::new(&config.mount.mountpoint);
    let mut resolver = build_resolver(config, scanner);

    match action {
        ResolverAction::RunOnce => {
            let report = runner.block_on(resolver.run_once())?;
            println!(
                "Scanned {} files: {} linked, {} relinked, {} removed, {} unchanged",
                report.scanned, report.linked, report.relinked, report.removed, report.unchanged
            );
            if report.unclassified + report.conflicts + report.failures > 0 {
                println!(
                    "Skipped: {} unclassified, {} conflicts, {} failures",
                    report.unclassified, report.conflicts, report.failures
                );
            }
            Ok(())
        }
        ResolverAction::Watch { interval } => {
            println!(
                "Organizing {} every {}s, press Ctrl+C to stop",
                config.mount.mountpoint.display(),
                interval
            );
            let shutdown = runner.ctrl_c_token();
            let daemon = ResolverDaemon::new(resolver, Duration::from_secs(interval.max(1)));
            runner.block_on(daemon.run(shutdown))?;
            Ok(())
        }
    }
}
