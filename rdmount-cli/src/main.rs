//! rdmount CLI - Command-line interface
//!
//! Mounts a debrid account as a read-only filesystem and manages the
//! organized library and item health around it.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::health::HealthAction;
use commands::resolver::ResolverAction;
use error::CliError;
use runner::GlobalOptions;

#[derive(Parser)]
#[command(name = "rdmount")]
#[command(version, about = "Debrid storage as a local read-only filesystem", long_about = None)]
struct Cli {
    /// Path to config.ini (default: ~/.config/rdmount/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the remote library (default mountpoint from config)
    Mount {
        /// Where to mount
        path: Option<PathBuf>,

        /// Detach and keep running in the background
        #[arg(long)]
        daemon: bool,
    },
    /// Unmount a mounted library
    Unmount {
        /// Mountpoint to release
        path: PathBuf,
    },
    /// Show account details and recent items
    Info,
    /// Maintain the organized movie/TV library
    Resolver {
        #[command(subcommand)]
        action: ResolverAction,
    },
    /// Check and repair remote items
    Health {
        #[command(subcommand)]
        action: HealthAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        debug: cli.debug,
    };

    let result: Result<(), CliError> = match cli.command {
        Commands::Mount { path, daemon } => commands::mount::run(&options, path, daemon),
        Commands::Unmount { path } => commands::mount::unmount(&path),
        Commands::Info => commands::info::run(&options),
        Commands::Resolver { action } => commands::resolver::run(&options, action),
        Commands::Health { action } => commands::health::run(&options, action),
    };

    if let Err(e) = result {
        e.exit();
    }
}
