//! Mount and unmount commands.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use rdmount::fuse::fuse3::fusermount_unmount;
use rdmount::service::MountService;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Run the mount command.
///
/// With `daemon` set the binary re-launches itself in the foreground mode,
/// detached from this terminal, and returns once the child is started.
pub fn run(options: &GlobalOptions, path: Option<PathBuf>, daemon: bool) -> Result<(), CliError> {
    if daemon {
        return spawn_detached(options, path.as_deref());
    }

    let runner = CliRunner::new(options, true)?;
    runner.log_startup("mount");

    let mut service = MountService::new(runner.config().clone());
    if let Some(path) = path {
        service = service.with_mountpoint(path);
    }
    let mountpoint = service.mountpoint().to_path_buf();

    println!("rdmount v{}", rdmount::VERSION);
    println!("Mountpoint: {}", mountpoint.display());
    println!("Press Ctrl+C to unmount and exit");
    println!();

    runner.block_on(service.run())?;

    println!();
    println!("Filesystem unmounted.");
    Ok(())
}

fn spawn_detached(options: &GlobalOptions, path: Option<&Path>) -> Result<(), CliError> {
    let exe = std::env::current_exe().map_err(CliError::Spawn)?;
    let mut command = Command::new(exe);
    if let Some(config) = &options.config {
        command.arg("--config").arg(config);
    }
    if options.debug {
        command.arg("--debug");
    }
    command.arg("mount");
    if let Some(path) = path {
        command.arg(path);
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // Own process group so terminal signals do not reach the mount
        .process_group(0)
        .spawn()
        .map_err(CliError::Spawn)?;

    println!("rdmount started in the background (pid {})", child.id());
    Ok(())
}

/// Run the unmount command.
pub fn unmount(path: &Path) -> Result<(), CliError> {
    if fusermount_unmount(path) {
        println!("Unmounted {}", path.display());
        Ok(())
    } else {
        Err(CliError::Unmount(path.display().to_string()))
    }
}
