//! Organized library of symlinks into the mount.
//!
//! The resolver scans the mount for video files, classifies each as a
//! movie or an episode, and keeps `<movies>/<Title> (<year>)/` and
//! `<tv>/<Show>/Season NN/` trees of symlinks in step with it.

mod classify;
mod daemon;
mod error;
mod library;
mod naming;
mod scanner;

pub use classify::{classify, clean_title, Classification, MediaKind};
pub use daemon::ResolverDaemon;
pub use error::ResolveError;
pub use library::{EntryState, ResolveReport, Resolver};
pub use naming::LibraryRoots;
pub use scanner::{DriverScanner, MountScanner, SourceFile, SourceScanner};
