//! Reconciliation of the mount into the organized symlink library.
//!
//! Each cycle scans the mount, classifies every video file and makes the
//! organized tree match:
//!
//! ```text
//! Unseen ──► Classified(kind) ──► Linked ◄──┐
//!                                   │       │ target changed
//!                                   ├──► Relinked
//!                                   └──► Removed (source vanished)
//! ```
//!
//! Symlinks pointing into the mount root that no cycle wants any more are
//! swept, including ones left behind by a previous process. Real files are
//! never touched.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use super::classify::{classify, MediaKind};
use super::error::ResolveError;
use super::naming::LibraryRoots;
use super::scanner::{SourceFile, SourceScanner};
use crate::notify::{ChangeEvent, ChangeNotifier};

/// A symlink the resolver maintains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizedEntry {
    pub canonical: PathBuf,
    pub target: PathBuf,
    pub kind: MediaKind,
    pub item: String,
}

/// Where a source file is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unseen,
    Classified(MediaKind),
    Linked,
    Relinked,
    Removed,
    Unclassified,
}

/// Counters for one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub scanned: usize,
    pub linked: usize,
    pub relinked: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub unclassified: usize,
    pub conflicts: usize,
    pub failures: usize,
    pub movies: usize,
    pub episodes: usize,
}

impl ResolveReport {
    /// Whether the organized tree was modified.
    pub fn changed(&self) -> bool {
        self.linked + self.relinked + self.removed > 0
    }
}

enum LinkOutcome {
    Created,
    Replaced,
    Unchanged,
    Conflict,
}

/// Owns the organized library.
pub struct Resolver<S> {
    scanner: S,
    roots: LibraryRoots,
    notifier: Arc<dyn ChangeNotifier>,
    entries: HashMap<PathBuf, OrganizedEntry>,
    states: HashMap<PathBuf, EntryState>,
    unclassified_logged: HashSet<PathBuf>,
}

impl<S: SourceScanner> Resolver<S> {
    pub fn new(scanner: S, roots: LibraryRoots, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self {
            scanner,
            roots,
            notifier,
            entries: HashMap::new(),
            states: HashMap::new(),
            unclassified_logged: HashSet::new(),
        }
    }

    pub fn roots(&self) -> &LibraryRoots {
        &self.roots
    }

    /// State of a source file, by its path under the mount.
    pub fn state(&self, source: &Path) -> EntryState {
        self.states
            .get(source)
            .copied()
            .unwrap_or(EntryState::Unseen)
    }

    /// Run one reconciliation cycle.
    pub async fn run_once(&mut self) -> Result<ResolveReport, ResolveError> {
        let mut sources = self.scanner.scan().await?;
        sources.sort_by(|a, b| a.path.cmp(&b.path));
        self.states.retain(|_, state| *state != EntryState::Removed);

        let mut report = ResolveReport {
            scanned: sources.len(),
            ..Default::default()
        };

        let desired = self.plan(&sources, &mut report);

        for entry in desired.values() {
            match reconcile(entry).await {
                Ok(LinkOutcome::Created) => {
                    info!(link = %entry.canonical.display(), kind = %entry.kind, "Linked");
                    report.linked += 1;
                    self.states.insert(entry.target.clone(), EntryState::Linked);
                }
                Ok(LinkOutcome::Replaced) => {
                    info!(link = %entry.canonical.display(), "Relinked to new source path");
                    report.relinked += 1;
                    self.states.insert(entry.target.clone(), EntryState::Relinked);
                }
                Ok(LinkOutcome::Unchanged) => {
                    report.unchanged += 1;
                    self.states.insert(entry.target.clone(), EntryState::Linked);
                }
                Ok(LinkOutcome::Conflict) => {
                    warn!(
                        path = %entry.canonical.display(),
                        "A real file occupies the canonical path, leaving it alone"
                    );
                    report.conflicts += 1;
                }
                Err(e) => {
                    warn!(link = %entry.canonical.display(), error = %e, "Failed to link");
                    report.failures += 1;
                }
            }
        }

        let mut removed_paths = Vec::new();

        let previous = std::mem::take(&mut self.entries);
        for (canonical, entry) in previous {
            if desired.contains_key(&canonical) {
                continue;
            }
            match remove_symlink(&canonical).await {
                Ok(true) => {
                    info!(link = %canonical.display(), "Removed entry for vanished source");
                    report.removed += 1;
                    removed_paths.push(canonical);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(link = %canonical.display(), error = %e, "Failed to remove entry");
                    report.failures += 1;
                }
            }
            self.states.insert(entry.target, EntryState::Removed);
        }

        for stale in self.sweep(&desired, &mut report).await {
            removed_paths.push(stale);
        }
        self.prune(&removed_paths).await;

        self.entries = desired;

        if report.changed() {
            info!(
                linked = report.linked,
                relinked = report.relinked,
                removed = report.removed,
                "Library updated"
            );
            self.notifier.notify(&ChangeEvent::LibraryUpdated {
                linked: report.linked,
                relinked: report.relinked,
                removed: report.removed,
            });
        } else {
            debug!(unchanged = report.unchanged, "Library unchanged");
        }

        Ok(report)
    }

    /// Classify sources into the desired set of entries, keyed by
    /// canonical path.
    fn plan(
        &mut self,
        sources: &[SourceFile],
        report: &mut ResolveReport,
    ) -> HashMap<PathBuf, OrganizedEntry> {
        let mut desired = HashMap::new();

        for source in sources {
            let Some(class) = classify(&source.file_name).or_else(|| classify(&source.item_dir))
            else {
                report.unclassified += 1;
                if self.unclassified_logged.insert(source.path.clone()) {
                    info!(path = %source.path.display(), "Could not classify, skipping");
                }
                self.states
                    .insert(source.path.clone(), EntryState::Unclassified);
                continue;
            };

            let canonical = self.roots.canonical_path(&class, &source.file_name);
            if desired.contains_key(&canonical) {
                warn!(
                    path = %source.path.display(),
                    link = %canonical.display(),
                    "Another source already claims this canonical path"
                );
                report.conflicts += 1;
                continue;
            }

            let kind = class.kind();
            match kind {
                MediaKind::Movie => report.movies += 1,
                MediaKind::Episode => report.episodes += 1,
            }
            self.states
                .entry(source.path.clone())
                .or_insert(EntryState::Classified(kind));
            desired.insert(
                canonical.clone(),
                OrganizedEntry {
                    canonical,
                    target: source.path.clone(),
                    kind,
                    item: source.item.clone(),
                },
            );
        }

        desired
    }

    /// Remove symlinks into the mount that no entry wants.
    async fn sweep(
        &self,
        desired: &HashMap<PathBuf, OrganizedEntry>,
        report: &mut ResolveReport,
    ) -> Vec<PathBuf> {
        let mount_root = self.scanner.mount_root();
        let mut removed = Vec::new();

        for root in self.roots.iter() {
            let mut stack = vec![root.to_path_buf()];
            while let Some(dir) = stack.pop() {
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Cannot sweep directory");
                        continue;
                    }
                };
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    let Ok(file_type) = entry.file_type().await else {
                        continue;
                    };
                    if file_type.is_dir() {
                        stack.push(path);
                        continue;
                    }
                    if !file_type.is_symlink() || desired.contains_key(&path) {
                        continue;
                    }
                    let Ok(target) = fs::read_link(&path).await else {
                        continue;
                    };
                    if !target.starts_with(mount_root) {
                        continue;
                    }
                    match fs::remove_file(&path).await {
                        Ok(()) => {
                            info!(link = %path.display(), "Removed stale entry");
                            report.removed += 1;
                            removed.push(path);
                        }
                        Err(e) => {
                            warn!(link = %path.display(), error = %e, "Failed to remove stale entry");
                            report.failures += 1;
                        }
                    }
                }
            }
        }

        removed
    }

    /// Remove directories emptied by removals, up to the library roots.
    async fn prune(&self, removed: &[PathBuf]) {
        for path in removed {
            let mut dir = path.parent();
            while let Some(current) = dir {
                let inside_root = self
                    .roots
                    .iter()
                    .any(|root| current.starts_with(root) && current != root);
                if !inside_root || fs::remove_dir(current).await.is_err() {
                    break;
                }
                debug!(dir = %current.display(), "Pruned empty directory");
                dir = current.parent();
            }
        }
    }
}

async fn reconcile(entry: &OrganizedEntry) -> io::Result<LinkOutcome> {
    match fs::symlink_metadata(&entry.canonical).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(&entry.canonical).await? == entry.target {
                return Ok(LinkOutcome::Unchanged);
            }
            fs::remove_file(&entry.canonical).await?;
            fs::symlink(&entry.target, &entry.canonical).await?;
            Ok(LinkOutcome::Replaced)
        }
        Ok(_) => Ok(LinkOutcome::Conflict),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = entry.canonical.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::symlink(&entry.target, &entry.canonical).await?;
            Ok(LinkOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

/// Remove `path` if it is a symlink. Returns whether something was removed.
async fn remove_symlink(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(path).await?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::RecordingNotifier;
    use crate::resolver::MountScanner;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        mount: PathBuf,
        roots: LibraryRoots,
        notifier: Arc<RecordingNotifier>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mount = dir.path().join("mount");
            std::fs::create_dir_all(&mount).unwrap();
            let roots = LibraryRoots::new(dir.path().join("movies"), dir.path().join("tv"));
            Self {
                mount,
                roots,
                notifier: Arc::new(RecordingNotifier::default()),
                _dir: dir,
            }
        }

        fn add(&self, item_dir: &str, file: &str) -> PathBuf {
            let dir = self.mount.join(item_dir);
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(file);
            std::fs::write(&path, b"video").unwrap();
            path
        }

        fn resolver(&self) -> Resolver<MountScanner> {
            Resolver::new(
                MountScanner::new(&self.mount).with_require_mounted(false),
                self.roots.clone(),
                self.notifier.clone(),
            )
        }

        fn events(&self) -> usize {
            self.notifier.events.lock().len()
        }
    }

    #[tokio::test]
    async fn test_links_movie_and_episode() {
        let fx = Fixture::new();
        let movie = fx.add("Movie.Title.2021", "Movie.Title.2021.mkv");
        let episode = fx.add("ShowName.S01", "ShowName.S01E02.mkv");
        let mut resolver = fx.resolver();

        let report = resolver.run_once().await.unwrap();

        assert_eq!(report.linked, 2);
        assert_eq!(report.movies, 1);
        assert_eq!(report.episodes, 1);
        let movie_link = fx
            .roots
            .movies
            .join("Movie Title (2021)/Movie.Title.2021.mkv");
        assert_eq!(std::fs::read_link(&movie_link).unwrap(), movie);
        let episode_link = fx.roots.tv.join("ShowName/Season 01/ShowName.S01E02.mkv");
        assert_eq!(std::fs::read_link(&episode_link).unwrap(), episode);
        assert_eq!(resolver.state(&movie), EntryState::Linked);
        assert_eq!(fx.events(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let fx = Fixture::new();
        fx.add("Movie.Title.2021", "Movie.Title.2021.mkv");
        let mut resolver = fx.resolver();
        resolver.run_once().await.unwrap();

        let report = resolver.run_once().await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert!(!report.changed());
        assert_eq!(fx.events(), 1, "no notification without changes");
    }

    #[tokio::test]
    async fn test_vanished_source_is_removed_and_pruned() {
        let fx = Fixture::new();
        let movie = fx.add("Movie.Title.2021", "Movie.Title.2021.mkv");
        let mut resolver = fx.resolver();
        resolver.run_once().await.unwrap();

        std::fs::remove_dir_all(fx.mount.join("Movie.Title.2021")).unwrap();
        let report = resolver.run_once().await.unwrap();

        assert_eq!(report.removed, 1);
        assert!(!fx.roots.movies.join("Movie Title (2021)").exists());
        assert!(fx.roots.movies.exists());
        assert_eq!(resolver.state(&movie), EntryState::Removed);
        assert_eq!(fx.events(), 2);
    }

    #[tokio::test]
    async fn test_changed_source_path_is_relinked() {
        let fx = Fixture::new();
        let source = fx.add("Movie.Title.2021", "Movie.Title.2021.mkv");
        let link = fx
            .roots
            .movies
            .join("Movie Title (2021)/Movie.Title.2021.mkv");
        std::fs::create_dir_all(link.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(fx.mount.join("old/Movie.Title.2021.mkv"), &link).unwrap();

        let mut resolver = fx.resolver();
        let report = resolver.run_once().await.unwrap();

        assert_eq!(report.relinked, 1);
        assert_eq!(std::fs::read_link(&link).unwrap(), source);
        assert_eq!(resolver.state(&source), EntryState::Relinked);
    }

    #[tokio::test]
    async fn test_real_file_is_never_overwritten() {
        let fx = Fixture::new();
        fx.add("Movie.Title.2021", "Movie.Title.2021.mkv");
        let canonical = fx
            .roots
            .movies
            .join("Movie Title (2021)/Movie.Title.2021.mkv");
        std::fs::create_dir_all(canonical.parent().unwrap()).unwrap();
        std::fs::write(&canonical, b"mine").unwrap();

        let report = fx.resolver().run_once().await.unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.linked, 0);
        assert_eq!(std::fs::read(&canonical).unwrap(), b"mine");
    }

    #[tokio::test]
    async fn test_unclassified_is_skipped() {
        let fx = Fixture::new();
        let source = fx.add("random", "random_video.mkv");
        let mut resolver = fx.resolver();

        let report = resolver.run_once().await.unwrap();

        assert_eq!(report.unclassified, 1);
        assert_eq!(report.linked, 0);
        assert_eq!(resolver.state(&source), EntryState::Unclassified);
        assert_eq!(fx.events(), 0);
    }

    #[tokio::test]
    async fn test_item_directory_name_is_fallback() {
        let fx = Fixture::new();
        fx.add("Some.Film.2019.1080p", "sf.mkv");

        let report = fx.resolver().run_once().await.unwrap();

        assert_eq!(report.linked, 1);
        assert!(fx
            .roots
            .movies
            .join("Some Film (2019)/sf.mkv")
            .symlink_metadata()
            .is_ok());
    }

    #[tokio::test]
    async fn test_stale_links_from_previous_process_are_swept() {
        let fx = Fixture::new();
        let stale = fx.roots.movies.join("Gone (2001)/Gone.2001.mkv");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(fx.mount.join("Gone.2001/Gone.2001.mkv"), &stale).unwrap();
        let foreign = fx.roots.movies.join("Mine (1999)/mine.mkv");
        std::fs::create_dir_all(foreign.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink("/elsewhere/mine.mkv", &foreign).unwrap();

        let report = fx.resolver().run_once().await.unwrap();

        assert_eq!(report.removed, 1);
        assert!(stale.symlink_metadata().is_err());
        assert!(!fx.roots.movies.join("Gone (2001)").exists());
        // Links that do not point into the mount are not ours
        assert!(foreign.symlink_metadata().is_ok());
    }

    #[tokio::test]
    async fn test_failed_scan_changes_nothing() {
        let fx = Fixture::new();
        fx.add("Movie.Title.2021", "Movie.Title.2021.mkv");
        let mut resolver = fx.resolver();
        resolver.run_once().await.unwrap();

        std::fs::remove_dir_all(&fx.mount).unwrap();
        assert!(resolver.run_once().await.is_err());

        assert!(fx
            .roots
            .movies
            .join("Movie Title (2021)/Movie.Title.2021.mkv")
            .symlink_metadata()
            .is_ok());
    }
}
