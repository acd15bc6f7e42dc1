//! Canonical locations in the organized library.

use std::path::{Path, PathBuf};

use super::classify::Classification;

/// Roots of the organized trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRoots {
    pub movies: PathBuf,
    pub tv: PathBuf,
}

impl LibraryRoots {
    pub fn new(movies: impl Into<PathBuf>, tv: impl Into<PathBuf>) -> Self {
        Self {
            movies: movies.into(),
            tv: tv.into(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [self.movies.as_path(), self.tv.as_path()].into_iter()
    }

    /// Canonical symlink path for a classified file.
    ///
    /// Movies land in `<movies>/<Title> (<year>)/<file>`, episodes in
    /// `<tv>/<Show>/Season <NN>/<file>`. The result depends only on the
    /// arguments.
    pub fn canonical_path(&self, class: &Classification, file_name: &str) -> PathBuf {
        match class {
            Classification::Movie { title, year } => self
                .movies
                .join(format!("{} ({})", title, year))
                .join(file_name),
            Classification::Episode { show, season, .. } => self
                .tv
                .join(show)
                .join(format!("Season {:02}", season))
                .join(file_name),
        }
    }
}
