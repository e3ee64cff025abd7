//! Source tree loading.
//!
//! Walks the source directory and turns every file into a
//! [`SourceDocument`].
//!
//! Every non-hidden file is read as UTF-8 text. Binary assets such as images
//! do not belong in the source directory: one that is found fails the run
//! with [`CoreError::SourceRead`] naming the file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use quire_core::{CoreError, SourceDocument, content::path_to_slash};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::Result;

/// Loader for one source directory.
///
/// Holds no state between calls; every [`SourceLoader::documents`] call
/// re-reads the tree.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    source_dir: PathBuf,
}

impl SourceLoader {
    /// Create a loader rooted at `source_dir`.
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// The root directory.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Relative paths of every file, sorted by their `/`-separated form.
    ///
    /// Hidden files and directories are skipped. A missing source directory
    /// yields no files.
    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        if !self.source_dir.is_dir() {
            warn!(dir = %self.source_dir.display(), "source directory not found");
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.source_dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.source_dir).to_path_buf();
                CoreError::source_read(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.source_dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            paths.push(relative);
        }

        paths.sort_by_cached_key(|p| path_to_slash(p));
        Ok(paths)
    }

    /// Lazily read and parse every file in source order.
    pub fn documents(&self) -> Result<impl Iterator<Item = Result<SourceDocument>> + '_> {
        let paths = self.paths()?;
        Ok(paths.into_iter().map(|relative| self.load(&relative)))
    }

    /// Read every document; the first unreadable file aborts.
    pub fn load_all(&self) -> Result<Vec<SourceDocument>> {
        let documents = self.documents()?.collect::<Result<Vec<_>>>()?;
        info!(
            dir = %self.source_dir.display(),
            count = documents.len(),
            "loaded source documents"
        );
        Ok(documents)
    }

    /// Read and parse one file given its path relative to the source root.
    ///
    /// A file that is not valid UTF-8 is a [`CoreError::SourceRead`].
    pub fn load(&self, relative: &Path) -> Result<SourceDocument> {
        let full = self.source_dir.join(relative);
        debug!(path = %full.display(), "reading source");

        let content =
            fs::read_to_string(&full).map_err(|e| CoreError::source_read(&full, e))?;
        Ok(SourceDocument::parse(relative, &content)?)
    }
}

/// Load all documents under `source_dir`.
pub fn load_all(source_dir: &Path) -> Result<Vec<SourceDocument>> {
    SourceLoader::new(source_dir).load_all()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
