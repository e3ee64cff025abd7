//! Writing pages to disk.

use std::fs;

use quire_core::Page;
use tracing::{debug, info};

use crate::{GenerateError, Result};

/// Write every page to its output path, creating parent directories and
/// overwriting existing files.
///
/// Stops at the first failed write.
pub fn save_all(pages: &[Page]) -> Result<usize> {
    for page in pages {
        save(page)?;
    }
    info!(count = pages.len(), "saved pages");
    Ok(pages.len())
}

/// Write a single page.
pub fn save(page: &Page) -> Result<()> {
    let path = &page.output_path;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| GenerateError::output_write(parent, e))?;
    }
    fs::write(path, &page.content).map_err(|e| GenerateError::output_write(path, e))?;
    debug!(path = %path.display(), "wrote page");
    Ok(())
}

#[cfg(test)]
mod tests {
    use quire_core::Metadata;
    use tempfile::TempDir;

    use super::*;

    fn page(root: &std::path::Path, rel: &str, content: &str) -> Page {
        Page::new(root, rel, content, Metadata::new(), None)
    }

    #[test]
    fn test_creates_directories_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("public");
        fs::create_dir_all(out.join("posts")).unwrap();
        fs::write(out.join("posts/a.html"), "old").unwrap();

        let pages = vec![
            page(&out, "posts/a.html", "new"),
            page(&out, "deep/er/index.html", "<p>x</p>"),
        ];
        assert_eq!(save_all(&pages).unwrap(), 2);

        assert_eq!(fs::read_to_string(out.join("posts/a.html")).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(out.join("deep/er/index.html")).unwrap(),
            "<p>x</p>"
        );
    }

    #[test]
    fn test_idempotent() {
        let dir = TempDir::new().unwrap();
        let pages = vec![page(dir.path(), "a.html", "same")];

        save_all(&pages).unwrap();
        let first = fs::read(dir.path().join("a.html")).unwrap();
        save_all(&pages).unwrap();
        assert_eq!(fs::read(dir.path().join("a.html")).unwrap(), first);
    }

    #[test]
    fn test_write_failure_names_path() {
        let dir = TempDir::new().unwrap();
        // A file where a directory is needed.
        fs::write(dir.path().join("blocked"), "").unwrap();
        let pages = vec![page(dir.path(), "blocked/a.html", "x")];

        match save_all(&pages).unwrap_err() {
            GenerateError::OutputWrite { path, .. } => assert!(path.ends_with("blocked")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
