//! Content types and structures.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::{error::Result, frontmatter::parse_frontmatter};

/// String-keyed metadata mapping shared by front matter, render contexts and
/// page metadata.
pub type Metadata = serde_json::Map<String, Value>;

/// One input file: its metadata block and the body text before rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDocument {
    /// Path relative to the source directory.
    pub source_path: PathBuf,

    /// Filename suffix without the leading dot (case preserved).
    pub extension: String,

    /// Parsed front matter; empty when the file has no metadata block.
    pub front_matter: Metadata,

    /// Body text following the front matter.
    pub raw_body: String,
}

impl SourceDocument {
    /// Create a document from already split parts.
    pub fn new(
        source_path: impl Into<PathBuf>,
        front_matter: Metadata,
        raw_body: impl Into<String>,
    ) -> Self {
        let source_path = source_path.into();
        Self {
            extension: extension_of(&source_path),
            source_path,
            front_matter,
            raw_body: raw_body.into(),
        }
    }

    /// Split `content` into front matter and body for the file at `source_path`.
    pub fn parse(source_path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let source_path = source_path.into();
        let (front_matter, body) = parse_frontmatter(content, &source_path)?;
        Ok(Self::new(source_path, front_matter, body))
    }

    /// Look up a front matter field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.front_matter.get(key)
    }

    /// Look up a front matter field as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whether the document is marked `draft: true`.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.get("draft").and_then(Value::as_bool).unwrap_or(false)
    }

    /// File name without its extension.
    #[must_use]
    pub fn stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Relative source path with `/` separators on every platform.
    #[must_use]
    pub fn source_key(&self) -> String {
        path_to_slash(&self.source_path)
    }
}

/// One output artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Full output path (under the output directory).
    pub output_path: PathBuf,

    /// Output path relative to the output directory, `/`-separated.
    pub relative_path: String,

    /// Site-root URL path for linking.
    pub url: String,

    /// Final content after all layout wrapping.
    pub content: String,

    /// Front matter plus derived fields.
    pub metadata: Metadata,

    /// Originating source file; `None` for synthetic listing pages.
    pub source_path: Option<PathBuf>,
}

impl Page {
    /// Create a page at `relative_path` under `output_dir`.
    pub fn new(
        output_dir: &Path,
        relative_path: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
        source_path: Option<PathBuf>,
    ) -> Self {
        let relative_path = relative_path.into();
        Self {
            output_path: output_dir.join(&relative_path),
            url: url_for(&relative_path),
            relative_path,
            content: content.into(),
            metadata,
            source_path,
        }
    }

    /// Look up a metadata field as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Page title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    /// First paragraph of the rendered content.
    #[must_use]
    pub fn excerpt(&self) -> Option<&str> {
        self.get_str("excerpt")
    }

    /// First image source in the rendered content.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.get_str("image")
    }

    /// Whether this page was produced by collection expansion.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.source_path.is_none()
    }
}

/// Derive the extension used for renderer lookup.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Render a relative path with `/` separators.
#[must_use]
pub fn path_to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Site-root URL path for an output path relative to the output directory.
///
/// `index.html` collapses to its directory: `posts/index.html` → `/posts/`.
#[must_use]
pub fn url_for(relative_path: &str) -> String {
    let trimmed = relative_path.trim_start_matches('/');
    match trimmed.strip_suffix("index.html") {
        Some(dir) if dir.is_empty() || dir.ends_with('/') => format!("/{dir}"),
        _ => format!("/{trimmed}"),
    }
}

/// Convert text to a URL-safe slug.
#[must_use]
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
