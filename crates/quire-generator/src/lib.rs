//! Quire Generator Library
//!
//! The content pipeline: load sources, generate pages, save them.
//!
//! # Modules
//!
//! - [`loader`] - Source tree walking and front matter splitting
//! - [`generator`] - Per-document rendering, layouts and derived metadata
//! - [`collection`] - Filtered, sorted, paginated listing pages
//! - [`saver`] - Writing pages to the output tree
//! - [`build`] - Build orchestration

pub mod build;
pub mod collection;
pub mod generator;
pub mod loader;
pub mod saver;

use std::path::PathBuf;

use quire_core::CoreError;
use quire_render::RenderError;
use thiserror::Error;

pub use build::{BuildStats, Builder};
pub use generator::{GenerateOutput, PageGenerator};
pub use loader::SourceLoader;
pub use saver::save_all;

/// Generation errors.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Source reading, front matter or config error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Rendering a document failed.
    #[error("failed to render {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    /// Two pages map to the same output path.
    #[error("duplicate output path {path}: produced by {first} and {second}")]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    /// An extension mapped to a renderer that is not registered.
    #[error("extension `{extension}` maps to unknown renderer `{name}`")]
    UnknownRenderer { extension: String, name: String },

    /// Writing an output file failed.
    #[error("failed to write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    /// Wrap a render error with the document it came from.
    pub fn render(path: impl Into<PathBuf>, source: RenderError) -> Self {
        Self::Render {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error with the output path being written.
    pub fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenerateError>;
