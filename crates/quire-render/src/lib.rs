//! Quire Render Library
//!
//! Renderer capabilities (markdown, templates), the registry that names them,
//! locale formatting and layout chaining.

pub mod format;
pub mod layout;
pub mod markdown;
pub mod registry;
pub mod template;

pub use format::{FormatError, FormatterCache};
pub use layout::{Layout, LayoutSet, apply_layouts};
pub use markdown::MarkdownRenderer;
pub use registry::{Renderer, RendererRegistry};
pub use template::{Template, TemplateError, TemplateRenderer};

use std::path::PathBuf;

use thiserror::Error;

/// Render errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No renderer registered under this name.
    #[error("unknown renderer: {0}")]
    UnknownRenderer(String),

    /// Template parse or evaluation error.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Locale formatting error.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// A layout name that has no file in the layouts directory.
    #[error("layout not found: {0}")]
    LayoutNotFound(String),

    /// A layout chain that revisits a layout.
    #[error("layout cycle detected: {0}")]
    LayoutCycle(String),

    /// Layout file could not be read or parsed.
    #[error("failed to load layout {path}: {source}")]
    LayoutLoad {
        path: PathBuf,
        #[source]
        source: quire_core::CoreError,
    },

    /// A registered renderer failed.
    #[error("renderer `{name}` failed: {message}")]
    Renderer { name: String, message: String },
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;
