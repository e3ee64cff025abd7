//! Quire Core Library
//!
//! Core types, configuration, HTML helpers and error handling for the Quire
//! static content generator.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;
pub mod html;
pub mod sort;

pub use config::{CollectionConfig, CollectionFilter, Config};
pub use content::{Metadata, Page, SourceDocument};
pub use error::{CoreError, Result};
pub use sort::{SortDirection, SortField};
