//! Frontmatter parsing for source files.
//!
//! A source file may open with a metadata block fenced by `---` (YAML) or
//! `+++` (TOML) lines:
//!
//! ```text
//! ---
//! title: Hello
//! layout: post
//! ---
//!
//! # Body starts here
//! ```
//!
//! Whatever the format, the result is a string-keyed [`Metadata`] mapping.
//! A file without a leading block yields an empty mapping and its whole
//! content becomes the body.

use std::path::Path;

use serde_json::Value;

use crate::{
    content::Metadata,
    error::{CoreError, Result},
};

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split content into frontmatter and body.
///
/// The opening fence must be the very first line of the file and the closing
/// fence must sit on a line of its own. Returns `None` when either is missing.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let (first_line, rest) = match content.split_once('\n') {
        Some((line, rest)) => (line.trim_end_matches('\r'), rest),
        None => (content.trim_end_matches('\r'), ""),
    };

    let format = match first_line.trim_end() {
        "---" => FrontmatterFormat::Yaml,
        "+++" => FrontmatterFormat::Toml,
        _ => return None,
    };
    let delimiter = format.delimiter();

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == delimiter {
            let frontmatter = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return Some((format, frontmatter, body));
        }
        offset += line.len();
    }

    None
}

/// Parse frontmatter from a string.
///
/// Returns the metadata mapping and the body that follows the block.
pub fn parse_frontmatter<'a>(content: &'a str, path: &Path) -> Result<(Metadata, &'a str)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Metadata::new(), content));
    };

    if fm_str.trim().is_empty() {
        return Ok((Metadata::new(), body));
    }

    let value = match format {
        FrontmatterFormat::Yaml => serde_yaml::from_str::<Value>(fm_str)
            .map_err(|e| CoreError::frontmatter(path, e.to_string()))?,
        FrontmatterFormat::Toml => {
            let table: toml::Table = toml::from_str(fm_str)
                .map_err(|e| CoreError::frontmatter(path, e.to_string()))?;
            toml_to_json(toml::Value::Table(table))
        }
    };

    let metadata = match value {
        Value::Object(map) => map,
        Value::Null => Metadata::new(),
        other => {
            return Err(CoreError::frontmatter(
                path,
                format!("expected a mapping, found {}", value_kind(&other)),
            ));
        }
    };

    Ok((metadata, body))
}

/// Convert a TOML value into the JSON value model used for metadata.
///
/// TOML datetimes become their RFC 3339 string form.
pub fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
