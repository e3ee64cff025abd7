//! Layout chaining.
//!
//! A layout is a file `<layouts_dir>/<name>.<ext>` with optional front matter.
//! Rendering a page through its layout chain is a small state machine: the
//! state is the current content plus the next layout name, each transition
//! renders one layout with `content` bound to the current text, and the
//! chain ends when a layout names no further layout. Visited names are
//! tracked per page so a chain that comes back to a layout fails instead of
//! looping.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use quire_core::{
    Config, CoreError, Metadata,
    content::extension_of,
    frontmatter::parse_frontmatter,
};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{RenderError, Result, registry::RendererRegistry};

/// Key naming the next layout in a context or layout front matter.
pub const LAYOUT_KEY: &str = "layout";

/// Key the wrapped content is bound to when a layout renders.
pub const CONTENT_KEY: &str = "content";

/// A loaded layout file.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Layout name (file stem).
    pub name: String,

    /// File extension, used to pick the renderer.
    pub extension: String,

    /// Layout front matter.
    pub front_matter: Metadata,

    /// Layout body.
    pub body: String,
}

impl Layout {
    /// Parse a layout from its source text.
    pub fn parse(name: impl Into<String>, path: &Path, content: &str) -> Result<Self> {
        let (front_matter, body) =
            parse_frontmatter(content, path).map_err(|source| RenderError::LayoutLoad {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            name: name.into(),
            extension: extension_of(path),
            front_matter,
            body: body.to_string(),
        })
    }

    /// The layout this one is wrapped in, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        layout_name(&self.front_matter)
    }
}

/// Layouts indexed by name.
#[derive(Debug, Clone, Default)]
pub struct LayoutSet {
    layouts: BTreeMap<String, Layout>,
}

impl LayoutSet {
    /// Create an empty layout set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file directly inside `dir`.
    ///
    /// A missing directory yields an empty set. When two files share a stem
    /// the lexicographically first path wins.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut set = Self::new();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "layouts directory not found");
            return Ok(set);
        }

        let read_err = |path: &Path, source: std::io::Error| RenderError::LayoutLoad {
            path: path.to_path_buf(),
            source: CoreError::source_read(path, source),
        };

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| read_err(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && !is_hidden(p))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if set.contains(&name) {
                debug!(path = %path.display(), "skipping layout with duplicate name");
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| read_err(&path, e))?;
            set.insert(Layout::parse(name, &path, &content)?);
        }

        debug!(dir = %dir.display(), count = set.len(), "loaded layouts");
        Ok(set)
    }

    /// Add or replace a layout.
    pub fn insert(&mut self, layout: Layout) {
        self.layouts.insert(layout.name.clone(), layout);
    }

    /// Get a layout by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.layouts.get(name)
    }

    /// Check whether a layout exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    /// Layout names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layouts.keys().map(String::as_str)
    }

    /// Number of layouts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Follow the chain starting at `name` without rendering.
    ///
    /// Returns the visited names in order, or the error rendering would hit.
    pub fn chain(&self, name: &str) -> Result<Vec<String>> {
        let mut visited: Vec<String> = Vec::new();
        let mut next = Some(name.to_string());

        while let Some(name) = next {
            check_cycle(&visited, &name)?;
            let layout = self
                .get(&name)
                .ok_or_else(|| RenderError::LayoutNotFound(name.clone()))?;
            next = layout.parent().map(str::to_string);
            visited.push(name);
        }
        Ok(visited)
    }
}

/// Wrap `content` in the layout chain named by `context`.
///
/// Each layout renders with the page context over the layout's own front
/// matter (page keys win) and `content` bound to the text so far. Content is
/// returned unchanged when `context` names no layout.
pub fn apply_layouts(
    content: String,
    context: &Metadata,
    layouts: &LayoutSet,
    registry: &RendererRegistry,
    config: &Config,
) -> Result<String> {
    let mut content = content;
    let mut visited: Vec<String> = Vec::new();
    let mut next = layout_name(context).map(str::to_string);

    while let Some(name) = next {
        check_cycle(&visited, &name)?;
        let layout = layouts
            .get(&name)
            .ok_or_else(|| RenderError::LayoutNotFound(name.clone()))?;
        trace!(layout = %name, "applying layout");

        let mut ctx = layout.front_matter.clone();
        ctx.remove(LAYOUT_KEY);
        for (key, value) in context {
            if key != LAYOUT_KEY {
                ctx.insert(key.clone(), value.clone());
            }
        }
        ctx.insert(CONTENT_KEY.to_string(), Value::String(content));

        content = match registry.for_extension(config, &layout.extension)? {
            Some(renderer) => renderer.render(&layout.body, &ctx)?,
            None => layout.body.clone(),
        };

        next = layout.parent().map(str::to_string);
        visited.push(name);
    }

    Ok(content)
}

fn layout_name(metadata: &Metadata) -> Option<&str> {
    metadata
        .get(LAYOUT_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn check_cycle(visited: &[String], name: &str) -> Result<()> {
    if visited.iter().any(|v| v == name) {
        let mut chain = visited.to_vec();
        chain.push(name.to_string());
        return Err(RenderError::LayoutCycle(chain.join(" -> ")));
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}
