//! Named renderer capabilities.

use std::{collections::BTreeMap, fmt, sync::Arc};

use quire_core::{Config, Metadata, config::PASSTHROUGH_RENDERER};

use crate::{
    RenderError, Result, format::FormatterCache, markdown::MarkdownRenderer,
    template::TemplateRenderer,
};

/// A pure `(body, context) -> html` transformation.
///
/// Implementations must not perform I/O or keep mutable state between calls,
/// so the registry can be shared across worker threads.
pub trait Renderer: Send + Sync + fmt::Debug {
    /// Render `body` against `context`.
    fn render(&self, body: &str, context: &Metadata) -> Result<String>;
}

/// Registry of renderers by capability name.
#[derive(Debug, Clone, Default)]
pub struct RendererRegistry {
    renderers: BTreeMap<String, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `markdown` and `template` renderers.
    #[must_use]
    pub fn with_defaults(formatters: Arc<FormatterCache>, default_locale: &str) -> Self {
        let mut registry = Self::new();
        registry.register("markdown", Arc::new(MarkdownRenderer::new()));
        registry.register(
            "template",
            Arc::new(TemplateRenderer::new(formatters, default_locale)),
        );
        registry
    }

    /// Register (or replace) a renderer under `name`.
    pub fn register(&mut self, name: impl Into<String>, renderer: Arc<dyn Renderer>) {
        self.renderers.insert(name.into(), renderer);
    }

    /// Look up a renderer by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Renderer>> {
        self.renderers
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::UnknownRenderer(name.to_string()))
    }

    /// Check whether a renderer is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.renderers.contains_key(name)
    }

    /// Registered renderer names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(String::as_str)
    }

    /// Renderer for a file extension per `config.renderers`.
    ///
    /// `Ok(None)` means pass-through: the extension is unmapped or mapped to
    /// `passthrough`.
    pub fn for_extension(
        &self,
        config: &Config,
        extension: &str,
    ) -> Result<Option<Arc<dyn Renderer>>> {
        match config.renderer_for(extension) {
            None | Some(PASSTHROUGH_RENDERER) => Ok(None),
            Some(name) => self.resolve(name).map(Some),
        }
    }
}
