//! Page generation.
//!
//! Turns source documents into pages: render the body, derive metadata,
//! wrap the result in its layout chain, then expand collections into
//! listing pages once every document page exists.

use std::{
    collections::{HashMap, hash_map::Entry},
    path::{Path, PathBuf},
};

use quire_core::{
    Config, Metadata, Page, SourceDocument,
    config::PASSTHROUGH_RENDERER,
    content::{path_to_slash, url_for},
    html,
};
use quire_render::{LayoutSet, RendererRegistry, apply_layouts};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::{GenerateError, Result, collection};

/// Words per minute used for `reading_time`.
const WORDS_PER_MINUTE: usize = 200;

/// Result of a generation run.
#[derive(Debug, Default)]
pub struct GenerateOutput {
    /// Document pages in source order, followed by listing pages.
    pub pages: Vec<Page>,

    /// How many of `pages` are collection listings.
    pub listing_pages: usize,

    /// Drafts left out of the run.
    pub drafts_skipped: usize,

    /// Documents or listings that failed to render and were skipped.
    pub failures: Vec<GenerateError>,
}

impl GenerateOutput {
    /// Whether every document and listing rendered.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of pages produced from source documents.
    #[must_use]
    pub fn document_pages(&self) -> usize {
        self.pages.len() - self.listing_pages
    }
}

/// Renders documents and collections against a config, a renderer registry
/// and a set of layouts.
#[derive(Debug, Clone, Copy)]
pub struct PageGenerator<'a> {
    config: &'a Config,
    registry: &'a RendererRegistry,
    layouts: &'a LayoutSet,
}

impl<'a> PageGenerator<'a> {
    /// Create a generator.
    #[must_use]
    pub fn new(config: &'a Config, registry: &'a RendererRegistry, layouts: &'a LayoutSet) -> Self {
        Self {
            config,
            registry,
            layouts,
        }
    }

    /// Check that every renderer named in `config.renderers` is registered.
    pub fn validate_renderers(&self) -> Result<()> {
        for (extension, name) in &self.config.renderers {
            if name != PASSTHROUGH_RENDERER && !self.registry.contains(name) {
                return Err(GenerateError::UnknownRenderer {
                    extension: extension.clone(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Generate every page for `documents`.
    ///
    /// Documents render in parallel; results keep source order. A document
    /// that fails is logged and recorded in [`GenerateOutput::failures`]
    /// unless `fail_fast` is set, in which case the first failure in source
    /// order is returned.
    pub fn generate(&self, documents: &[SourceDocument]) -> Result<GenerateOutput> {
        self.validate_renderers()?;

        let mut output = GenerateOutput::default();
        let total = documents.len();
        let documents: Vec<&SourceDocument> = documents
            .iter()
            .filter(|doc| {
                let skip = doc.is_draft() && !self.config.drafts;
                if skip {
                    debug!(path = %doc.source_path.display(), "skipping draft");
                }
                !skip
            })
            .collect();
        output.drafts_skipped = total - documents.len();

        info!(count = documents.len(), "generating pages");

        let results: Vec<Result<Page>> = documents
            .par_iter()
            .map(|doc| self.render_document(doc))
            .collect();

        let mut rendered: Vec<(&SourceDocument, Page)> = Vec::with_capacity(documents.len());
        for (doc, result) in documents.iter().zip(results) {
            match result {
                Ok(page) => rendered.push((*doc, page)),
                Err(e) => self.record_failure(e, &doc.source_path, &mut output.failures)?,
            }
        }

        let listings = self.generate_listings(&rendered, &mut output.failures)?;
        output.listing_pages = listings.len();
        output.pages = rendered.into_iter().map(|(_, page)| page).collect();
        output.pages.extend(listings);

        check_unique_outputs(&output.pages)?;

        info!(
            pages = output.document_pages(),
            listing_pages = output.listing_pages,
            failures = output.failures.len(),
            "generation complete"
        );
        Ok(output)
    }

    /// Render one document into a page.
    pub fn render_document(&self, doc: &SourceDocument) -> Result<Page> {
        debug!(path = %doc.source_path.display(), "rendering document");
        let render_err = |e| GenerateError::render(&doc.source_path, e);

        let renderer = self
            .registry
            .for_extension(self.config, &doc.extension)
            .map_err(render_err)?;
        let relative_path = output_relative_path(doc, renderer.is_some());

        // Front matter wins over site variables.
        let mut context = self.config.site_context();
        context.extend(doc.front_matter.clone());
        context.insert("url".into(), Value::String(url_for(&relative_path)));
        context.insert("source_path".into(), Value::String(doc.source_key()));

        let body = match &renderer {
            Some(renderer) => renderer
                .render(&doc.raw_body, &context)
                .map_err(render_err)?,
            None => doc.raw_body.clone(),
        };

        derive_metadata(&mut context, doc, &body);

        let content = apply_layouts(body, &context, self.layouts, self.registry, self.config)
            .map_err(render_err)?;

        Ok(Page::new(
            &self.config.output_dir,
            relative_path,
            content,
            context,
            Some(doc.source_path.clone()),
        ))
    }

    fn generate_listings(
        &self,
        rendered: &[(&SourceDocument, Page)],
        failures: &mut Vec<GenerateError>,
    ) -> Result<Vec<Page>> {
        let entries: Vec<(&SourceDocument, &Page)> =
            rendered.iter().map(|(doc, page)| (*doc, page)).collect();
        let site_context = self.config.site_context();
        let mut pages = Vec::new();

        for (name, collection) in &self.config.collections {
            let listings = collection::listings(name, collection, &entries, &site_context);
            debug!(collection = %name, count = listings.len(), "expanding collection");

            for listing in listings {
                let rendered = apply_layouts(
                    String::new(),
                    &listing.context,
                    self.layouts,
                    self.registry,
                    self.config,
                );
                match rendered {
                    Ok(content) => pages.push(Page::new(
                        &self.config.output_dir,
                        listing.relative_path,
                        content,
                        listing.context,
                        None,
                    )),
                    Err(e) => {
                        let path = PathBuf::from(&listing.relative_path);
                        self.record_failure(GenerateError::render(&path, e), &path, failures)?;
                    }
                }
            }
        }

        Ok(pages)
    }

    fn record_failure(
        &self,
        err: GenerateError,
        path: &Path,
        failures: &mut Vec<GenerateError>,
    ) -> Result<()> {
        if self.config.fail_fast {
            return Err(err);
        }
        error!(path = %path.display(), error = %err, "skipping page");
        failures.push(err);
        Ok(())
    }
}

/// Output path relative to the output directory.
///
/// A `permalink` in front matter wins; otherwise rendered documents swap
/// their extension for `.html` and pass-through documents keep their path.
#[must_use]
pub fn output_relative_path(doc: &SourceDocument, rendered: bool) -> String {
    if let Some(permalink) = doc.get_str("permalink") {
        return permalink_path(permalink);
    }
    if rendered {
        path_to_slash(&doc.source_path.with_extension("html"))
    } else {
        doc.source_key()
    }
}

/// Normalize a permalink: no leading `/`, no `.` or `..` segments, and a
/// trailing `/` means `index.html` inside that directory.
#[must_use]
pub fn permalink_path(permalink: &str) -> String {
    let segments: Vec<&str> = permalink
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let mut path = segments.join("/");

    if path.is_empty() || permalink.ends_with('/') {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str("index.html");
    }
    path
}

/// Fill `title`, `excerpt`, `image`, `word_count` and `reading_time`.
///
/// Front matter values for `title`, `excerpt` and `image` are kept.
fn derive_metadata(context: &mut Metadata, doc: &SourceDocument, body: &str) {
    if doc.get("title").is_none() {
        let title = html::first_heading(body).unwrap_or_else(|| doc.stem());
        context.insert("title".into(), Value::String(title));
    }

    for (key, value) in [
        ("excerpt", html::first_paragraph(body)),
        ("image", html::first_image(body)),
    ] {
        if doc.get(key).is_none() {
            match value {
                Some(v) => context.insert(key.into(), Value::String(v)),
                None => context.remove(key),
            };
        }
    }

    let words = html::word_count(body);
    context.insert("word_count".into(), Value::from(words));
    context.insert(
        "reading_time".into(),
        Value::from(words.div_ceil(WORDS_PER_MINUTE).max(1)),
    );
}

fn check_unique_outputs(pages: &[Page]) -> Result<()> {
    let mut seen: HashMap<&Path, String> = HashMap::with_capacity(pages.len());
    for page in pages {
        let origin = origin(page);
        match seen.entry(page.output_path.as_path()) {
            Entry::Occupied(first) => {
                return Err(GenerateError::DuplicateOutput {
                    path: page.output_path.clone(),
                    first: first.get().clone(),
                    second: origin,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(origin);
            }
        }
    }
    Ok(())
}

fn origin(page: &Page) -> String {
    match (&page.source_path, page.metadata.get("collection").and_then(Value::as_str)) {
        (Some(source), _) => path_to_slash(source),
        (None, Some(collection)) => format!("collection `{collection}`"),
        (None, None) => page.relative_path.clone(),
    }
}
