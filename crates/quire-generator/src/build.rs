//! Build orchestration.
//!
//! Coordinates the full pipeline: load sources, generate pages, save them.

use std::{fs, sync::Arc, time::Instant};

use quire_core::{Config, SourceDocument, config::PASSTHROUGH_RENDERER};
use quire_render::{FormatterCache, LayoutSet, RendererRegistry};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    GenerateError, Result, generator::PageGenerator, loader::SourceLoader, saver::save_all,
};

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Pages generated from source documents.
    pub pages: usize,

    /// Collection listing pages generated.
    pub listing_pages: usize,

    /// Drafts left out of the build.
    pub drafts_skipped: usize,

    /// Documents or listings that failed to render, with the reason.
    pub failures: Vec<String>,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildStats {
    /// Whether some pages failed and were skipped.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Total pages written.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.pages + self.listing_pages
    }
}

/// Site builder that orchestrates the build process.
#[derive(Debug)]
pub struct Builder {
    config: Config,
    registry: RendererRegistry,
}

impl Builder {
    /// Create a builder with the built-in renderers.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let formatters = Arc::new(FormatterCache::new());
        let registry = RendererRegistry::with_defaults(formatters, &config.locale);
        Self { config, registry }
    }

    /// Replace the renderer registry.
    #[must_use]
    pub fn with_registry(mut self, registry: RendererRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The configuration this builder runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the full build process.
    ///
    /// Per-document render failures are reported in [`BuildStats::failures`]
    /// unless `fail_fast` is set; unreadable sources and failed writes abort.
    /// An output directory that holds the sources or layouts is refused
    /// before anything is read or removed.
    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        self.config.validate_output_dir()?;

        info!(
            source = %self.config.source_dir.display(),
            output = %self.config.output_dir.display(),
            "starting build"
        );

        // 1. Load layouts and sources
        let layouts = self.load_layouts()?;
        let documents = SourceLoader::new(&self.config.source_dir).load_all()?;

        // 2. Generate pages
        let generator = PageGenerator::new(&self.config, &self.registry, &layouts);
        let output = generator.generate(&documents)?;

        // 3. Save
        if self.config.clean {
            self.clean_output()?;
        }
        save_all(&output.pages)?;

        let stats = BuildStats {
            pages: output.document_pages(),
            listing_pages: output.listing_pages,
            drafts_skipped: output.drafts_skipped,
            failures: output.failures.iter().map(ToString::to_string).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if stats.has_failures() {
            warn!(failed = stats.failures.len(), "build finished with failures");
        }
        info!(
            pages = stats.pages,
            listing_pages = stats.listing_pages,
            drafts_skipped = stats.drafts_skipped,
            duration_ms = stats.duration_ms,
            "build complete"
        );

        Ok(stats)
    }

    /// Validate the site without writing anything.
    ///
    /// Returns one message per problem found: unknown renderers, missing or
    /// cyclic layouts, and pages that would fail to render.
    pub fn check(&self) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        for (extension, name) in &self.config.renderers {
            if name != PASSTHROUGH_RENDERER && !self.registry.contains(name) {
                issues.push(format!(
                    "extension `{extension}` maps to unknown renderer `{name}`"
                ));
            }
        }

        let layouts = self.load_layouts()?;
        for (name, collection) in &self.config.collections {
            if let Err(e) = layouts.chain(&collection.layout) {
                issues.push(format!("collection `{name}`: {e}"));
            }
        }

        let documents = SourceLoader::new(&self.config.source_dir).load_all()?;
        for doc in &documents {
            if let Some(layout) = doc.get("layout").and_then(Value::as_str)
                && let Err(e) = layouts.chain(layout)
            {
                issues.push(format!("{}: {e}", doc.source_path.display()));
            }
        }

        if issues.is_empty() {
            issues.extend(self.dry_run(&layouts, &documents));
        }

        debug!(issues = issues.len(), "check complete");
        Ok(issues)
    }

    /// Render everything in memory and collect failures as messages.
    fn dry_run(&self, layouts: &LayoutSet, documents: &[SourceDocument]) -> Vec<String> {
        let mut config = self.config.clone();
        config.fail_fast = false;
        let generator = PageGenerator::new(&config, &self.registry, layouts);

        match generator.generate(documents) {
            Ok(output) => output.failures.iter().map(ToString::to_string).collect(),
            Err(e) => vec![e.to_string()],
        }
    }

    fn load_layouts(&self) -> Result<LayoutSet> {
        LayoutSet::load(&self.config.layouts_dir)
            .map_err(|e| GenerateError::render(&self.config.layouts_dir, e))
    }

    /// Clean the output directory.
    fn clean_output(&self) -> Result<()> {
        let dir = &self.config.output_dir;
        if dir.exists() {
            debug!(dir = %dir.display(), "cleaning output directory");
            fs::remove_dir_all(dir).map_err(|e| GenerateError::output_write(dir, e))?;
        }
        Ok(())
    }
}
