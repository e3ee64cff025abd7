//! Site configuration management.
//!
//! The configuration file may be TOML, YAML or JSON (picked by extension).
//! Every field is optional; whatever the file provides is merged over the
//! built-in defaults:
//!
//! ```toml
//! source_dir = "content"
//! output_dir = "public"
//! layouts_dir = "layouts"
//! locale = "en-US"
//!
//! [renderers]
//! md = "markdown"
//! html = "template"
//!
//! [collections.posts]
//! filter = { path_prefix = "posts/" }
//! sort_fields = ["-date", "title"]
//! page_size = 10
//! layout = "list"
//!
//! [variables]
//! site_title = "My Site"
//! ```
//!
//! Relative directories are resolved against the directory holding the
//! configuration file.

use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    content::Metadata,
    error::{CoreError, Result},
    frontmatter::toml_to_json,
};

/// Renderer name that forces a pass-through (no rendering) for an extension.
pub const PASSTHROUGH_RENDERER: &str = "passthrough";

/// Main configuration structure for Quire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the source tree.
    #[serde(alias = "sourceDir")]
    pub source_dir: PathBuf,

    /// Directory the rendered tree is written to.
    #[serde(alias = "outputDir")]
    pub output_dir: PathBuf,

    /// Directory holding layout templates.
    #[serde(alias = "layoutsDir")]
    pub layouts_dir: PathBuf,

    /// Default locale for formatted strings.
    pub locale: String,

    /// Whether documents marked `draft: true` are generated.
    pub drafts: bool,

    /// Abort on the first render failure instead of skipping the document.
    #[serde(alias = "failFast")]
    pub fail_fast: bool,

    /// Remove the output directory before saving.
    pub clean: bool,

    /// File extension to renderer name.
    pub renderers: BTreeMap<String, String>,

    /// Named listing collections.
    pub collections: BTreeMap<String, CollectionConfig>,

    /// Free-form site variables exposed to every render context.
    pub variables: Metadata,
}

/// A named, filtered, sorted and optionally paginated grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Which documents belong to the collection.
    #[serde(default)]
    pub filter: CollectionFilter,

    /// Sort specification, e.g. `["-date", "title"]`.
    #[serde(default, alias = "sortFields")]
    pub sort_fields: Vec<String>,

    /// Items per listing page; `None` puts everything on one page.
    #[serde(default, alias = "pageSize")]
    pub page_size: Option<usize>,

    /// Layout each listing page is rendered through.
    pub layout: String,

    /// Base output directory for listing pages (defaults to the collection name).
    #[serde(default)]
    pub path: Option<String>,

    /// Produce one listing per distinct value of this field.
    #[serde(default, alias = "groupBy")]
    pub group_by: Option<String>,
}

/// Membership rules for a collection. All given rules must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionFilter {
    /// Source path must start with this prefix.
    #[serde(alias = "pathPrefix")]
    pub path_prefix: Option<String>,

    /// Document must carry at least one of these tags.
    pub tags: Vec<String>,

    /// Front matter fields that must equal the given values.
    pub fields: Metadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("public"),
            layouts_dir: PathBuf::from("layouts"),
            locale: default_locale(),
            drafts: false,
            fail_fast: false,
            clean: false,
            renderers: default_renderers(),
            collections: BTreeMap::new(),
            variables: Metadata::new(),
        }
    }
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_renderers() -> BTreeMap<String, String> {
    [
        ("md", "markdown"),
        ("markdown", "markdown"),
        ("html", "template"),
        ("htm", "template"),
    ]
    .into_iter()
    .map(|(ext, name)| (ext.to_string(), name.to_string()))
    .collect()
}

impl CollectionConfig {
    /// Base output directory for this collection's listing pages.
    #[must_use]
    pub fn base_path<'a>(&'a self, name: &'a str) -> &'a str {
        self.path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .unwrap_or(name)
    }

    /// Effective page size; zero means no pagination.
    #[must_use]
    pub fn effective_page_size(&self) -> Option<usize> {
        self.page_size.filter(|&n| n > 0)
    }
}

impl CollectionFilter {
    /// Check a document's relative path and front matter against the filter.
    #[must_use]
    pub fn matches(&self, source_key: &str, front_matter: &Metadata) -> bool {
        if let Some(prefix) = &self.path_prefix
            && !source_key.starts_with(prefix.trim_start_matches('/'))
        {
            return false;
        }

        if !self.tags.is_empty() {
            let has_tag = match front_matter.get("tags") {
                Some(Value::Array(tags)) => tags
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|t| self.tags.iter().any(|wanted| wanted == t)),
                Some(Value::String(tag)) => self.tags.iter().any(|wanted| wanted == tag),
                _ => false,
            };
            if !has_tag {
                return false;
            }
        }

        self.fields
            .iter()
            .all(|(key, expected)| front_matter.get(key) == Some(expected))
    }
}

impl Config {
    /// Load configuration, falling back to defaults when the file is missing
    /// or cannot be parsed.
    ///
    /// Parse failures are logged rather than returned so a broken config
    /// degrades to a default build.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
            return Self::default().with_root(config_root(path));
        }

        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "invalid configuration, using defaults"
                );
                Self::default().with_root(config_root(path))
            }
        }
    }

    /// Load configuration, surfacing any read, parse or validation error.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml")
            .to_ascii_lowercase();

        let config = Self::parse(&content, &extension).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        let config = config.with_root(config_root(path));
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration text in the given format (`toml`, `yaml`/`yml`, `json`).
    pub fn parse(content: &str, format: &str) -> Result<Self> {
        let value = match format {
            "yaml" | "yml" => serde_yaml::from_str::<Value>(content)?,
            "json" => serde_json::from_str::<Value>(content)?,
            _ => toml_to_json(toml::Value::Table(toml::from_str::<toml::Table>(content)?)),
        };

        let value = match value {
            Value::Null => Value::Object(Metadata::new()),
            other => other,
        };

        let mut config: Config = serde_json::from_value(value)?;
        for (ext, name) in default_renderers() {
            config.renderers.entry(ext).or_insert(name);
        }
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Call again after overriding directories; [`Config::try_load`] only
    /// checks what the file declared.
    pub fn validate(&self) -> Result<()> {
        for (name, collection) in &self.collections {
            if collection.layout.trim().is_empty() {
                return Err(CoreError::config(format!(
                    "collection `{name}` must name a layout"
                )));
            }
            if collection.page_size == Some(0) {
                tracing::warn!(collection = %name, "page_size of 0 disables pagination");
            }
        }

        self.validate_output_dir()
    }

    /// Reject an `output_dir` that is, or contains, `source_dir` or
    /// `layouts_dir`.
    ///
    /// Writing or cleaning such an output directory would overwrite or
    /// delete the inputs.
    pub fn validate_output_dir(&self) -> Result<()> {
        let output = resolve_dir(&self.output_dir);
        for (key, dir) in [
            ("source_dir", &self.source_dir),
            ("layouts_dir", &self.layouts_dir),
        ] {
            if resolve_dir(dir).starts_with(&output) {
                return Err(CoreError::config(format!(
                    "output_dir {} must not be or contain {key} {}",
                    self.output_dir.display(),
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Resolve relative directories against `root`.
    #[must_use]
    pub fn with_root(mut self, root: &Path) -> Self {
        for dir in [
            &mut self.source_dir,
            &mut self.output_dir,
            &mut self.layouts_dir,
        ] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }

    /// Renderer name declared for an extension.
    #[must_use]
    pub fn renderer_for(&self, extension: &str) -> Option<&str> {
        self.renderers.get(extension).map(String::as_str)
    }

    /// Site-wide variables every render context starts from.
    #[must_use]
    pub fn site_context(&self) -> Metadata {
        let mut ctx = self.variables.clone();
        ctx.entry("locale")
            .or_insert_with(|| Value::String(self.locale.clone()));
        ctx
    }
}

fn config_root(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new(""))
}

/// Absolute, lexically normalized form of `dir` with its longest existing
/// prefix canonicalized, so `.`/`..` segments and symlinks compare equal.
fn resolve_dir(dir: &Path) -> PathBuf {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest
                .iter()
                .rev()
                .fold(canonical, |path, part| path.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> String {
        r#"
source_dir = "src"
output_dir = "dist"
locale = "de-DE"
fail_fast = true

[renderers]
txt = "markdown"
html = "passthrough"

[collections.posts]
filter = { path_prefix = "posts/", tags = ["rust"] }
sort_fields = ["-date", "title"]
page_size = 5
layout = "list"

[collections.tags]
group_by = "tags"
layout = "tag"
path = "/topics/"

[variables]
site_title = "Test Site"
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, create_test_config()).expect("write");

        let config = Config::try_load(&config_path).expect("load config");

        assert_eq!(config.source_dir, dir.path().join("src"));
        assert_eq!(config.output_dir, dir.path().join("dist"));
        assert_eq!(config.layouts_dir, dir.path().join("layouts"));
        assert_eq!(config.locale, "de-DE");
        assert!(config.fail_fast);
        assert_eq!(config.renderer_for("txt"), Some("markdown"));
        assert_eq!(config.renderer_for("html"), Some("passthrough"));
        assert_eq!(config.renderer_for("md"), Some("markdown"));

        let posts = &config.collections["posts"];
        assert_eq!(posts.sort_fields, vec!["-date", "title"]);
        assert_eq!(posts.effective_page_size(), Some(5));
        assert_eq!(posts.base_path("posts"), "posts");
        assert_eq!(posts.filter.tags, vec!["rust"]);

        let tags = &config.collections["tags"];
        assert_eq!(tags.group_by.as_deref(), Some("tags"));
        assert_eq!(tags.base_path("tags"), "topics");
        assert_eq!(config.variables["site_title"], "Test Site");
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::parse("", "toml").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.output_dir, PathBuf::from("public"));
        assert_eq!(config.renderer_for("md"), Some("markdown"));
        assert_eq!(config.renderer_for("html"), Some("template"));
        assert!(config.collections.is_empty());
    }

    #[test]
    fn test_yaml_with_camel_case_keys() {
        let yaml = r#"
sourceDir: pages
outputDir: out
collections:
  blog:
    sortFields: ["-date"]
    pageSize: 2
    layout: list
"#;
        let config = Config::parse(yaml, "yaml").expect("parse");
        assert_eq!(config.source_dir, PathBuf::from("pages"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.collections["blog"].page_size, Some(2));
    }

    #[test]
    fn test_json_config() {
        let json = r#"{"locale": "fr-FR", "variables": {"author": "Ada"}}"#;
        let config = Config::parse(json, "json").expect("parse");
        assert_eq!(config.locale, "fr-FR");
        assert_eq!(config.site_context()["author"], "Ada");
        assert_eq!(config.site_context()["locale"], "fr-FR");
    }

    #[test]
    fn test_lenient_load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "this is = = not toml").expect("write");

        assert!(Config::try_load(&config_path).is_err());

        let config = Config::load(&config_path);
        assert_eq!(config.output_dir, dir.path().join("public"));
        assert_eq!(config.renderers, default_renderers());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::try_load(Path::new("/nonexistent/config.toml"));
        assert!(result.unwrap_err().to_string().contains("not found"));

        let config = Config::load(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.source_dir, PathBuf::from("/nonexistent/content"));
    }

    #[test]
    fn test_collection_requires_layout() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[collections.posts]\nlayout = \"\"\n").expect("write");

        let err = Config::try_load(&config_path).unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join("quire.toml");
        std::fs::write(&config_path, content).expect("write");
        config_path
    }

    #[test]
    fn test_output_dir_containing_sources_is_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");

        for content in [
            "source_dir = \"content\"\noutput_dir = \".\"\nclean = true\n",
            "source_dir = \"site/content\"\noutput_dir = \"site\"\n",
            "output_dir = \"content/../content\"\n",
            "layouts_dir = \"out/layouts\"\noutput_dir = \"out/\"\n",
        ] {
            let err = Config::try_load(&write_config(dir.path(), content)).unwrap_err();
            assert!(err.to_string().contains("must not be or contain"), "{content}");
        }
    }

    #[test]
    fn test_sibling_output_dir_is_accepted() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = write_config(dir.path(), "output_dir = \"content-out\"\n");

        let config = Config::try_load(&config_path).unwrap();
        assert_eq!(config.output_dir, dir.path().join("content-out"));
    }

    #[test]
    fn test_validate_catches_overridden_output_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut config = Config::try_load(&write_config(dir.path(), "")).unwrap();

        config.output_dir = dir.path().to_path_buf();
        assert!(config.validate().is_err());
        config.output_dir = dir.path().join("public");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_filter_matches() {
        let filter = CollectionFilter {
            path_prefix: Some("posts/".to_string()),
            tags: vec!["rust".to_string()],
            fields: serde_json::json!({"lang": "en"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };

        let fm = serde_json::json!({"tags": ["go", "rust"], "lang": "en"});
        let fm = fm.as_object().expect("object");
        assert!(filter.matches("posts/a.md", fm));
        assert!(!filter.matches("pages/a.md", fm));

        let other = serde_json::json!({"tags": "rust", "lang": "de"});
        assert!(!filter.matches("posts/a.md", other.as_object().expect("object")));
    }
}
