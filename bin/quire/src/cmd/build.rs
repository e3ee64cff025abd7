//! Build command - generates the site

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use color_eyre::eyre::{Result, WrapErr, bail};
use quire_core::Config;
use quire_generator::{BuildStats, Builder};

/// Overrides the command line applies on top of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Output directory, replacing `output_dir`.
    pub output: Option<PathBuf>,
    /// Include drafts.
    pub drafts: bool,
    /// Abort on the first page that fails to render.
    pub fail_fast: bool,
    /// Remove the output directory before writing.
    pub clean: bool,
}

impl BuildOptions {
    /// Apply these overrides to a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            tracing::info!(output = %output.display(), "overriding output directory from CLI");
            config.output_dir = output.clone();
        }
        config.drafts |= self.drafts;
        config.fail_fast |= self.fail_fast;
        config.clean |= self.clean;
    }
}

/// Run the build command.
///
/// A missing or unreadable configuration file falls back to defaults.
/// Returns an error if any page failed to render, after writing the rest.
pub fn run(config_path: &Path, options: &BuildOptions) -> Result<BuildStats> {
    let start = Instant::now();
    tracing::info!(?config_path, ?options, "Starting build");

    let mut config = Config::load(config_path);
    options.apply(&mut config);
    config.validate().wrap_err("Invalid configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let output = config.output_dir.clone();
    let stats = Builder::new(config).build().wrap_err("Build failed")?;
    let duration = start.elapsed();

    println!();
    println!("  Pages:      {}", stats.pages);
    println!("  Listings:   {}", stats.listing_pages);
    println!("  Drafts:     {} skipped", stats.drafts_skipped);
    println!();
    println!("  Duration:   {:.2}s", duration.as_secs_f64());
    println!("  Output:     {}", output.display());
    println!();

    if stats.has_failures() {
        println!("  Failed:");
        for failure in &stats.failures {
            println!("  ✗ {failure}");
        }
        println!();
        bail!("{} page(s) failed to render", stats.failures.len());
    }

    println!("  Build completed successfully!");
    tracing::info!(?stats, ?duration, "Build completed successfully");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn site(root: &Path) -> PathBuf {
        fs::create_dir_all(root.join("content")).unwrap();
        fs::write(root.join("content/index.md"), "# Home").unwrap();
        let config = root.join("quire.toml");
        fs::write(&config, "").unwrap();
        config
    }

    #[test]
    fn test_options_override_config() {
        let mut config = Config::default();
        let options = BuildOptions {
            output: Some(PathBuf::from("dist")),
            drafts: true,
            ..BuildOptions::default()
        };
        options.apply(&mut config);

        assert_eq!(config.output_dir, PathBuf::from("dist"));
        assert!(config.drafts);
        assert!(!config.fail_fast);
    }

    #[test]
    fn test_run_writes_output() {
        let dir = TempDir::new().unwrap();
        let config = site(dir.path());

        let stats = run(&config, &BuildOptions::default()).unwrap();
        assert_eq!(stats.pages, 1);
        assert!(dir.path().join("public/index.html").exists());
    }

    #[test]
    fn test_run_rejects_output_over_sources() {
        let dir = TempDir::new().unwrap();
        let config = site(dir.path());
        let options = BuildOptions {
            output: Some(dir.path().to_path_buf()),
            clean: true,
            ..BuildOptions::default()
        };

        let err = run(&config, &options).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
        assert!(dir.path().join("content/index.md").exists());
    }

    #[test]
    fn test_run_fails_on_partial_failure() {
        let dir = TempDir::new().unwrap();
        let config = site(dir.path());
        fs::write(dir.path().join("content/bad.md"), "---\nlayout: gone\n---\n").unwrap();

        let err = run(&config, &BuildOptions::default()).unwrap_err();
        assert!(err.to_string().contains("1 page(s) failed"));
        assert!(dir.path().join("public/index.html").exists());
    }
}
