//! Check command - validate configuration and content

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, bail};
use quire_core::Config;
use quire_generator::Builder;

/// Run the check command.
///
/// Unlike `build`, an invalid configuration file is an error here.
pub fn run(config_path: &Path) -> Result<()> {
    tracing::info!(?config_path, "Checking configuration and content");

    println!("Checking configuration...");
    let config = Config::try_load(config_path).wrap_err("Configuration invalid")?;
    println!("  ✓ Configuration valid");

    println!("\nChecking layouts and content...");
    let issues = Builder::new(config).check().wrap_err("Check failed")?;

    if !issues.is_empty() {
        println!();
        println!("Errors:");
        for issue in &issues {
            println!("  ✗ {issue}");
        }
        bail!("Validation failed with {} error(s)", issues.len());
    }

    println!();
    println!("✓ All checks passed");
    Ok(())
}
