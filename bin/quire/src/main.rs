//! Quire CLI
//!
//! Renders a directory of source documents through pluggable renderers and
//! layouts into a static output tree.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use quire::cmd::build::BuildOptions;

/// Command-line interface for Quire.
#[derive(Parser)]
#[command(
    name = "quire",
    version,
    about = "A static content generator with pluggable renderers"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "quire.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Generate and write every page
    Build {
        /// Output directory (overrides `output_dir`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Include draft documents
        #[arg(long)]
        drafts: bool,
        /// Stop at the first page that fails to render
        #[arg(long)]
        fail_fast: bool,
        /// Remove the output directory before writing
        #[arg(long)]
        clean: bool,
    },
    /// Validate configuration, layouts and content without writing
    Check,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    quire::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            output,
            drafts,
            fail_fast,
            clean,
        } => {
            let options = BuildOptions {
                output,
                drafts,
                fail_fast,
                clean,
            };
            quire::cmd::build::run(&cli.config, &options)?;
        }
        Commands::Check => {
            quire::cmd::check::run(&cli.config)?;
        }
    }

    Ok(())
}
