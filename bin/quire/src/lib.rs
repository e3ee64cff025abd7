//! Quire CLI Library
//!
//! Command implementations and logging setup for the `quire` binary.
//!
//! Every file under `source_dir` is treated as UTF-8 text; keep images and
//! other binary assets out of it, or the build stops at the first one.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, check)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use quire::cmd::build::{self, BuildOptions};
//!
//! build::run(Path::new("quire.toml"), &BuildOptions::default()).unwrap();
//! ```

pub mod cmd;

pub use quire_core::{Config, Page};
pub use quire_generator::{BuildStats, Builder};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
///
/// `RUST_LOG` directives are honoured on top of the chosen level.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(level_for(verbose).into()),
        )
        .init();
}

/// Map a `-v` count to a log level.
#[must_use]
pub fn level_for(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}
