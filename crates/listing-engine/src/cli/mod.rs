//! Subcommand implementations for the `listing` binary.

pub mod extract_cmd;
pub mod normalize_cmd;

use listing_engine::{marketplace_label, EngineConfig, Platform};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` wins over the flags.
pub fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let default = if verbose {
        "listing_engine=debug"
    } else if quiet {
        "error"
    } else {
        "listing_engine=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Command-line settings layered over [`EngineConfig::from_env`].
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub navigation_timeout_ms: Option<u64>,
    pub http_timeout_ms: Option<u64>,
    pub chromium_path: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(self, mut config: EngineConfig) -> EngineConfig {
        if let Some(ms) = self.navigation_timeout_ms {
            config.browser.navigation_timeout_ms = ms;
        }
        if let Some(ms) = self.http_timeout_ms {
            config.http_timeout_ms = ms;
        }
        if let Some(path) = self.chromium_path {
            config.browser.chromium_path = Some(path);
        }
        config
    }
}

/// `listing supported <url>`
pub fn supported(url: &str) -> bool {
    match Platform::detect(url) {
        Some(platform) => {
            println!("{platform}");
            true
        }
        None => {
            println!("unsupported ({})", marketplace_label(url));
            false
        }
    }
}
