//! Engine configuration.
//!
//! Defaults suit a desktop or container host with Chromium on `PATH`.
//! Environment variables override defaults; the CLI overrides both.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Browser identity sent by both the HTTP fetcher and the browser pages.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/120.0.0.0 Safari/537.36";

const ENV_CHROMIUM_PATH: &str = "LISTING_CHROMIUM_PATH";
const ENV_NAV_TIMEOUT_MS: &str = "LISTING_NAV_TIMEOUT_MS";
const ENV_HTTP_TIMEOUT_MS: &str = "LISTING_HTTP_TIMEOUT_MS";
const ENV_HEADLESS: &str = "LISTING_HEADLESS";

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for a static page fetch, in milliseconds.
    pub http_timeout_ms: u64,
    pub browser: BrowserConfig,
}

/// Settings for the shared headless browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit Chromium binary; discovered on the host when unset.
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    /// Upper bound on waiting for the initial document parse.
    pub navigation_timeout_ms: u64,
    /// Extra command-line switches passed to Chromium.
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: 15_000,
            browser: BrowserConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chromium_path: None,
            headless: true,
            navigation_timeout_ms: 30_000,
            extra_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `LISTING_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_lookup(|key| std::env::var(key).ok())
    }

    fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_CHROMIUM_PATH).filter(|p| !p.is_empty()) {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = lookup(ENV_NAV_TIMEOUT_MS).and_then(|v| v.parse().ok()) {
            self.browser.navigation_timeout_ms = ms;
        }
        if let Some(ms) = lookup(ENV_HTTP_TIMEOUT_MS).and_then(|v| v.parse().ok()) {
            self.http_timeout_ms = ms;
        }
        if let Some(v) = lookup(ENV_HEADLESS) {
            self.browser.headless = !matches!(v.as_str(), "0" | "false" | "no");
        }
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}
