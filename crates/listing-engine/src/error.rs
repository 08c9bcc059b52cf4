//! Failure taxonomy for listing extraction.
//!
//! Every public entry point returns [`ExtractError`]. Missing optional
//! fields are never errors; they are reported through
//! [`PartialDataWarning`](crate::item::PartialDataWarning) instead.

use std::time::Duration;

/// Errors surfaced by [`Engine::extract`](crate::Engine::extract).
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// No registered platform pattern matches the URL.
    #[error("Unsupported marketplace: {url}")]
    UnsupportedPlatform { url: String },

    /// The adapter ran but every title strategy came up empty.
    #[error("Could not read listing from {platform}")]
    ExtractionFailed {
        platform: &'static str,
        /// Strategies tried, in order, for the field that defeated us.
        attempted: Vec<&'static str>,
    },

    /// Network or browser failure; the caller may retry.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ExtractError {
    pub(crate) fn failed(platform: &'static str, attempted: &[&'static str]) -> Self {
        Self::ExtractionFailed {
            platform,
            attempted: attempted.to_vec(),
        }
    }

    /// Whether repeating the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(t) if t.is_retryable())
    }
}

/// Network/browser level failures.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("browser disconnected")]
    Disconnected,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Launch(_) => false,
            _ => true,
        }
    }
}

/// Convenience result type.
pub type ExtractResult<T> = Result<T, ExtractError>;
