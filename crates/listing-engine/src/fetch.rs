//! Static page fetcher wrapping reqwest.
//!
//! Not a browser: one GET with a fixed desktop-Chrome identity, no
//! JavaScript. A failed request is reported once; retry policy belongs to
//! the caller.

use crate::config::USER_AGENT;
use crate::error::TransportError;
use std::time::Duration;
use tracing::debug;

/// Raw HTML returned by a successful GET.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// HTTP client for statically rendered listing pages.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    /// GET `url` and return its body. Non-2xx statuses are transport errors.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = resp.text().await.map_err(|e| self.classify(e))?;
        debug!(url, status, bytes = body.len(), "fetched page");

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Http(err)
        }
    }
}
