//! Dispatch a listing URL to its platform adapter and normalize the result.

use crate::browser::SessionManager;
use crate::config::EngineConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::fetch::PageFetcher;
use crate::item::{CanonicalItem, PartialDataWarning};
use crate::normalize::normalize;
use crate::platforms::{facebook, offerup, Platform};
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for extraction. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Engine {
    fetcher: PageFetcher,
    browser: Arc<SessionManager>,
}

impl Engine {
    /// Build an engine. The browser is not launched until a
    /// browser-backed platform is requested.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            fetcher: PageFetcher::new(config.http_timeout()),
            browser: Arc::new(SessionManager::new(config.browser)),
        }
    }

    /// Build an engine around an existing session manager.
    pub fn with_session_manager(config: &EngineConfig, browser: Arc<SessionManager>) -> Self {
        Self {
            fetcher: PageFetcher::new(config.http_timeout()),
            browser,
        }
    }

    pub fn is_supported(&self, url: &str) -> bool {
        Platform::detect(url).is_some()
    }

    /// Extract and normalize one listing.
    pub async fn extract(&self, url: &str) -> ExtractResult<CanonicalItem> {
        self.extract_with_report(url).await.map(|(item, _)| item)
    }

    /// Like [`extract`](Self::extract), also returning the partial-data
    /// report when optional fields are missing.
    pub async fn extract_with_report(
        &self,
        url: &str,
    ) -> ExtractResult<(CanonicalItem, Option<PartialDataWarning>)> {
        let url = url.trim();
        let platform = Platform::detect(url).ok_or_else(|| ExtractError::UnsupportedPlatform {
            url: url.to_string(),
        })?;
        info!(%platform, url, "extracting listing");

        let raw = match platform {
            Platform::OfferUp => offerup::scrape(&self.fetcher, url).await,
            Platform::FacebookMarketplace => facebook::scrape(&self.browser, url).await,
        }
        .inspect_err(|e| warn!(%platform, url, error = %e, "extraction failed"))?;

        let item = normalize(&raw);
        let warning = item.partial_warning();
        if let Some(w) = &warning {
            warn!(%platform, url, missing = ?w.missing, "{w}");
        }
        Ok((item, warning))
    }

    /// Close the shared browser, if it was ever launched.
    pub async fn shutdown(&self) {
        self.browser.shutdown().await;
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.browser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeLauncher;
    use crate::config::BrowserConfig;
    use std::sync::atomic::Ordering;

    fn engine() -> (Engine, Arc<crate::browser::testing::FakeState>) {
        let (launcher, state) = FakeLauncher::returning(serde_json::json!({
            "scripts": [],
            "meta": {"title": "Patio Set", "price": "75"},
            "images": ["https://scontent.xx.fbcdn.net/patio.jpg"]
        }));
        let config = EngineConfig::default();
        let browser = Arc::new(SessionManager::with_launcher(
            BrowserConfig::default(),
            Box::new(launcher),
        ));
        (Engine::with_session_manager(&config, browser), state)
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[tokio::test]
    async fn test_unsupported_never_touches_browser() {
        let (engine, state) = engine();
        assert!(!engine.is_supported("https://www.craigslist.org/item/1"));

        let err = engine
            .extract("https://www.craigslist.org/item/1")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedPlatform { .. }));
        assert_eq!(state.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_facebook_dispatch_with_report() {
        let (engine, state) = engine();
        let url = "https://www.facebook.com/marketplace/item/123456789012345/";
        let (item, warning) = engine.extract_with_report(url).await.unwrap();

        assert_eq!(item.title, "Patio Set");
        assert_eq!(item.price, 75.0);
        assert!(item.available);
        assert_eq!(item.image_links.len(), 1);

        let warning = warning.expect("location and condition are missing");
        assert!(warning.missing.contains(&crate::item::ItemField::Location));
        assert_eq!(state.launches.load(Ordering::SeqCst), 1);
        assert_eq!(engine.session_manager().active_sessions(), 0);

        engine.shutdown().await;
        assert!(!engine.session_manager().is_launched().await);
    }
}
