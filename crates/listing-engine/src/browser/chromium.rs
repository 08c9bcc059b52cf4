//! Chromium over CDP via chromiumoxide.

use super::{BrowserProcess, Launcher, RenderContext};
use crate::config::{BrowserConfig, USER_AGENT};
use crate::error::TransportError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ENV_CHROMIUM_PATH: &str = "LISTING_CHROMIUM_PATH";

/// Request types failed at the network layer; listing data never needs them.
const BLOCKED_RESOURCES: [ResourceType; 4] = [
    ResourceType::Image,
    ResourceType::Stylesheet,
    ResourceType::Font,
    ResourceType::Media,
];

/// Resolves once the initial document has been parsed.
const DOM_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState !== 'loading') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

/// Find the Chromium binary.
pub fn find_chromium(config: &BrowserConfig) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(path) = config.chromium_path.as_ref().filter(|p| p.exists()) {
        return Some(path.clone());
    }

    // 2. LISTING_CHROMIUM_PATH
    if let Ok(p) = std::env::var(ENV_CHROMIUM_PATH) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. macOS app bundles
    if cfg!(target_os = "macos") {
        let bundle = "Applications/Google Chrome.app/Contents/MacOS/Google Chrome";
        let mut candidates = vec![PathBuf::from("/").join(bundle)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(bundle));
        }
        return candidates.into_iter().find(|c| c.exists());
    }

    None
}

/// Launches a local Chromium.
pub struct ChromiumLauncher;

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(
        &self,
        config: &BrowserConfig,
    ) -> Result<Arc<dyn BrowserProcess>, TransportError> {
        let chrome_path = find_chromium(config).ok_or_else(|| {
            TransportError::Launch(format!("Chromium not found. Set {ENV_CHROMIUM_PATH}."))
        })?;

        let mut builder = CdpConfig::builder()
            .chrome_executable(&chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        builder = if config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        for arg in &config.extra_args {
            builder = builder.arg(arg.as_str());
        }
        let cdp_config = builder
            .build()
            .map_err(|e| TransportError::Launch(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| TransportError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
            flag.store(false, Ordering::SeqCst);
            warn!("browser connection closed");
        });

        info!(path = %chrome_path.display(), headless = config.headless, "browser launched");
        Ok(Arc::new(ChromiumProcess {
            browser: Arc::new(Mutex::new(browser)),
            connected,
            handler_task,
        }))
    }
}

struct ChromiumProcess {
    browser: Arc<Mutex<Browser>>,
    connected: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserProcess for ChromiumProcess {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_context(&self) -> Result<Box<dyn RenderContext>, TransportError> {
        let translate = |e: CdpError| translate_cdp(e, &self.connected);

        let browser = self.browser.lock().await;
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(translate)?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(TransportError::Browser)?;
        let page = match browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await;
                return Err(translate(e));
            }
        };
        drop(browser);

        let mut ctx = ChromiumContext {
            page,
            context_id,
            browser: Arc::clone(&self.browser),
            connected: Arc::clone(&self.connected),
            interceptor: None,
        };
        if let Err(e) = ctx.prepare().await {
            let err = translate(e);
            Box::new(ctx).close().await;
            return Err(err);
        }
        Ok(Box::new(ctx))
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!(error = %e, "browser close failed");
        }
        let _ = browser.wait().await;
        self.handler_task.abort();
        self.connected.store(false, Ordering::SeqCst);
    }
}

struct ChromiumContext {
    page: Page,
    context_id: BrowserContextId,
    browser: Arc<Mutex<Browser>>,
    connected: Arc<AtomicBool>,
    interceptor: Option<JoinHandle<()>>,
}

impl ChromiumContext {
    /// Browser identity and resource blocking, before any navigation.
    async fn prepare(&mut self) -> Result<(), CdpError> {
        self.page
            .execute(SetUserAgentOverrideParams::new(USER_AGENT))
            .await?;

        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        let patterns: Vec<RequestPattern> = BLOCKED_RESOURCES
            .iter()
            .map(|kind| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(kind.clone())
                    .request_stage(RequestStage::Request)
                    .build()
            })
            .collect();
        self.page
            .execute(EnableParams::builder().patterns(patterns).build())
            .await?;

        let page = self.page.clone();
        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if let Err(e) = page.execute(fail).await {
                    debug!(error = %e, "could not fail blocked request");
                }
            }
        }));
        Ok(())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), TransportError> {
        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(TransportError::Browser)?;

        let page = &self.page;
        let load = async {
            page.execute(nav).await?;
            page.evaluate(DOM_READY_SCRIPT).await?;
            Ok::<_, CdpError>(())
        };
        match tokio::time::timeout(timeout, load).await {
            Ok(Ok(())) => {
                debug!(url, "document ready");
                Ok(())
            }
            Ok(Err(e)) => Err(translate_cdp(e, &self.connected)),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, TransportError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| translate_cdp(e, &self.connected))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(self: Box<Self>) {
        let ChromiumContext {
            page,
            context_id,
            browser,
            interceptor,
            ..
        } = *self;
        if let Some(task) = interceptor {
            task.abort();
        }
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }
        let browser = browser.lock().await;
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            debug!(error = %e, "browser context dispose failed");
        }
    }
}

/// Map chromiumoxide failures onto the transport taxonomy.
fn translate_cdp(err: CdpError, connected: &AtomicBool) -> TransportError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) => TransportError::Disconnected,
        _ if !connected.load(Ordering::SeqCst) => TransportError::Disconnected,
        other => TransportError::Browser(other.to_string()),
    }
}
