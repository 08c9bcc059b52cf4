//! Shared headless browser with per-call isolated contexts.
//!
//! One browser process is launched lazily and reused across calls. Every
//! caller gets its own [`BrowserSession`] backed by a fresh browser context
//! (separate cookies and storage), and the context is released on every
//! exit path: explicit [`BrowserSession::close`], an early `?`, a panic, or
//! the caller dropping the future.
//!
//! The engine talks to the browser through the [`Launcher`],
//! [`BrowserProcess`] and [`RenderContext`] traits; [`chromium`] provides
//! the CDP implementation.

pub mod chromium;

use crate::config::BrowserConfig;
use crate::error::{ExtractResult, TransportError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Starts browser processes.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig)
        -> Result<Arc<dyn BrowserProcess>, TransportError>;
}

/// A running browser that can hand out isolated contexts.
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    /// `false` once the connection to the process has been lost.
    fn is_connected(&self) -> bool;
    /// Create a new isolated context with a single blank page.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, TransportError>;
    /// Terminate the process. Best effort.
    async fn close(&self);
}

/// A single isolated context (one page).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate and wait for the initial document to be parsed.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), TransportError>;
    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<Value, TransportError>;
    /// Dispose the page and its context. Best effort.
    async fn close(self: Box<Self>);
}

/// Owns the shared browser process.
pub struct SessionManager {
    config: BrowserConfig,
    launcher: Box<dyn Launcher>,
    process: Mutex<Option<Arc<dyn BrowserProcess>>>,
    active: Arc<AtomicUsize>,
}

impl SessionManager {
    /// Nothing is launched until the first [`acquire`](Self::acquire).
    pub fn new(config: BrowserConfig) -> Self {
        Self::with_launcher(config, Box::new(chromium::ChromiumLauncher))
    }

    pub fn with_launcher(config: BrowserConfig, launcher: Box<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            process: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open a fresh isolated session, launching the browser if needed.
    ///
    /// A connection-level failure while opening the context triggers exactly
    /// one relaunch before the error is surfaced. Opening a context is
    /// bounded by the navigation timeout; a process that misses it is
    /// discarded so the next call starts a fresh one.
    pub async fn acquire(&self) -> ExtractResult<BrowserSession> {
        let process = self.running_process().await?;
        let ctx = match self.open_context(&process).await {
            Ok(ctx) => ctx,
            Err(TransportError::Disconnected) => {
                warn!("browser connection lost, relaunching once");
                self.discard(&process).await;
                let process = self.running_process().await?;
                self.open_context(&process).await?
            }
            Err(e) => return Err(e.into()),
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(active, "browser session acquired");
        Ok(BrowserSession {
            ctx: Some(ctx),
            navigation_timeout: self.config.navigation_timeout(),
            active: Arc::clone(&self.active),
        })
    }

    /// Close the browser process. A later `acquire` relaunches it.
    pub async fn shutdown(&self) {
        let process = self.process.lock().await.take();
        if let Some(process) = process {
            info!("shutting down browser");
            process.close().await;
        }
    }

    pub async fn is_launched(&self) -> bool {
        self.process
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| p.is_connected())
    }

    /// Sessions acquired and not yet released.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn open_context(
        &self,
        process: &Arc<dyn BrowserProcess>,
    ) -> Result<Box<dyn RenderContext>, TransportError> {
        let limit = self.config.navigation_timeout();
        match tokio::time::timeout(limit, process.new_context()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "browser context creation timed out");
                self.discard(process).await;
                Err(TransportError::Timeout(limit))
            }
        }
    }

    async fn running_process(&self) -> Result<Arc<dyn BrowserProcess>, TransportError> {
        let mut slot = self.process.lock().await;
        if let Some(process) = slot.as_ref() {
            if process.is_connected() {
                return Ok(Arc::clone(process));
            }
            warn!("browser process disconnected, relaunching");
            if let Some(stale) = slot.take() {
                stale.close().await;
            }
        }

        let process = self.launcher.launch(&self.config).await?;
        *slot = Some(Arc::clone(&process));
        Ok(process)
    }

    /// Drop `process` from the slot if it is still the current one.
    async fn discard(&self, process: &Arc<dyn BrowserProcess>) {
        let mut slot = self.process.lock().await;
        if slot.as_ref().is_some_and(|p| Arc::ptr_eq(p, process)) {
            slot.take();
        }
        drop(slot);
        process.close().await;
    }
}

/// An acquired browser context. Released on drop.
pub struct BrowserSession {
    ctx: Option<Box<dyn RenderContext>>,
    navigation_timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl BrowserSession {
    /// Navigate, bounded by the configured navigation timeout.
    pub async fn navigate(&mut self, url: &str) -> Result<(), TransportError> {
        let timeout = self.navigation_timeout;
        self.context_mut()?.navigate(url, timeout).await
    }

    /// Evaluate `script` and deserialize its result.
    pub async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T, TransportError> {
        let ctx = self.ctx.as_ref().ok_or(TransportError::Disconnected)?;
        let value = ctx.evaluate(script).await?;
        serde_json::from_value(value)
            .map_err(|e| TransportError::Browser(format!("unexpected script result: {e}")))
    }

    /// Release the context now rather than on drop.
    pub async fn close(mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.close().await;
        }
    }

    fn context_mut(&mut self) -> Result<&mut (dyn RenderContext + 'static), TransportError> {
        self.ctx.as_deref_mut().ok_or(TransportError::Disconnected)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(ctx.close());
                }
                Err(_) => warn!("no runtime available, browser context leaked until shutdown"),
            }
        }
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(active, "browser session released");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeLauncher;
    use super::*;
    use crate::error::ExtractError;
    use serde_json::json;

    fn manager(eval: Value) -> (SessionManager, Arc<testing::FakeState>) {
        let (launcher, state) = FakeLauncher::returning(eval);
        (
            SessionManager::with_launcher(BrowserConfig::default(), Box::new(launcher)),
            state,
        )
    }

    /// Let spawned cleanup tasks run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_lazy_launch_and_reuse() {
        let (mgr, state) = manager(json!(null));
        assert!(!mgr.is_launched().await);

        let a = mgr.acquire().await.unwrap();
        let b = mgr.acquire().await.unwrap();
        assert!(mgr.is_launched().await);
        assert_eq!(state.launches.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.active_sessions(), 2);

        a.close().await;
        b.close().await;
        assert_eq!(mgr.active_sessions(), 0);
        assert_eq!(state.contexts_closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_relaunches_once_on_disconnect() {
        let (mgr, state) = manager(json!(null));
        mgr.acquire().await.unwrap().close().await;

        state.drop_next_context.store(true, Ordering::SeqCst);
        let session = mgr.acquire().await.expect("relaunch should recover");
        assert_eq!(state.launches.load(Ordering::SeqCst), 2);
        session.close().await;
    }

    #[tokio::test]
    async fn test_stalled_context_creation_times_out() {
        let (launcher, state) = FakeLauncher::returning(json!(null));
        let config = BrowserConfig {
            navigation_timeout_ms: 20,
            ..Default::default()
        };
        let mgr = SessionManager::with_launcher(config, Box::new(launcher));

        state.hang_context.store(true, Ordering::SeqCst);
        let err = mgr.acquire().await.err().expect("acquire should time out");
        assert!(matches!(
            err,
            ExtractError::Transport(TransportError::Timeout(d)) if d == Duration::from_millis(20)
        ));
        assert!(!mgr.is_launched().await);
        assert_eq!(mgr.active_sessions(), 0);

        state.hang_context.store(false, Ordering::SeqCst);
        mgr.acquire().await.unwrap().close().await;
        assert_eq!(state.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_then_acquire_relaunches() {
        let (mgr, state) = manager(json!(null));
        mgr.acquire().await.unwrap().close().await;
        mgr.shutdown().await;
        assert!(!mgr.is_launched().await);

        mgr.acquire().await.unwrap().close().await;
        assert_eq!(state.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        let (mgr, state) = manager(json!(null));
        state.fail_navigation.store(true, Ordering::SeqCst);

        async fn run(mgr: &SessionManager) -> ExtractResult<()> {
            let mut session = mgr.acquire().await?;
            session.navigate("https://example.com").await?;
            session.close().await;
            Ok(())
        }

        assert!(run(&mgr).await.is_err());
        settle().await;
        assert_eq!(mgr.active_sessions(), 0);
        assert_eq!(state.contexts_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_released_when_caller_cancels() {
        let (mgr, state) = manager(json!(null));
        state.hang_navigation.store(true, Ordering::SeqCst);

        let work = async {
            let mut session = mgr.acquire().await.unwrap();
            let _ = session.navigate("https://example.com").await;
        };
        let outcome = tokio::time::timeout(Duration::from_millis(20), work).await;
        assert!(outcome.is_err(), "navigation should still be pending");

        settle().await;
        assert_eq!(mgr.active_sessions(), 0);
        assert_eq!(state.contexts_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluate_deserializes() {
        let (mgr, _state) = manager(json!({"scripts": ["a"], "images": []}));
        let session = mgr.acquire().await.unwrap();

        #[derive(serde::Deserialize)]
        struct Shape {
            scripts: Vec<String>,
        }
        let shape: Shape = session.evaluate("ignored").await.unwrap();
        assert_eq!(shape.scripts, vec!["a"]);

        let wrong: Result<Vec<u32>, _> = session.evaluate("ignored").await;
        assert!(matches!(wrong, Err(TransportError::Browser(_))));
        session.close().await;
    }
}
