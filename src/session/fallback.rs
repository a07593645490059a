//! Live browser context retained for in-page fetches
//!
//! After a successful resolution the page that observed the manifest is kept
//! open so segments that refuse header-spoofed requests can still be fetched
//! with the exact network identity that already succeeded once. The context
//! is released by an idle timer or by the session TTL sweep, whichever
//! happens first. Release is idempotent and may be shared by several sessions.

use crate::{
    Error, Result,
    resolver::automation::{AutomationEngine, AutomationPage},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A page plus the engine that owns it
pub struct FallbackContext {
    page: Arc<dyn AutomationPage>,
    engine: Arc<dyn AutomationEngine>,
    released: AtomicBool,
}

impl std::fmt::Debug for FallbackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackContext")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl FallbackContext {
    /// Wrap a live page and its engine
    pub fn new(page: Arc<dyn AutomationPage>, engine: Arc<dyn AutomationEngine>) -> Arc<Self> {
        Arc::new(Self {
            page,
            engine,
            released: AtomicBool::new(false),
        })
    }

    /// Whether the context has been closed
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Fetch `url` from inside the live page
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if self.is_released() {
            return Err(Error::automation(
                "context_fetch",
                "fallback context already released",
            ));
        }
        self.page.evaluate_fetch(url).await
    }

    /// Close the page and then the engine; later calls are no-ops
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.page.close().await {
            tracing::debug!("Closing fallback page failed: {}", e);
        }
        if let Err(e) = self.engine.close().await {
            tracing::warn!("Closing automation engine failed: {}", e);
        }
        tracing::info!("Fallback browser context released");
    }

    /// Release the context after `idle` elapses
    pub fn schedule_release(self: &Arc<Self>, idle: Duration) {
        let context = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if !context.is_released() {
                tracing::debug!("Fallback context idle for {:?}, releasing", idle);
                context.release().await;
            }
        });
    }
}
