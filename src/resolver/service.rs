//! Resolution service
//!
//! Owns the engine lifecycle around one pipeline run and turns discovered
//! streams into sessions and proxy URLs.

use super::{
    automation::{AutomationLauncher, BrowserCookie, cookie_header_for},
    pipeline::{ResolutionPipeline, ResolvedStream},
};
use crate::{
    config::{SessionPolicy, Settings},
    proxy::rewriter,
    session::{FallbackContext, SessionContext, SessionStore, store::short_id},
    utils::redact::describe_cookies,
};
use std::sync::Arc;
use std::time::Duration;

/// Streams discovered by one resolution plus the credentials to replay them
#[derive(Debug, Default)]
pub struct Resolution {
    pub streams: Vec<ResolvedStream>,
    pub cookies: Vec<BrowserCookie>,
    /// Live page and engine kept for in-browser fetches
    pub fallback: Option<Arc<FallbackContext>>,
}

impl Resolution {
    /// Close the retained browser context, if any
    pub async fn release(&self) {
        if let Some(fallback) = &self.fallback {
            fallback.release().await;
        }
    }
}

/// Resolves content ids into proxied stream URLs
#[derive(Clone)]
pub struct StreamResolver {
    pipeline: ResolutionPipeline,
    launcher: Option<Arc<dyn AutomationLauncher>>,
    store: Arc<SessionStore>,
    policy: SessionPolicy,
    fallback_idle: Duration,
}

impl std::fmt::Debug for StreamResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResolver")
            .field("pipeline", &self.pipeline)
            .field("launcher", &self.launcher.is_some())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StreamResolver {
    pub fn new(
        settings: &Settings,
        store: Arc<SessionStore>,
        launcher: Option<Arc<dyn AutomationLauncher>>,
    ) -> Self {
        Self {
            pipeline: ResolutionPipeline::new(settings.resolver.clone()),
            launcher,
            store,
            policy: settings.resolver.session_policy,
            fallback_idle: Duration::from_secs(settings.session.fallback_idle_secs),
        }
    }

    /// Whether an automation engine is available
    pub fn has_launcher(&self) -> bool {
        self.launcher.is_some()
    }

    /// Run the pipeline once with a fresh engine
    ///
    /// Never fails: a missing launcher, a launch failure or an unproductive
    /// run all produce an empty resolution. The engine is closed unless its
    /// page was retained, in which case it lives on inside `fallback`.
    pub async fn resolve(&self, content_id: &str) -> Resolution {
        let Some(launcher) = &self.launcher else {
            tracing::warn!("No automation engine configured; cannot resolve {}", content_id);
            return Resolution::default();
        };

        let engine = match launcher.launch().await {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(
                    "Automation engine failed to start: {}",
                    crate::error::format_error_for_logging(&e)
                );
                return Resolution::default();
            }
        };

        let outcome = self.pipeline.run(engine.as_ref(), content_id).await;

        let fallback = match outcome.page {
            Some(page) => Some(FallbackContext::new(page, engine)),
            None => {
                if let Err(e) = engine.close().await {
                    tracing::warn!("Closing automation engine failed: {}", e);
                }
                None
            }
        };

        Resolution {
            streams: outcome.streams,
            cookies: outcome.cookies,
            fallback,
        }
    }

    /// Resolve `content_id` and open one session per selected stream
    ///
    /// Returns proxy manifest URLs rooted at `proxy_base`, in discovery order.
    pub async fn resolve_to_proxy_urls(&self, content_id: &str, proxy_base: &str) -> Vec<String> {
        let resolution = self.resolve(content_id).await;

        let selected: Vec<&ResolvedStream> = match self.policy {
            SessionPolicy::All => resolution.streams.iter().collect(),
            SessionPolicy::Primary => resolution.streams.iter().take(1).collect(),
        };

        if selected.is_empty() {
            resolution.release().await;
            return Vec::new();
        }

        let mut urls = Vec::with_capacity(selected.len());
        for stream in selected {
            let cookie_header = cookie_header_for(&resolution.cookies, &stream.url);
            tracing::debug!(
                "Session cookies for {}: {}",
                crate::utils::truncate_url(&stream.url),
                describe_cookies(cookie_header.as_deref())
            );

            let session_id = self
                .store
                .create(SessionContext {
                    referer: stream.referer.clone(),
                    cookie_header,
                    host_override: stream.host.clone(),
                    manifests: stream.manifests(),
                    fallback: resolution.fallback.clone(),
                })
                .await;
            tracing::info!(
                "[{}] Session opened for {}",
                short_id(&session_id),
                crate::utils::truncate_url(&stream.url)
            );

            urls.push(rewriter::proxy_url(proxy_base, &session_id, &stream.url));
        }

        if let Some(fallback) = &resolution.fallback {
            fallback.schedule_release(self.fallback_idle);
        }

        urls
    }
}
