//! Resolution pipeline
//!
//! Walks the configured sources in priority order. Each source is opened in a
//! fresh page with non-essential resource types blocked, and the page's
//! responses are watched for manifest URLs. When the top-level page yields
//! nothing, its first iframes are probed the same way. The first source that
//! produces a manifest wins; its cookies are harvested and nested variants
//! are pre-fetched inside the still-open page.

use super::automation::{
    AutomationEngine, AutomationPage, BrowserCookie, ObservedResponse, ResourceType,
    ResponseEvents,
};
use super::sources;
use crate::{Error, Result, config::ResolverSettings, proxy::rewriter, utils::truncate_url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Query parameter some hosts use to carry the real upstream identity
pub const HEADERS_PARAM: &str = "headers";

/// A manifest discovered during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    /// Manifest URL with the query string removed
    pub url: String,
    /// Referer to present upstream
    pub referer: String,
    /// Host header override, when the page hinted one
    pub host: Option<String>,
    /// Body captured while the page loaded it
    pub body: Option<String>,
    /// Pre-fetched nested variant manifests, keyed by absolute URL
    pub variants: HashMap<String, String>,
}

impl ResolvedStream {
    /// Every manifest body known for this stream, keyed by URL
    pub fn manifests(&self) -> HashMap<String, String> {
        let mut manifests = self.variants.clone();
        if let Some(body) = &self.body {
            manifests.insert(self.url.clone(), body.clone());
        }
        manifests
    }
}

/// Identity hints embedded in a manifest URL
#[derive(Debug, Default, Deserialize)]
struct HeaderHints {
    referer: Option<String>,
    origin: Option<String>,
    host: Option<String>,
}

/// Strip the query from an observed manifest URL and recover its identity hints
///
/// The `headers` parameter is URL-encoded JSON such as
/// `{"referer":"https://up.example/"}`. An origin hint wins over a referer
/// hint; with neither, `default_referer` is used. Malformed hints are ignored.
pub fn parse_manifest_url(raw: &str, default_referer: &str) -> ResolvedStream {
    let (url, hints) = match Url::parse(raw) {
        Ok(parsed) => {
            let hints = parsed
                .query_pairs()
                .find(|(key, _)| key == HEADERS_PARAM)
                .and_then(|(_, value)| serde_json::from_str::<HeaderHints>(&value).ok())
                .unwrap_or_default();
            let mut stripped = parsed;
            stripped.set_query(None);
            stripped.set_fragment(None);
            (stripped.to_string(), hints)
        }
        Err(_) => {
            let stripped = raw.split(['?', '#']).next().unwrap_or(raw);
            (stripped.to_string(), HeaderHints::default())
        }
    };

    let referer = hints
        .origin
        .or(hints.referer)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default_referer.to_string());

    ResolvedStream {
        url,
        referer,
        host: hints.host.filter(|h| !h.is_empty()),
        body: None,
        variants: HashMap::new(),
    }
}

/// Wait for the first manifest response, then a grace window for its siblings
///
/// Returns as soon as the channel closes. Duplicate URLs (after stripping the
/// query) are reported once.
pub async fn wait_for_manifests(
    events: &mut ResponseEvents,
    marker: &str,
    wait: Duration,
    grace: Duration,
) -> Vec<ObservedResponse> {
    let mut found: Vec<ObservedResponse> = Vec::new();

    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(response) if response.url.contains(marker) => {
                    push(response, &mut found);
                    break;
                }
                Some(_) => {}
                None => return found,
            },
            _ = &mut deadline => return found,
        }
    }

    let grace_window = tokio::time::sleep(grace);
    tokio::pin!(grace_window);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(response) if response.url.contains(marker) => push(response, &mut found),
                Some(_) => {}
                None => break,
            },
            _ = &mut grace_window => break,
        }
    }

    found
}

/// Manifest responses already queued on the channel, without waiting
pub fn drain_queued(events: &mut ResponseEvents, marker: &str) -> Vec<ObservedResponse> {
    let mut found = Vec::new();
    while let Ok(response) = events.try_recv() {
        if response.url.contains(marker) {
            push(response, &mut found);
        }
    }
    found
}

fn push(response: ObservedResponse, found: &mut Vec<ObservedResponse>) {
    let key = strip_query(&response.url);
    if !found.iter().any(|f| strip_query(&f.url) == key) {
        tracing::info!("Observed manifest: {}", truncate_url(&response.url));
        found.push(response);
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Result of one pipeline run
pub struct PipelineOutcome {
    /// Discovered manifests, in observation order
    pub streams: Vec<ResolvedStream>,
    /// Cookies held by the engine after the successful attempt
    pub cookies: Vec<BrowserCookie>,
    /// The successful page, left open when context retention is enabled
    pub page: Option<Arc<dyn AutomationPage>>,
}

impl std::fmt::Debug for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOutcome")
            .field("streams", &self.streams)
            .field("cookies", &self.cookies.len())
            .field("page", &self.page.is_some())
            .finish()
    }
}

impl PipelineOutcome {
    fn empty() -> Self {
        Self {
            streams: Vec::new(),
            cookies: Vec::new(),
            page: None,
        }
    }
}

/// The page that produced manifests plus what it produced
struct Attempt {
    page: Arc<dyn AutomationPage>,
    streams: Vec<ResolvedStream>,
}

/// Drives an automation engine across sources and iframes
#[derive(Debug, Clone)]
pub struct ResolutionPipeline {
    settings: ResolverSettings,
    blocked: Vec<ResourceType>,
}

impl ResolutionPipeline {
    pub fn new(settings: ResolverSettings) -> Self {
        let blocked = settings
            .blocked_resource_types
            .iter()
            .filter_map(|name| {
                let parsed = ResourceType::from_name(name);
                if parsed.is_none() {
                    tracing::warn!("Ignoring unknown resource type: {}", name);
                }
                parsed
            })
            .collect();
        Self { settings, blocked }
    }

    /// Resolver settings in use
    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Try every source in order until one yields a manifest
    ///
    /// Failures are logged and never returned; an unproductive run yields an
    /// empty outcome. The engine is left running for the caller to close.
    pub async fn run(&self, engine: &dyn AutomationEngine, content_id: &str) -> PipelineOutcome {
        let mut winner = None;

        for source_url in sources::expand_all(&self.settings.sources, content_id) {
            tracing::info!("Trying source: {}", truncate_url(&source_url));
            match self.try_source(engine, &source_url).await {
                Ok(Some(attempt)) => {
                    winner = Some(attempt);
                    break;
                }
                Ok(None) => {
                    tracing::info!("No manifest from {}", truncate_url(&source_url));
                }
                Err(e) => {
                    tracing::warn!(
                        "Source {} failed: {}",
                        truncate_url(&source_url),
                        crate::error::format_error_for_logging(&e)
                    );
                }
            }
        }

        let Some(Attempt { page, mut streams }) = winner else {
            tracing::warn!("No source produced a manifest for {}", content_id);
            return PipelineOutcome::empty();
        };

        let cookies = match engine.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!("Cookie harvest failed: {}", e);
                Vec::new()
            }
        };
        tracing::debug!("Harvested {} cookie(s)", cookies.len());

        for stream in &mut streams {
            self.prefetch_variants(page.as_ref(), stream).await;
        }

        let page = if self.settings.keep_fallback_context {
            Some(page)
        } else {
            close_page(page.as_ref()).await;
            None
        };

        PipelineOutcome {
            streams,
            cookies,
            page,
        }
    }

    async fn try_source(
        &self,
        engine: &dyn AutomationEngine,
        source_url: &str,
    ) -> Result<Option<Attempt>> {
        let page = engine.new_page().await?;
        let nav_timeout = Duration::from_secs(self.settings.navigation_timeout_secs);

        match self.probe(page.as_ref(), source_url, nav_timeout).await {
            Ok(streams) if !streams.is_empty() => return Ok(Some(Attempt { page, streams })),
            Ok(_) => {}
            Err(e) => {
                close_page(page.as_ref()).await;
                return Err(e);
            }
        }

        let iframes: Vec<String> = match page.iframe_sources().await {
            Ok(sources) => sources
                .into_iter()
                .filter(|src| src.starts_with("http"))
                .take(self.settings.max_iframes)
                .collect(),
            Err(e) => {
                tracing::debug!("Iframe enumeration failed: {}", e);
                Vec::new()
            }
        };
        close_page(page.as_ref()).await;

        let iframe_timeout = Duration::from_secs(self.settings.iframe_navigation_timeout_secs);
        for frame_url in iframes {
            tracing::info!("Probing iframe: {}", truncate_url(&frame_url));
            let frame_page = engine.new_page().await?;
            match self
                .probe(frame_page.as_ref(), &frame_url, iframe_timeout)
                .await
            {
                Ok(streams) if !streams.is_empty() => {
                    return Ok(Some(Attempt {
                        page: frame_page,
                        streams,
                    }));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Iframe {} failed: {}", truncate_url(&frame_url), e),
            }
            close_page(frame_page.as_ref()).await;
        }

        Ok(None)
    }

    /// Navigate one page and collect the manifests it loads
    async fn probe(
        &self,
        page: &dyn AutomationPage,
        url: &str,
        nav_timeout: Duration,
    ) -> Result<Vec<ResolvedStream>> {
        page.block_resource_types(&self.blocked).await?;
        let mut events = page.observe_responses().await?;

        let navigation = match tokio::time::timeout(nav_timeout, page.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("navigate {}", truncate_url(url)),
                nav_timeout.as_secs(),
            )),
        };

        // manifests requested before a failed navigation still count
        let observed = match navigation {
            Ok(()) => {
                wait_for_manifests(
                    &mut events,
                    &self.settings.manifest_marker,
                    Duration::from_secs(self.settings.manifest_wait_secs),
                    Duration::from_secs(self.settings.grace_window_secs),
                )
                .await
            }
            Err(e) => {
                let queued = drain_queued(&mut events, &self.settings.manifest_marker);
                if queued.is_empty() {
                    return Err(e);
                }
                tracing::info!(
                    "Navigation of {} did not complete ({}); keeping {} observed manifest(s)",
                    truncate_url(url),
                    e,
                    queued.len()
                );
                queued
            }
        };

        let mut streams = Vec::with_capacity(observed.len());
        for response in observed {
            let mut stream = parse_manifest_url(&response.url, &self.settings.default_referer);
            match page.response_body(&response.request_id).await {
                Ok(body) if !body.is_empty() => stream.body = Some(body),
                Ok(_) => {}
                Err(e) => tracing::debug!(
                    "Body capture failed for {}: {}",
                    truncate_url(&stream.url),
                    e
                ),
            }
            streams.push(stream);
        }

        Ok(streams)
    }

    /// Fetch nested variants of a captured master manifest inside the live page
    async fn prefetch_variants(&self, page: &dyn AutomationPage, stream: &mut ResolvedStream) {
        let Some(body) = &stream.body else {
            return;
        };
        let fetch_timeout = Duration::from_secs(self.settings.manifest_wait_secs);

        for variant in rewriter::extract_variants(body, &stream.url) {
            match tokio::time::timeout(fetch_timeout, page.evaluate_fetch(&variant)).await {
                Ok(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    tracing::debug!("Pre-fetched variant {}", truncate_url(&variant));
                    stream.variants.insert(variant, text);
                }
                Ok(Err(e)) => {
                    tracing::debug!("Variant pre-fetch failed for {}: {}", truncate_url(&variant), e)
                }
                Err(_) => tracing::debug!("Variant pre-fetch timed out: {}", truncate_url(&variant)),
            }
        }
    }
}

async fn close_page(page: &dyn AutomationPage) {
    if let Err(e) = page.close().await {
        tracing::debug!("Closing page failed: {}", e);
    }
}
