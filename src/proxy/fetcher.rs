//! Multi-strategy upstream fetcher
//!
//! Strategies are tried in order and the first success wins:
//!
//! 1. [`DirectHttp`]: a header-spoofed request that follows redirects itself.
//! 2. [`RetryWithoutHost`]: the same request minus the Host override, only
//!    after (1) was rejected with 401/403 and an override was supplied.
//! 3. [`BrowserContextFetch`]: `fetch()` evaluated inside the live page kept
//!    from resolution, only while that page is still open.
//!
//! Cheap requests go first. The live browser is used only when they fail
//! and only while it is still alive.

use crate::{
    Error, Result,
    config::Settings,
    session::{FallbackContext, StreamSession},
    utils::{redact::describe_cookies, truncate_url},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, Proxy,
    header::{ACCEPT, CONTENT_TYPE, COOKIE, HOST, LOCATION, ORIGIN, REFERER, USER_AGENT},
    redirect::Policy,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything needed to fetch one upstream URL on behalf of a session
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    /// Absolute upstream URL
    pub url: &'a str,
    /// Referer presented upstream; the URL's own origin when absent
    pub referer: Option<&'a str>,
    /// `Cookie` header value
    pub cookie_header: Option<&'a str>,
    /// Host header override
    pub host_override: Option<&'a str>,
    /// Live browser context for the last-resort strategy
    pub fallback: Option<Arc<FallbackContext>>,
}

impl<'a> FetchRequest<'a> {
    /// A bare request with no identity attached
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            referer: None,
            cookie_header: None,
            host_override: None,
            fallback: None,
        }
    }

    /// A request carrying a session's referer, cookies, host override and context
    pub fn for_session(url: &'a str, session: &'a StreamSession) -> Self {
        Self {
            url,
            referer: Some(session.referer()).filter(|r| !r.is_empty()),
            cookie_header: session.cookie_header(),
            host_override: session.host_override(),
            fallback: session.fallback(),
        }
    }

    /// Set the referer
    pub fn with_referer(mut self, referer: &'a str) -> Self {
        self.referer = Some(referer);
        self
    }

    /// Set the cookie header
    pub fn with_cookies(mut self, cookie_header: &'a str) -> Self {
        self.cookie_header = Some(cookie_header);
        self
    }

    /// Set the Host override
    pub fn with_host_override(mut self, host: &'a str) -> Self {
        self.host_override = Some(host);
        self
    }

    /// Attach a live browser context
    pub fn with_fallback(mut self, fallback: Arc<FallbackContext>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// A successfully fetched upstream resource
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Raw body
    pub body: Bytes,
    /// Upstream `Content-Type`, if any
    pub content_type: Option<String>,
}

/// One way of fetching an upstream URL
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs and exhaustion errors
    fn name(&self) -> &'static str;

    /// Whether the strategy should run, given the failures of earlier ones
    fn applies(&self, request: &FetchRequest<'_>, failures: &[Error]) -> bool;

    /// Attempt the fetch
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource>;
}

/// Header-spoofed HTTP client with manual, header-preserving redirects
#[derive(Debug, Clone)]
pub struct DirectHttp {
    client: Client,
    user_agent: String,
    timeout: Duration,
    max_redirects: usize,
}

impl DirectHttp {
    /// Build the client from network settings
    pub fn new(settings: &Settings) -> Result<Self> {
        // redirects are followed by hand so every hop carries the same headers
        let mut client_builder = Client::builder().redirect(Policy::none());

        if let Some(proxy_url) = settings.get_proxy_url() {
            let proxy = Proxy::all(&proxy_url).map_err(|e| {
                Error::config("proxy", &format!("Invalid proxy URL {}: {}", proxy_url, e))
            })?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: settings.network.user_agent.clone(),
            timeout: Duration::from_secs(settings.network.request_timeout),
            max_redirects: settings.network.max_redirects,
        })
    }

    /// Override the whole-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch `url`, ignoring `host_override` when `use_host` is false
    pub async fn get(&self, request: &FetchRequest<'_>, use_host: bool) -> Result<FetchedResource> {
        let host = if use_host { request.host_override } else { None };
        // dropping the in-flight future on timeout closes its connection
        match tokio::time::timeout(self.timeout, self.follow(request, host)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("fetch {}", truncate_url(request.url)),
                self.timeout.as_secs(),
            )),
        }
    }

    async fn follow(
        &self,
        request: &FetchRequest<'_>,
        host: Option<&str>,
    ) -> Result<FetchedResource> {
        let mut current = Url::parse(request.url)?;
        let referer = match request.referer {
            Some(referer) => referer.to_string(),
            None => format!("{}/", current.origin().ascii_serialization()),
        };
        let origin = Url::parse(&referer)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| referer.trim_end_matches('/').to_string());

        for _ in 0..=self.max_redirects {
            let mut builder = self
                .client
                .get(current.as_str())
                .header(USER_AGENT, &self.user_agent)
                .header(ACCEPT, "*/*")
                .header(REFERER, &referer)
                .header(ORIGIN, &origin);
            if let Some(cookies) = request.cookie_header {
                builder = builder.header(COOKIE, cookies);
            }
            if let Some(host) = host {
                builder = builder.header(HOST, host);
            }

            let response = builder.send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        Error::upstream_status(status.as_u16(), truncate_url(current.as_str()))
                    })?;
                let next = current.join(location)?;
                tracing::debug!(
                    "Redirect {} -> {}",
                    truncate_url(current.as_str()),
                    truncate_url(next.as_str())
                );
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(Error::upstream_status(
                    status.as_u16(),
                    truncate_url(current.as_str()),
                ));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;

            return Ok(FetchedResource { body, content_type });
        }

        Err(Error::TooManyRedirects {
            url: truncate_url(request.url),
            hops: self.max_redirects,
        })
    }
}

#[async_trait]
impl FetchStrategy for DirectHttp {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn applies(&self, _request: &FetchRequest<'_>, _failures: &[Error]) -> bool {
        true
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource> {
        self.get(request, true).await
    }
}

/// Repeats the direct request without the Host override after a 401/403
#[derive(Debug, Clone)]
pub struct RetryWithoutHost {
    direct: Arc<DirectHttp>,
}

impl RetryWithoutHost {
    pub fn new(direct: Arc<DirectHttp>) -> Self {
        Self { direct }
    }
}

#[async_trait]
impl FetchStrategy for RetryWithoutHost {
    fn name(&self) -> &'static str {
        "direct_without_host"
    }

    fn applies(&self, request: &FetchRequest<'_>, failures: &[Error]) -> bool {
        request.host_override.is_some()
            && failures
                .first()
                .is_some_and(|e| e.is_authorization_failure())
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource> {
        self.direct.get(request, false).await
    }
}

/// Fetches through the live page retained from resolution
#[derive(Debug, Clone, Default)]
pub struct BrowserContextFetch;

#[async_trait]
impl FetchStrategy for BrowserContextFetch {
    fn name(&self) -> &'static str {
        "browser_context"
    }

    fn applies(&self, request: &FetchRequest<'_>, _failures: &[Error]) -> bool {
        request
            .fallback
            .as_ref()
            .is_some_and(|ctx| !ctx.is_released())
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource> {
        let context = request
            .fallback
            .as_ref()
            .ok_or_else(|| Error::automation("context_fetch", "no live context attached"))?;
        let body = context.fetch(request.url).await?;
        Ok(FetchedResource {
            body: Bytes::from(body),
            content_type: None,
        })
    }
}

/// Ordered cascade of fetch strategies
pub struct MultiStrategyFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl std::fmt::Debug for MultiStrategyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("MultiStrategyFetcher")
            .field("strategies", &names)
            .finish()
    }
}

impl MultiStrategyFetcher {
    /// The standard cascade: direct, retry without Host, browser context
    pub fn new(settings: &Settings) -> Result<Self> {
        let direct = Arc::new(DirectHttp::new(settings)?);
        Ok(Self::with_strategies(vec![
            Box::new(DirectHttp::clone(&direct)),
            Box::new(RetryWithoutHost::new(direct)),
            Box::new(BrowserContextFetch),
        ]))
    }

    /// A cascade built from explicit strategies
    pub fn with_strategies(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Names of the configured strategies, in order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the cascade; fails with [`Error::UpstreamExhausted`] when nothing applies or succeeds
    pub async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource> {
        let mut failures: Vec<Error> = Vec::new();
        let mut attempts: Vec<String> = Vec::new();

        tracing::debug!(
            "Fetching {} ({})",
            truncate_url(request.url),
            describe_cookies(request.cookie_header)
        );

        for strategy in &self.strategies {
            if !strategy.applies(request, &failures) {
                continue;
            }

            match strategy.fetch(request).await {
                Ok(resource) => {
                    if !failures.is_empty() {
                        tracing::info!(
                            "Fetched {} via {} after {} failed attempt(s)",
                            truncate_url(request.url),
                            strategy.name(),
                            failures.len()
                        );
                    }
                    return Ok(resource);
                }
                Err(e) => {
                    tracing::warn!(
                        "Strategy {} failed for {}: {}",
                        strategy.name(),
                        truncate_url(request.url),
                        e
                    );
                    attempts.push(format!("{}: {}", strategy.name(), e));
                    failures.push(e);
                }
            }
        }

        Err(Error::UpstreamExhausted {
            url: truncate_url(request.url),
            attempts,
        })
    }
}
