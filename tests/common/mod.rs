//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests, most
//! importantly a scripted automation engine standing in for a browser.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stream_proxy::{
    Error, Result,
    config::Settings,
    resolver::automation::{
        AutomationEngine, AutomationLauncher, AutomationPage, BrowserCookie, ObservedResponse,
        ResourceType, ResponseEvents,
    },
};
use tokio::sync::mpsc;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What a scripted URL does when navigated to
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    /// Responses emitted during navigation: (url, body)
    pub responses: Vec<(String, String)>,
    /// Iframe `src` attributes present after load
    pub iframes: Vec<String>,
    /// Navigation fails outright
    pub fails: bool,
    /// Navigation never completes
    pub hangs: bool,
}

impl PageScript {
    pub fn emitting(url: &str, body: &str) -> Self {
        Self {
            responses: vec![(url.to_string(), body.to_string())],
            ..Default::default()
        }
    }

    pub fn with_iframes(iframes: &[&str]) -> Self {
        Self {
            iframes: iframes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Default::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hangs: true,
            ..Default::default()
        }
    }

    /// Emit the scripted responses, then never finish loading
    pub fn then_hang(mut self) -> Self {
        self.hangs = true;
        self
    }

    /// Emit the scripted responses, then fail the navigation
    pub fn then_fail(mut self) -> Self {
        self.fails = true;
        self
    }
}

/// A scripted web: navigable pages plus URLs reachable by in-page fetch
#[derive(Debug, Default)]
pub struct FakeWeb {
    pub pages: HashMap<String, PageScript>,
    pub fetchable: HashMap<String, Vec<u8>>,
    pub cookies: Vec<BrowserCookie>,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, script: PageScript) -> Self {
        self.pages.insert(url.to_string(), script);
        self
    }

    pub fn fetchable(mut self, url: &str, body: &[u8]) -> Self {
        self.fetchable.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn cookie(mut self, name: &str, value: &str, domain: &str) -> Self {
        self.cookies.push(BrowserCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
        });
        self
    }
}

/// One scripted tab
pub struct FakePage {
    web: Arc<FakeWeb>,
    sender: Mutex<Option<mpsc::UnboundedSender<ObservedResponse>>>,
    bodies: Mutex<HashMap<String, String>>,
    pub navigated: Mutex<Vec<String>>,
    pub blocked: Mutex<Vec<ResourceType>>,
    pub fetches: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakePage {
    fn new(web: Arc<FakeWeb>) -> Self {
        Self {
            web,
            sender: Mutex::new(None),
            bodies: Mutex::new(HashMap::new()),
            navigated: Mutex::new(Vec::new()),
            blocked: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn script_for(&self) -> Option<PageScript> {
        let navigated = self.navigated.lock().unwrap();
        navigated
            .last()
            .and_then(|url| self.web.pages.get(url).cloned())
    }
}

#[async_trait]
impl AutomationPage for FakePage {
    async fn block_resource_types(&self, types: &[ResourceType]) -> Result<()> {
        self.blocked.lock().unwrap().extend_from_slice(types);
        Ok(())
    }

    async fn observe_responses(&self) -> Result<ResponseEvents> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigated.lock().unwrap().push(url.to_string());
        let script = self.web.pages.get(url).cloned().unwrap_or_default();

        // responses arrive while the page is still loading
        let sender = self.sender.lock().unwrap().clone();
        if let Some(sender) = sender {
            for (response_url, body) in &script.responses {
                self.bodies
                    .lock()
                    .unwrap()
                    .insert(response_url.clone(), body.clone());
                let _ = sender.send(ObservedResponse {
                    request_id: response_url.clone(),
                    url: response_url.clone(),
                    status: 200,
                    headers: HashMap::new(),
                });
            }
        }

        if script.hangs {
            std::future::pending::<()>().await;
        }
        if script.fails {
            return Err(Error::automation("navigate", "net::ERR_NAME_NOT_RESOLVED"));
        }

        // the sender is dropped afterwards so observers see the page go quiet
        self.sender.lock().unwrap().take();
        Ok(())
    }

    async fn iframe_sources(&self) -> Result<Vec<String>> {
        Ok(self.script_for().map(|s| s.iframes).unwrap_or_default())
    }

    async fn response_body(&self, request_id: &str) -> Result<String> {
        self.bodies
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .ok_or_else(|| Error::automation("response_body", "no body"))
    }

    async fn evaluate_fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.web
            .fetchable
            .get(url)
            .cloned()
            .ok_or_else(|| Error::automation("context_fetch", "TypeError: Failed to fetch"))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A scripted engine that records every page it opens
pub struct FakeEngine {
    web: Arc<FakeWeb>,
    pub pages: Mutex<Vec<Arc<FakePage>>>,
    pub closed: AtomicBool,
}

impl FakeEngine {
    pub fn new(web: Arc<FakeWeb>) -> Self {
        Self {
            web,
            pages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// URLs navigated across all pages, in order
    pub fn navigations(&self) -> Vec<String> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.navigated.lock().unwrap().clone())
            .collect()
    }

    /// Pages still open
    pub fn open_pages(&self) -> usize {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.is_closed())
            .count()
    }
}

#[async_trait]
impl AutomationEngine for FakeEngine {
    async fn new_page(&self) -> Result<Arc<dyn AutomationPage>> {
        let page = Arc::new(FakePage::new(Arc::clone(&self.web)));
        self.pages.lock().unwrap().push(Arc::clone(&page));
        Ok(page)
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        Ok(self.web.cookies.clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher handing out fake engines over one scripted web
pub struct FakeLauncher {
    web: Arc<FakeWeb>,
    pub engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeLauncher {
    pub fn new(web: FakeWeb) -> Arc<Self> {
        Arc::new(Self {
            web: Arc::new(web),
            engines: Mutex::new(Vec::new()),
        })
    }

    /// The most recently launched engine
    pub fn last_engine(&self) -> Arc<FakeEngine> {
        self.engines
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no engine launched")
    }
}

#[async_trait]
impl AutomationLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn AutomationEngine>> {
        let engine = Arc::new(FakeEngine::new(Arc::clone(&self.web)));
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

/// Test configuration factory
pub struct TestConfig;

impl TestConfig {
    /// Defaults with a single scripted source
    pub fn minimal() -> Settings {
        let mut settings = Settings::default();
        settings.server.port = 0;
        settings.logging.level = "debug".to_string();
        settings.network.request_timeout = 5;
        settings.resolver.sources = vec!["https://embed.example/movie/{id}".to_string()];
        settings
    }

    /// Defaults with the given source templates
    pub fn with_sources(sources: &[&str]) -> Settings {
        let mut settings = Self::minimal();
        settings.resolver.sources = sources.iter().map(|s| s.to_string()).collect();
        settings
    }
}

/// Sample manifests
pub struct MockData;

impl MockData {
    /// The manifest URL used by the end-to-end properties
    pub const HINTED_MANIFEST: &'static str = "https://cdn.example/path/index.m3u8?headers=%7B%22referer%22%3A%22https%3A%2F%2Fup.example%2F%22%7D";

    pub fn master_manifest() -> &'static str {
        "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n360/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n720/index.m3u8\n"
    }

    pub fn media_manifest() -> &'static str {
        "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg-1.ts\n#EXTINF:6.0,\nseg-2.ts\n#EXT-X-ENDLIST\n"
    }
}

/// Mock server factory
pub struct MockServerFactory;

impl MockServerFactory {
    /// Create new mock server
    pub async fn new() -> MockServer {
        MockServer::start().await
    }

    /// Serve a media manifest and its two segments under `/live/`
    pub async fn setup_stream(server: &MockServer) {
        Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/live/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/vnd.apple.mpegurl")
                    .set_body_string(MockData::media_manifest()),
            )
            .mount(server)
            .await;

        Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path_regex(r"^/live/seg-\d+\.ts$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/MP2T")
                    .set_body_bytes(b"\x47\x40\x00\x10".to_vec()),
            )
            .mount(server)
            .await;
    }
}

/// Test utilities
pub struct TestUtils;

impl TestUtils {
    /// Initialize test logging
    pub fn init_logger() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}
