//! Browser automation capability
//!
//! The resolver never talks to a browser directly. It drives these traits,
//! which a concrete engine (see the `chromium` feature) or a scripted test
//! double implements. Responses observed by a page are delivered on an
//! explicit channel instead of through callbacks.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Resource classes a page request can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Script,
    Xhr,
    Fetch,
    Image,
    Font,
    Stylesheet,
    Media,
    Other,
}

impl ResourceType {
    /// Parse the lowercase names used in configuration
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "document" => Some(Self::Document),
            "script" => Some(Self::Script),
            "xhr" => Some(Self::Xhr),
            "fetch" => Some(Self::Fetch),
            "image" => Some(Self::Image),
            "font" => Some(Self::Font),
            "stylesheet" => Some(Self::Stylesheet),
            "media" => Some(Self::Media),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A network response seen by a page
#[derive(Debug, Clone)]
pub struct ObservedResponse {
    /// Engine-specific id used to fetch the body later
    pub request_id: String,
    /// Full response URL including query string
    pub url: String,
    /// HTTP status
    pub status: u16,
    /// Response headers, lowercase names
    pub headers: HashMap<String, String>,
}

/// A cookie held by the engine, including `HttpOnly` ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    /// Cookie domain, possibly with a leading dot
    pub domain: String,
}

/// Stream of responses observed by one page
pub type ResponseEvents = mpsc::UnboundedReceiver<ObservedResponse>;

/// One tab of the automation engine
#[async_trait]
pub trait AutomationPage: Send + Sync {
    /// Abort outgoing requests of the given resource types
    async fn block_resource_types(&self, types: &[ResourceType]) -> Result<()>;

    /// Start delivering observed responses; call before navigating
    async fn observe_responses(&self) -> Result<ResponseEvents>;

    /// Navigate and wait for initial content (DOMContentLoaded), not full load
    async fn navigate(&self, url: &str) -> Result<()>;

    /// `src` attributes of the iframes currently in the document
    async fn iframe_sources(&self) -> Result<Vec<String>>;

    /// Body of a previously observed response, as text
    async fn response_body(&self, request_id: &str) -> Result<String>;

    /// Run `fetch(url)` inside the page and return the raw bytes
    async fn evaluate_fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Close the page
    async fn close(&self) -> Result<()>;
}

/// A running automation engine shared by all attempts of one resolution
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Open a blank page
    async fn new_page(&self) -> Result<Arc<dyn AutomationPage>>;

    /// Every cookie the engine holds, read through its native cookie API
    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;

    /// Shut the engine down
    async fn close(&self) -> Result<()>;
}

/// Starts a fresh engine per resolution call
#[async_trait]
pub trait AutomationLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn AutomationEngine>>;
}

/// Whether `domain` (as stored on a cookie) covers `host`
pub fn cookie_domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Build a `Cookie` header from the cookies applicable to `url`
pub fn cookie_header_for(cookies: &[BrowserCookie], url: &str) -> Option<String> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_string();
    let pairs: Vec<String> = cookies
        .iter()
        .filter(|c| cookie_domain_matches(&c.domain, &host))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
