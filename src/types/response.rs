//! Response type definitions

use crate::resolver::ResolvedStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One playable stream handed to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Proxied manifest URL
    pub url: String,
    /// Headers the player must send; always empty, the proxy carries them
    pub headers: HashMap<String, String>,
}

impl StreamEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }
}

/// Body of `GET /?id=`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamEntry>,
}

impl StreamsResponse {
    /// Wrap proxy URLs
    pub fn from_urls(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            streams: urls.into_iter().map(StreamEntry::new).collect(),
        }
    }
}

/// Body of `GET /` without an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageResponse {
    pub status: String,
    pub usage: String,
}

impl Default for UsageResponse {
    fn default() -> Self {
        Self {
            status: "running".to_string(),
            usage: "/?id=<contentId>".to_string(),
        }
    }
}

/// Upstream manifest printed by one-shot resolve mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub url: String,
    pub referer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Whether the manifest body was captured during resolution
    pub captured: bool,
    /// Nested variant manifests pre-fetched in the browser
    pub variants: Vec<String>,
}

impl From<&ResolvedStream> for StreamSummary {
    fn from(stream: &ResolvedStream) -> Self {
        let mut variants: Vec<String> = stream.variants.keys().cloned().collect();
        variants.sort();
        Self {
            url: stream.url.clone(),
            referer: stream.referer.clone(),
            host: stream.host.clone(),
            captured: stream.body.is_some(),
            variants,
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Server version
    pub version: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Sessions currently held
    pub active_sessions: usize,
}

impl HealthResponse {
    pub fn new(uptime_secs: u64, active_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            version: crate::utils::version::get_version().to_string(),
            uptime_secs,
            active_sessions,
        }
    }
}
