//! Token-addressed HLS proxy
//!
//! Turns `/hls/{token}.{ext}` requests into upstream fetches made with the
//! session's identity. Manifests are cached raw and rewritten on every
//! response; segments are passed through untouched.

use super::{
    fetcher::{FetchRequest, MultiStrategyFetcher},
    rewriter::{self, MANIFEST_CONTENT_TYPE, ResourceKind, SEGMENT_CONTENT_TYPE},
    token,
};
use crate::{
    Result,
    session::{SessionStore, store::short_id},
    utils::truncate_url,
};
use bytes::Bytes;
use std::sync::Arc;

/// Body handed back to the HTTP layer
#[derive(Debug, Clone)]
pub enum ProxyResponse {
    /// Rewritten playlist text
    Manifest(String),
    /// Raw segment bytes and their content type
    Segment { body: Bytes, content_type: String },
}

impl ProxyResponse {
    /// `Content-Type` to send downstream
    pub fn content_type(&self) -> &str {
        match self {
            ProxyResponse::Manifest(_) => MANIFEST_CONTENT_TYPE,
            ProxyResponse::Segment { content_type, .. } => content_type,
        }
    }

    /// Consume into the raw body
    pub fn into_body(self) -> Bytes {
        match self {
            ProxyResponse::Manifest(text) => Bytes::from(text),
            ProxyResponse::Segment { body, .. } => body,
        }
    }
}

/// Serves proxied manifests and segments for live sessions
#[derive(Debug, Clone)]
pub struct HlsProxy {
    store: Arc<SessionStore>,
    fetcher: Arc<MultiStrategyFetcher>,
}

impl HlsProxy {
    pub fn new(store: Arc<SessionStore>, fetcher: Arc<MultiStrategyFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Session store backing this proxy
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Resolve one token into a downstream response
    ///
    /// `proxy_base` is the externally visible origin used for rewritten URLs.
    pub async fn serve(
        &self,
        token: &str,
        kind: ResourceKind,
        proxy_base: &str,
    ) -> Result<ProxyResponse> {
        let (session_id, url) = token::decode(token)?;
        let session = self.store.get(&session_id).await?;

        if kind == ResourceKind::Manifest
            && let Some(cached) = session.cached_manifest(&url).await
        {
            tracing::debug!(
                "[{}] Manifest cache hit: {}",
                short_id(&session_id),
                truncate_url(&url)
            );
            return Ok(ProxyResponse::Manifest(rewriter::rewrite(
                &cached,
                &url,
                &session_id,
                proxy_base,
            )));
        }

        let request = FetchRequest::for_session(&url, &session);
        let resource = self.fetcher.fetch(&request).await?;

        match kind {
            ResourceKind::Manifest => {
                let text = String::from_utf8_lossy(&resource.body).into_owned();
                let rewritten = rewriter::rewrite(&text, &url, &session_id, proxy_base);
                session.put_manifest(&url, text).await;
                tracing::debug!(
                    "[{}] Manifest fetched and cached: {}",
                    short_id(&session_id),
                    truncate_url(&url)
                );
                Ok(ProxyResponse::Manifest(rewritten))
            }
            ResourceKind::Segment => Ok(ProxyResponse::Segment {
                body: resource.body,
                content_type: resource
                    .content_type
                    .unwrap_or_else(|| SEGMENT_CONTENT_TYPE.to_string()),
            }),
        }
    }
}
