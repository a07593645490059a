//! In-memory session store
//!
//! A [`StreamSession`] carries everything needed to re-fetch one resolved
//! stream: referer, harvested cookies, an optional Host override, the
//! manifests already seen, and optionally a live browser context. Sessions
//! live for a fixed TTL counted from creation and are swept on every
//! `create`. Nothing is persisted.
//!
//! ```rust
//! use std::time::Duration;
//! use stream_proxy::session::{SessionContext, SessionStore};
//!
//! # tokio_test::block_on(async {
//! let store = SessionStore::new(Duration::from_secs(1800));
//! let id = store
//!     .create(SessionContext {
//!         referer: "https://up.example/".to_string(),
//!         ..Default::default()
//!     })
//!     .await;
//!
//! let session = store.get(&id).await?;
//! assert_eq!(session.referer(), "https://up.example/");
//! # Ok::<(), stream_proxy::Error>(())
//! # });
//! ```

use super::fallback::FallbackContext;
use crate::{Error, Result};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Random bytes in a session id (hex encoded, so 32 characters)
pub const SESSION_ID_BYTES: usize = 16;

/// Input used to create a session
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Referer presented upstream
    pub referer: String,
    /// `Cookie` header harvested from the browser
    pub cookie_header: Option<String>,
    /// Host header override recovered from manifest hints
    pub host_override: Option<String>,
    /// Manifest bodies captured during resolution, keyed by URL
    pub manifests: HashMap<String, String>,
    /// Live browser context for in-page fetches
    pub fallback: Option<Arc<FallbackContext>>,
}

/// Authenticated context for one resolved stream
#[derive(Debug)]
pub struct StreamSession {
    id: String,
    referer: String,
    cookie_header: Option<String>,
    host_override: Option<String>,
    manifests: RwLock<HashMap<String, String>>,
    fallback: Option<Arc<FallbackContext>>,
    created_at: Instant,
}

/// Cache key shared by the `/` and `%2F` spellings of a URL
fn cache_key(url: &str) -> String {
    url.replace("%2F", "/").replace("%2f", "/")
}

impl StreamSession {
    /// Opaque id of this session
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Referer presented upstream
    pub fn referer(&self) -> &str {
        &self.referer
    }

    /// Harvested `Cookie` header
    pub fn cookie_header(&self) -> Option<&str> {
        self.cookie_header.as_deref()
    }

    /// Host header override
    pub fn host_override(&self) -> Option<&str> {
        self.host_override.as_deref()
    }

    /// Live browser context, if one is still attached and open
    pub fn fallback(&self) -> Option<Arc<FallbackContext>> {
        self.fallback
            .as_ref()
            .filter(|ctx| !ctx.is_released())
            .cloned()
    }

    /// Time since creation
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Cached manifest body for `url`, checking both `/` and `%2F` spellings
    pub async fn cached_manifest(&self, url: &str) -> Option<String> {
        self.manifests.read().await.get(&cache_key(url)).cloned()
    }

    /// Store a manifest body; last write wins
    pub async fn put_manifest(&self, url: &str, text: impl Into<String>) {
        self.manifests
            .write()
            .await
            .insert(cache_key(url), text.into());
    }

    /// Number of cached manifests
    pub async fn cached_count(&self) -> usize {
        self.manifests.read().await.len()
    }
}

/// Shared map of live sessions
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<StreamSession>>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create an empty store with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a new session and return its id, then sweep expired entries
    pub async fn create(&self, context: SessionContext) -> String {
        let id = generate_session_id();
        let session = Arc::new(StreamSession {
            id: id.clone(),
            referer: context.referer,
            cookie_header: context.cookie_header,
            host_override: context.host_override,
            manifests: RwLock::new(
                context
                    .manifests
                    .into_iter()
                    .map(|(url, text)| (cache_key(&url), text))
                    .collect(),
            ),
            fallback: context.fallback,
            created_at: Instant::now(),
        });

        self.sessions.write().await.insert(id.clone(), session);
        tracing::debug!("Created session {}", short_id(&id));

        self.sweep().await;
        id
    }

    /// Look up a live session
    pub async fn get(&self, session_id: &str) -> Result<Arc<StreamSession>> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or(Error::SessionExpired)?;

        if session.is_expired(self.ttl) {
            self.evict(session_id).await;
            return Err(Error::SessionExpired);
        }

        Ok(session)
    }

    /// Cache a manifest body under a session
    pub async fn put_manifest(&self, session_id: &str, url: &str, text: &str) -> Result<()> {
        let session = self.get(session_id).await?;
        session.put_manifest(url, text).await;
        Ok(())
    }

    /// Remove one session, releasing its browser context
    pub async fn evict(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                release_fallback(&session).await;
                true
            }
            None => false,
        }
    }

    /// Evict every session older than the TTL; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let expired: Vec<Arc<StreamSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.is_expired(self.ttl))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            release_fallback(session).await;
        }

        if !expired.is_empty() {
            tracing::info!("Swept {} expired session(s)", expired.len());
        }
        expired.len()
    }

    /// Number of sessions currently held (including not yet swept ones)
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

async fn release_fallback(session: &StreamSession) {
    if let Some(context) = &session.fallback {
        context.release().await;
    }
}

/// Cryptographically random, fixed-length hex id
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// First characters of an id, enough to correlate log lines
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}
