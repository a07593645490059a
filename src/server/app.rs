//! Axum application setup
//!
//! Creates and configures the Axum application with routes and middleware.

use crate::{
    Result,
    config::Settings,
    proxy::{HlsProxy, MultiStrategyFetcher},
    resolver::{self, AutomationLauncher, StreamResolver},
    session::SessionStore,
};
use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Live stream sessions
    pub store: Arc<SessionStore>,
    /// Token-addressed manifest and segment proxy
    pub proxy: Arc<HlsProxy>,
    /// Content id resolution
    pub resolver: Arc<StreamResolver>,
    /// Application settings
    pub settings: Arc<Settings>,
    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the store, fetcher, proxy and resolver together
    pub fn new(settings: Settings, launcher: Option<Arc<dyn AutomationLauncher>>) -> Result<Self> {
        let store = Arc::new(SessionStore::new(Duration::from_secs(
            settings.session.ttl_secs,
        )));
        let fetcher = Arc::new(MultiStrategyFetcher::new(&settings)?);
        let proxy = Arc::new(HlsProxy::new(Arc::clone(&store), fetcher));
        let resolver = Arc::new(StreamResolver::new(&settings, Arc::clone(&store), launcher));

        Ok(Self {
            store,
            proxy,
            resolver,
            settings: Arc::new(settings),
            start_time: std::time::Instant::now(),
        })
    }
}

/// Create the application with the automation engine compiled into this build
pub fn create_app(settings: Settings) -> Result<Router> {
    let launcher = resolver::default_launcher(&settings);
    Ok(router(AppState::new(settings, launcher)?))
}

/// Build the router around prepared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(super::handlers::resolve))
        .route("/health", get(super::handlers::health))
        .route("/hls/{token}", get(super::handlers::hls))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
