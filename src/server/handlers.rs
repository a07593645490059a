//! HTTP request handlers
//!
//! Resolution always answers 200 with a (possibly empty) stream list. Proxy
//! failures answer with a bare status code and an empty body.

use crate::{
    config::Settings,
    proxy::ResourceKind,
    server::app::AppState,
    types::{HealthResponse, ResolveQuery, StreamsResponse, UsageResponse},
    utils::version,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Header set by TLS-terminating reverse proxies
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Externally visible origin for rewritten URLs
///
/// `server.public_url` wins; otherwise `X-Forwarded-Proto` (default `http`)
/// and the request's `Host` are combined.
pub fn proxy_base(settings: &Settings, headers: &HeaderMap) -> String {
    if let Some(public_url) = &settings.server.public_url {
        return public_url.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", settings.server.host, settings.server.port));

    format!("{}://{}", scheme, host)
}

/// Split `abc.m3u8` into token and resource kind; no extension means manifest
pub fn split_token_path(path: &str) -> Option<(&str, ResourceKind)> {
    match path.rsplit_once('.') {
        Some((token, extension)) => {
            ResourceKind::from_extension(extension).map(|kind| (token, kind))
        }
        None => Some((path, ResourceKind::Manifest)),
    }
}

/// Resolve endpoint
///
/// GET /?id=<contentId>
///
/// Without an id, returns a usage hint.
pub async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(content_id) = query.content_id() else {
        return (StatusCode::OK, Json(UsageResponse::default())).into_response();
    };

    let base = proxy_base(&state.settings, &headers);
    tracing::info!("Resolving content id {}", content_id);

    let urls = state
        .resolver
        .resolve_to_proxy_urls(content_id, &base)
        .await;
    tracing::info!("Resolved {} stream(s) for {}", urls.len(), content_id);

    (StatusCode::OK, Json(StreamsResponse::from_urls(urls))).into_response()
}

/// Health endpoint
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    let active = state.store.len().await;

    tracing::debug!(
        "Health: uptime={}s, sessions={}, version={}",
        uptime,
        active,
        version::get_version()
    );
    Json(HealthResponse::new(uptime, active))
}

/// Proxy endpoint
///
/// GET /hls/{token}[.m3u8|.ts]
pub async fn hls(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some((token, kind)) = split_token_path(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let base = proxy_base(&state.settings, &headers);
    match state.proxy.serve(token, kind, &base).await {
        Ok(response) => (
            [(header::CONTENT_TYPE, response.content_type().to_string())],
            response.into_body(),
        )
            .into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            if status == StatusCode::BAD_GATEWAY {
                tracing::warn!("Proxy request failed: {}", crate::error::format_error(&e));
            } else {
                tracing::debug!("Proxy request rejected ({}): {}", status, e);
            }
            status.into_response()
        }
    }
}
