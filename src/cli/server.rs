//! Server mode CLI logic
//!
//! Contains the core logic for running the HTTP server mode.

use crate::{
    cli::{init_logging, load_settings},
    server::app,
    utils::version,
};
use anyhow::Result;

/// Arguments for server mode
#[derive(Debug, Default)]
pub struct ServerArgs {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub public_url: Option<String>,
    pub config: Option<String>,
    pub verbose: bool,
}

/// Run server mode with the given arguments
pub async fn run_server_mode(args: ServerArgs) -> Result<()> {
    // Configuration precedence:
    // 1. Command line arguments (highest priority)
    // 2. Environment variables
    // 3. Configuration file (from --config, STREAM_PROXY_CONFIG or default location)
    // 4. Default values (lowest priority)
    let mut settings = load_settings(args.config.as_deref());

    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(public_url) = args.public_url {
        url::Url::parse(&public_url)
            .map_err(|e| anyhow::anyhow!("Invalid public URL '{}': {}", public_url, e))?;
        settings.server.public_url = Some(public_url);
    }
    settings.logging.verbose = args.verbose;

    init_logging(args.verbose, &settings.logging.level);

    tracing::info!("Starting stream proxy v{}", version::get_version());
    tracing::info!(
        "Session TTL {}s, {} source(s), policy {:?}",
        settings.session.ttl_secs,
        settings.resolver.sources.len(),
        settings.resolver.session_policy
    );
    match &settings.server.public_url {
        Some(url) => tracing::info!("Public URL: {}", url),
        None => tracing::info!("Public URL derived from request Host headers"),
    }

    let app = app::create_app(settings.clone())?;

    let addr = parse_and_bind_address(&settings.server.host, settings.server.port).await?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Stream proxy v{} listening on {}",
        version::get_version(),
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Parse host string and attempt to bind to the address
///
/// - IP literals are used as given
/// - `::` is tried first and falls back to `0.0.0.0` when IPv6 is unavailable
pub async fn parse_and_bind_address(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

    if let Ok(ip) = host.parse::<IpAddr>() {
        // "::" parses as an IP too; probe it before committing
        if ip == IpAddr::V6(Ipv6Addr::UNSPECIFIED) {
            let addr = SocketAddr::new(ip, port);
            return match tokio::net::TcpListener::bind(addr).await {
                Ok(_) => {
                    tracing::debug!("IPv6 available on {}", addr);
                    Ok(addr)
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not listen on [::]:{} (Caused by {}), falling back to 0.0.0.0",
                        port,
                        e
                    );
                    Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
                }
            };
        }

        let addr = SocketAddr::new(ip, port);
        tracing::debug!("Parsed address: {}", addr);
        return Ok(addr);
    }

    anyhow::bail!(
        "Invalid host address: {}. Use an IP address such as '0.0.0.0' or '::'",
        host
    );
}
