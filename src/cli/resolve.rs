//! One-shot resolve mode
//!
//! Runs the resolution pipeline once and prints the discovered upstream
//! manifests as JSON on stdout. No server is started and no sessions outlive
//! the process.

use crate::{
    cli::{init_logging, load_settings},
    resolver::{self, StreamResolver},
    session::SessionStore,
    types::StreamSummary,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Arguments for resolve mode
#[derive(Debug)]
pub struct ResolveArgs {
    pub id: String,
    pub config: Option<String>,
    pub verbose: bool,
}

/// Run resolve mode with the given arguments
pub async fn run_resolve_mode(args: ResolveArgs) -> Result<()> {
    let id = args.id.trim();
    if id.is_empty() {
        anyhow::bail!("Content id must not be empty");
    }

    let mut settings = load_settings(args.config.as_deref());
    settings.logging.verbose = args.verbose;
    // logs go to stderr; stdout carries the result
    init_logging(args.verbose, &settings.logging.level);

    let store = Arc::new(SessionStore::new(Duration::from_secs(
        settings.session.ttl_secs,
    )));
    let launcher = resolver::default_launcher(&settings);
    let resolver = StreamResolver::new(&settings, store, launcher);

    let resolution = resolver.resolve(id).await;
    let summaries: Vec<StreamSummary> = resolution.streams.iter().map(StreamSummary::from).collect();
    resolution.release().await;

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    tracing::info!("Resolved {} stream(s) for {}", summaries.len(), id);

    Ok(())
}
