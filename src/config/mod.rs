//! Configuration management for the stream proxy
//!
//! This module handles loading and managing configuration settings
//! for both the HTTP server and the one-shot resolve mode.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{
    BrowserSettings, NetworkSettings, ResolverSettings, SessionPolicy, SessionSettings, Settings,
};

/// Serializes tests that mutate process environment variables
#[cfg(test)]
pub(crate) static ENV_TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
