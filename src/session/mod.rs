//! Session management for proxied streams
//!
//! Sessions hold the authenticated context of a resolved stream. The proxy
//! handler reads them on every request and writes fetched manifests back.

pub mod fallback;
pub mod store;

pub use fallback::FallbackContext;
pub use store::{SessionContext, SessionStore, StreamSession};
