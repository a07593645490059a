//! Stream Proxy
//!
//! Resolves a playable HLS manifest for a content id by driving a browser
//! across third-party embed pages, then serves a rewritten, session-bound
//! proxy of that manifest and its segments. Players that cannot set headers
//! or cookies only ever see plain URLs; the proxy replays the referer, cookies
//! and host the upstream expects.
//!
//! # Architecture
//!
//! Leaf to root:
//! - [`proxy::token`]: `(session id, url)` packed into a path-safe token
//! - [`proxy::rewriter`]: manifest URI lines rewritten into proxy URLs
//! - [`proxy::fetcher`]: direct, host-less retry and in-browser fetch cascade
//! - [`session`]: TTL-bound sessions with manifest cache and live browser context
//! - [`resolver`]: source and iframe probing through browser automation
//! - [`proxy::handler`]: `/hls/{token}` serving
//!
//! # Usage
//!
//! ```bash
//! stream-proxy server --port 8888
//! curl 'http://localhost:8888/?id=550'
//! ```
//!
//! # Examples
//!
//! ```rust
//! use stream_proxy::proxy::token;
//!
//! let tok = token::encode("a1b2", "https://cdn.example/index.m3u8");
//! let (session, url) = token::decode(&tok).unwrap();
//! assert_eq!(session, "a1b2");
//! assert_eq!(url, "https://cdn.example/index.m3u8");
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod server;
pub mod session;
pub mod types;
pub mod utils;

pub use config::{ConfigLoader, Settings};
pub use error::{Error, Result};
pub use proxy::{HlsProxy, MultiStrategyFetcher};
pub use resolver::{ResolvedStream, StreamResolver};
pub use session::SessionStore;
pub use types::{HealthResponse, StreamsResponse};
