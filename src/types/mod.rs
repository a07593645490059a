//! Type definitions for the HTTP surface
//!
//! Query parameters and JSON bodies exchanged with players and monitors.

pub mod request;
pub mod response;

pub use request::ResolveQuery;
pub use response::{HealthResponse, StreamEntry, StreamSummary, StreamsResponse, UsageResponse};
