//! HLS proxying: tokens, manifest rewriting, upstream fetching

pub mod fetcher;
pub mod handler;
pub mod rewriter;
pub mod token;

pub use fetcher::{FetchRequest, FetchStrategy, FetchedResource, MultiStrategyFetcher};
pub use handler::{HlsProxy, ProxyResponse};
pub use rewriter::ResourceKind;
pub use token::ProxyToken;
