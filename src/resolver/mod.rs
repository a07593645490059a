//! Stream resolution through browser automation
//!
//! - `automation`: the capability traits a browser engine implements
//! - `pipeline`: source/iframe probing and manifest discovery
//! - `service`: engine lifecycle and session creation
//! - `chromium`: Chrome DevTools engine (feature `chromium`)

pub mod automation;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod pipeline;
pub mod service;
pub mod sources;

pub use automation::{AutomationEngine, AutomationLauncher, AutomationPage};
pub use pipeline::{ResolutionPipeline, ResolvedStream};
pub use service::{Resolution, StreamResolver};

use crate::config::Settings;
use std::sync::Arc;

/// The engine compiled into this build, if any
#[cfg(feature = "chromium")]
pub fn default_launcher(settings: &Settings) -> Option<Arc<dyn AutomationLauncher>> {
    Some(Arc::new(chromium::ChromiumLauncher::new(&settings.browser)))
}

/// The engine compiled into this build, if any
#[cfg(not(feature = "chromium"))]
pub fn default_launcher(_settings: &Settings) -> Option<Arc<dyn AutomationLauncher>> {
    tracing::warn!("Built without the `chromium` feature; stream resolution is disabled");
    None
}
