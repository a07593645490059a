//! Utility functions and helpers
//!
//! This module contains utility functions used throughout the application.

pub mod redact;
pub mod version;

pub use redact::truncate_url;
pub use version::{VERSION, get_version};
