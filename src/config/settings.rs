//! Configuration settings
//!
//! Provides configuration loading from environment variables,
//! configuration files, and command-line overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Helper functions for serde defaults
fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_session_ttl() -> u64 {
    1800 // 30 minutes
}

fn default_fallback_idle() -> u64 {
    600 // 10 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

fn default_sources() -> Vec<String> {
    vec![
        "https://vidlink.pro/movie/{id}".to_string(),
        "https://vidsrc.icu/embed/movie/{id}".to_string(),
        "https://moviesapi.club/movie/{id}".to_string(),
    ]
}

fn default_navigation_timeout() -> u64 {
    25
}

fn default_iframe_navigation_timeout() -> u64 {
    20
}

fn default_manifest_wait() -> u64 {
    20
}

fn default_grace_window() -> u64 {
    6
}

fn default_max_iframes() -> usize {
    2
}

fn default_manifest_marker() -> String {
    ".m3u8".to_string()
}

fn default_blocked_resource_types() -> Vec<String> {
    vec![
        "image".to_string(),
        "stylesheet".to_string(),
        "font".to_string(),
        "media".to_string(),
    ]
}

fn default_referer() -> String {
    "https://videostr.net/".to_string()
}

fn default_browser_args() -> Vec<String> {
    [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--disable-software-rasterizer",
        "--no-zygote",
        "--disable-extensions",
        "--disable-background-networking",
        "--js-flags=--max-old-space-size=256",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Main configuration settings for the stream proxy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerSettings,
    /// Session store configuration
    #[serde(default)]
    pub session: SessionSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Outbound network configuration
    #[serde(default)]
    pub network: NetworkSettings,
    /// Resolution pipeline configuration
    #[serde(default)]
    pub resolver: ResolverSettings,
    /// Automation browser configuration
    #[serde(default)]
    pub browser: BrowserSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL used in rewritten manifests.
    /// When unset it is derived from each request's Host header.
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session TTL in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    /// Idle seconds before a retained browser context is closed
    #[serde(default = "default_fallback_idle")]
    pub fallback_idle_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

/// Outbound network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// HTTPS proxy URL
    #[serde(default)]
    pub https_proxy: Option<String>,
    /// HTTP proxy URL
    #[serde(default)]
    pub http_proxy: Option<String>,
    /// All protocols proxy URL
    #[serde(default)]
    pub all_proxy: Option<String>,
    /// Whole-request timeout for upstream fetches, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Maximum redirect hops followed by the direct strategy
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Spoofed desktop browser user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Which discovered manifests become sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// One session per discovered manifest
    #[default]
    All,
    /// Only the first discovered manifest
    Primary,
}

/// Resolution pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Ordered embed URL templates, `{id}` is replaced by the content id
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// Top-level navigation timeout in seconds
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    /// Iframe navigation timeout in seconds
    #[serde(default = "default_iframe_navigation_timeout")]
    pub iframe_navigation_timeout_secs: u64,
    /// How long to wait for the first manifest after navigation
    #[serde(default = "default_manifest_wait")]
    pub manifest_wait_secs: u64,
    /// Extra window to catch sibling variants after the first manifest
    #[serde(default = "default_grace_window")]
    pub grace_window_secs: u64,
    /// Number of iframes probed when the top-level page yields nothing
    #[serde(default = "default_max_iframes")]
    pub max_iframes: usize,
    /// Substring identifying manifest responses
    #[serde(default = "default_manifest_marker")]
    pub manifest_marker: String,
    /// Resource types aborted during navigation
    #[serde(default = "default_blocked_resource_types")]
    pub blocked_resource_types: Vec<String>,
    /// Referer used when a manifest URL carries no header hints
    #[serde(default = "default_referer")]
    pub default_referer: String,
    /// Session creation policy
    #[serde(default)]
    pub session_policy: SessionPolicy,
    /// Keep the successful page alive for in-browser segment fetches
    #[serde(default = "default_true")]
    pub keep_fallback_context: bool,
}

/// Automation browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Browser executable, auto-detected when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Extra launch arguments
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            fallback_idle_secs: default_fallback_idle(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            verbose: false,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            https_proxy: None,
            http_proxy: None,
            all_proxy: None,
            request_timeout: default_request_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            navigation_timeout_secs: default_navigation_timeout(),
            iframe_navigation_timeout_secs: default_iframe_navigation_timeout(),
            manifest_wait_secs: default_manifest_wait(),
            grace_window_secs: default_grace_window(),
            max_iframes: default_max_iframes(),
            manifest_marker: default_manifest_marker(),
            blocked_resource_types: default_blocked_resource_types(),
            default_referer: default_referer(),
            session_policy: SessionPolicy::default(),
            keep_fallback_context: default_true(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: default_true(),
            args: default_browser_args(),
        }
    }
}

impl Settings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut settings = Self::default();

        if let Ok(host) = std::env::var("STREAM_PROXY_HOST") {
            settings.server.host = host;
        }

        if let Ok(port) = std::env::var("PORT") {
            settings.server.port = port
                .parse()
                .map_err(|e| crate::Error::config("port", &format!("Invalid port: {}", e)))?;
        }

        // Hosting platforms export the public hostname without a scheme
        if let Ok(public_url) = std::env::var("PUBLIC_URL") {
            settings.server.public_url = Some(public_url);
        } else if let Ok(external) = std::env::var("RENDER_EXTERNAL_URL") {
            settings.server.public_url = Some(if external.contains("://") {
                external
            } else {
                format!("https://{}", external)
            });
        }

        if let Ok(ttl) = std::env::var("SESSION_TTL") {
            settings.session.ttl_secs = ttl
                .parse()
                .map_err(|e| crate::Error::config("SESSION_TTL", &format!("Invalid TTL: {}", e)))?;
        }

        settings.network.https_proxy = std::env::var("HTTPS_PROXY").ok();
        settings.network.http_proxy = std::env::var("HTTP_PROXY").ok();
        settings.network.all_proxy = std::env::var("ALL_PROXY").ok();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.logging.level = level;
        }

        if let Ok(verbose) = std::env::var("VERBOSE") {
            settings.logging.verbose = verbose.parse().unwrap_or(false);
        }

        if let Ok(chrome) = std::env::var("CHROME_PATH") {
            settings.browser.executable = Some(PathBuf::from(chrome));
        }

        Ok(settings)
    }

    /// Load settings from configuration file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config("file", &format!("Failed to read config file: {}", e))
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| {
            crate::Error::config("file", &format!("Failed to parse config file: {}", e))
        })?;

        Ok(settings)
    }

    /// Merge settings with environment variable overrides
    pub fn merge_with_env(mut self) -> crate::Result<Self> {
        let env_settings = Self::from_env()?;
        let defaults = Self::default();

        // Merge only non-default values from environment
        if env_settings.server.host != defaults.server.host {
            self.server.host = env_settings.server.host;
        }

        if env_settings.server.port != defaults.server.port {
            self.server.port = env_settings.server.port;
        }

        if env_settings.server.public_url.is_some() {
            self.server.public_url = env_settings.server.public_url;
        }

        if env_settings.session.ttl_secs != defaults.session.ttl_secs {
            self.session.ttl_secs = env_settings.session.ttl_secs;
        }

        if env_settings.logging.level != defaults.logging.level {
            self.logging.level = env_settings.logging.level;
        }

        // Merge proxy settings (always override if present)
        if env_settings.network.https_proxy.is_some() {
            self.network.https_proxy = env_settings.network.https_proxy;
        }
        if env_settings.network.http_proxy.is_some() {
            self.network.http_proxy = env_settings.network.http_proxy;
        }
        if env_settings.network.all_proxy.is_some() {
            self.network.all_proxy = env_settings.network.all_proxy;
        }

        if env_settings.browser.executable.is_some() {
            self.browser.executable = env_settings.browser.executable;
        }

        Ok(self)
    }

    /// Get effective proxy URL based on priority
    pub fn get_proxy_url(&self) -> Option<String> {
        self.network
            .https_proxy
            .as_ref()
            .or(self.network.http_proxy.as_ref())
            .or(self.network.all_proxy.as_ref())
            .cloned()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.port == 0 {
            return Err(crate::Error::config(
                "port",
                "Invalid server port: cannot be 0",
            ));
        }

        if self.session.ttl_secs == 0 {
            return Err(crate::Error::config(
                "ttl_secs",
                "Invalid session TTL: cannot be 0",
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(crate::Error::config(
                    "log_level",
                    &format!("Invalid log level: {}", self.logging.level),
                ));
            }
        }

        for (name, proxy_url) in [
            ("https_proxy", &self.network.https_proxy),
            ("http_proxy", &self.network.http_proxy),
            ("all_proxy", &self.network.all_proxy),
        ]
        .iter()
        {
            if let Some(url_str) = proxy_url
                && let Err(e) = url::Url::parse(url_str)
            {
                return Err(crate::Error::config(
                    *name,
                    &format!("Invalid proxy URL '{}': {}", url_str, e),
                ));
            }
        }

        if let Some(public_url) = &self.server.public_url
            && let Err(e) = url::Url::parse(public_url)
        {
            return Err(crate::Error::config(
                "public_url",
                &format!("Invalid public URL '{}': {}", public_url, e),
            ));
        }

        if self.resolver.sources.is_empty() {
            return Err(crate::Error::config(
                "sources",
                "At least one source template is required",
            ));
        }

        if let Some(template) = self
            .resolver
            .sources
            .iter()
            .find(|t| !t.contains("{id}"))
        {
            return Err(crate::Error::config(
                "sources",
                &format!("Source template '{}' has no {{id}} placeholder", template),
            ));
        }

        Ok(())
    }
}
