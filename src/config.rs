//! Configuration loading and constants.
//!
//! Loads the front-end configuration from TOML, or from an httpd-style `.conf`
//! file through the `httpd` importer. Every section defaults to the values of
//! the stock httpd TLS configuration: TLS on 443 with `h2` and `http/1.1`, a
//! permanent redirect from port 80, HSTS for two years, the legacy-compatible
//! cipher list and a 32 KiB OCSP stapling cache.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use const_format::formatcp;
use serde::Deserialize;

use crate::http::redirect::{RedirectRules, RewriteError};
use crate::httpd::ImportError;
use crate::tls::{StaplingCacheSpec, StaplingError};

// =============================================================================
// Listener Defaults
// =============================================================================

/// Address both listeners bind to unless configured otherwise
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// TLS listener port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Plaintext redirect listener port
pub const DEFAULT_REDIRECT_PORT: u16 = 80;

/// ALPN protocols the TLS listener can serve, in default preference order
pub const SUPPORTED_ALPN: [&str; 2] = ["h2", "http/1.1"];

/// Seconds to wait for open connections on shutdown
pub const GRACEFUL_SHUTDOWN_SECS: u64 = 30;

// =============================================================================
// Redirect Defaults
// =============================================================================

/// Match every path
pub const DEFAULT_REWRITE_PATTERN: &str = "^(.*)$";

/// Same host and path over HTTPS
pub const DEFAULT_REWRITE_TARGET: &str = "https://%{HTTP_HOST}$1";

/// Permanent redirect, last rule
pub const DEFAULT_REWRITE_FLAGS: &str = "R=301,L";

// =============================================================================
// TLS Defaults
// =============================================================================

pub const DEFAULT_CERTIFICATE_FILE: &str = "/etc/tlsfront/cert.pem";
pub const DEFAULT_CERTIFICATE_KEY_FILE: &str = "/etc/tlsfront/key.pem";

/// `SSLProtocol` expression
pub const DEFAULT_PROTOCOL: &str = "all";

/// Ordered cipher preference list (OpenSSL names).
pub const DEFAULT_CIPHERS: [&str; 26] = [
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "ECDHE-ECDSA-CHACHA20-POLY1305",
    "ECDHE-RSA-CHACHA20-POLY1305",
    "DHE-RSA-AES128-GCM-SHA256",
    "DHE-RSA-AES256-GCM-SHA384",
    "DHE-RSA-CHACHA20-POLY1305",
    "ECDHE-ECDSA-AES128-SHA256",
    "ECDHE-RSA-AES128-SHA256",
    "ECDHE-ECDSA-AES128-SHA",
    "ECDHE-RSA-AES128-SHA",
    "ECDHE-ECDSA-AES256-SHA384",
    "ECDHE-RSA-AES256-SHA384",
    "ECDHE-ECDSA-AES256-SHA",
    "ECDHE-RSA-AES256-SHA",
    "DHE-RSA-AES128-SHA256",
    "DHE-RSA-AES256-SHA256",
    "AES128-GCM-SHA256",
    "AES256-GCM-SHA384",
    "AES128-SHA256",
    "AES256-SHA256",
    "AES128-SHA",
    "AES256-SHA",
    "DES-CBC3-SHA",
];

// =============================================================================
// HSTS Defaults
// =============================================================================

/// Two years, in seconds
pub const DEFAULT_HSTS_MAX_AGE: u64 = 63_072_000;

/// Header value for the default policy
pub const DEFAULT_HSTS_HEADER: &str = formatcp!("max-age={}", DEFAULT_HSTS_MAX_AGE);

// =============================================================================
// OCSP Stapling Defaults
// =============================================================================

/// `SSLStaplingCache` value
pub const DEFAULT_STAPLING_CACHE: &str = "shmcb:logs/ssl_stapling(32768)";

/// How often the response file is re-read
pub const DEFAULT_STAPLING_REFRESH_SECS: u64 = 300;

/// Lifetime of a cached response (`SSLStaplingStandardCacheTimeout`)
pub const DEFAULT_STAPLING_CACHE_TIMEOUT_SECS: u64 = 3600;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "tlsfront=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// TLS listener binding
    #[serde(default)]
    pub listen: ListenConfig,
    /// Plaintext listener and its rewrite rules
    #[serde(default)]
    pub redirect: RedirectConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub hsts: HstsConfig,
    #[serde(default)]
    pub stapling: StaplingConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TLS listener binding
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "ListenConfig::default_host")]
    pub host: String,
    #[serde(default = "ListenConfig::default_https_port")]
    pub https_port: u16,
    /// ALPN protocols in preference order (`Protocols h2 http/1.1`)
    #[serde(default = "ListenConfig::default_protocols")]
    pub protocols: Vec<String>,
    /// Directory served over TLS; without one only `/health` answers
    pub document_root: Option<PathBuf>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            https_port: Self::default_https_port(),
            protocols: Self::default_protocols(),
            document_root: None,
        }
    }
}

impl ListenConfig {
    fn default_host() -> String {
        DEFAULT_BIND_HOST.to_string()
    }

    fn default_https_port() -> u16 {
        DEFAULT_HTTPS_PORT
    }

    fn default_protocols() -> Vec<String> {
        strings(&SUPPORTED_ALPN)
    }

    fn ip(&self) -> Result<IpAddr, ConfigError> {
        self.host
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid listen.host '{}': {}", self.host, e)))
    }

    pub fn https_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.ip()?, self.https_port))
    }

    pub fn redirect_addr(&self, redirect: &RedirectConfig) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.ip()?, redirect.port))
    }
}

/// Plaintext listener that answers every request with a redirect
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectConfig {
    #[serde(default = "RedirectConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "RedirectConfig::default_port")]
    pub port: u16,
    /// Evaluated in order; the first match answers
    #[serde(rename = "rule", default = "RedirectConfig::default_rules")]
    pub rules: Vec<RewriteRuleConfig>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            port: Self::default_port(),
            rules: Self::default_rules(),
        }
    }
}

impl RedirectConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_port() -> u16 {
        DEFAULT_REDIRECT_PORT
    }

    fn default_rules() -> Vec<RewriteRuleConfig> {
        vec![RewriteRuleConfig::default()]
    }
}

/// One `RewriteRule pattern target [flags]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewriteRuleConfig {
    pub pattern: String,
    pub target: String,
    #[serde(default)]
    pub flags: String,
}

impl Default for RewriteRuleConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_REWRITE_PATTERN.to_string(),
            target: DEFAULT_REWRITE_TARGET.to_string(),
            flags: DEFAULT_REWRITE_FLAGS.to_string(),
        }
    }
}

/// Certificate references and TLS parameters
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "TlsConfig::default_certificate_file")]
    pub certificate_file: PathBuf,
    #[serde(default = "TlsConfig::default_certificate_key_file")]
    pub certificate_key_file: PathBuf,
    /// `SSLProtocol` expression, e.g. `all -TLSv1 -TLSv1.1`
    #[serde(default = "TlsConfig::default_protocol")]
    pub protocol: String,
    /// TLS 1.2 and older suites in preference order
    #[serde(default = "TlsConfig::default_ciphers")]
    pub ciphers: Vec<String>,
    #[serde(default = "TlsConfig::default_tls13_ciphers")]
    pub tls13_ciphers: Vec<String>,
    /// Prefer the server's order over the client's (`SSLHonorCipherOrder`)
    #[serde(default)]
    pub honor_cipher_order: bool,
    #[serde(default)]
    pub session_tickets: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            certificate_file: Self::default_certificate_file(),
            certificate_key_file: Self::default_certificate_key_file(),
            protocol: Self::default_protocol(),
            ciphers: Self::default_ciphers(),
            tls13_ciphers: Self::default_tls13_ciphers(),
            honor_cipher_order: false,
            session_tickets: false,
        }
    }
}

impl TlsConfig {
    fn default_certificate_file() -> PathBuf {
        PathBuf::from(DEFAULT_CERTIFICATE_FILE)
    }

    fn default_certificate_key_file() -> PathBuf {
        PathBuf::from(DEFAULT_CERTIFICATE_KEY_FILE)
    }

    fn default_protocol() -> String {
        DEFAULT_PROTOCOL.to_string()
    }

    fn default_ciphers() -> Vec<String> {
        strings(&DEFAULT_CIPHERS)
    }

    fn default_tls13_ciphers() -> Vec<String> {
        strings(&crate::tls::ciphers::DEFAULT_TLS13_CIPHERS)
    }
}

/// Strict-Transport-Security policy for TLS responses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HstsConfig {
    #[serde(default = "HstsConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "HstsConfig::default_max_age")]
    pub max_age_seconds: u64,
    #[serde(default)]
    pub include_subdomains: bool,
    #[serde(default)]
    pub preload: bool,
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            max_age_seconds: Self::default_max_age(),
            include_subdomains: false,
            preload: false,
        }
    }
}

impl HstsConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_max_age() -> u64 {
        DEFAULT_HSTS_MAX_AGE
    }
}

/// OCSP stapling
#[derive(Debug, Clone, Deserialize)]
pub struct StaplingConfig {
    #[serde(default = "StaplingConfig::default_enabled")]
    pub enabled: bool,
    /// httpd-style cache spec, e.g. `shmcb:logs/ssl_stapling(32768)`
    #[serde(default = "StaplingConfig::default_cache")]
    pub cache: String,
    /// DER-encoded OCSP response for the configured certificate
    pub response_file: Option<PathBuf>,
    #[serde(default = "StaplingConfig::default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    #[serde(default = "StaplingConfig::default_cache_timeout")]
    pub standard_cache_timeout_seconds: u64,
}

impl Default for StaplingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            cache: Self::default_cache(),
            response_file: None,
            refresh_interval_seconds: Self::default_refresh_interval(),
            standard_cache_timeout_seconds: Self::default_cache_timeout(),
        }
    }
}

impl StaplingConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_cache() -> String {
        DEFAULT_STAPLING_CACHE.to_string()
    }

    fn default_refresh_interval() -> u64 {
        DEFAULT_STAPLING_REFRESH_SECS
    }

    fn default_cache_timeout() -> u64 {
        DEFAULT_STAPLING_CACHE_TIMEOUT_SECS
    }

    pub fn cache_spec(&self) -> Result<StaplingCacheSpec, StaplingError> {
        self.cache.parse()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.standard_cache_timeout_seconds.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    /// Load from disk. `.conf` files are read as httpd configuration,
    /// anything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let is_httpd = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("conf"))
            .unwrap_or(false);

        let config = if is_httpd {
            crate::httpd::parse_config(&contents)?
        } else {
            Self::from_toml(&contents)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.protocols.is_empty() {
            return Err(ConfigError::Validation(
                "listen.protocols must name at least one protocol".to_string(),
            ));
        }
        for protocol in &self.listen.protocols {
            if !SUPPORTED_ALPN.contains(&protocol.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Unsupported protocol '{}' (expected one of {:?})",
                    protocol, SUPPORTED_ALPN
                )));
            }
        }

        if self.redirect.enabled {
            if self.redirect.port != 0 && self.redirect.port == self.listen.https_port {
                return Err(ConfigError::Validation(format!(
                    "redirect.port and listen.https_port are both {}",
                    self.redirect.port
                )));
            }
            if self.redirect.rules.is_empty() {
                return Err(ConfigError::Validation(
                    "redirect is enabled but has no rules".to_string(),
                ));
            }
            RedirectRules::from_config(&self.redirect.rules)?;
        }

        if self.hsts.enabled && self.hsts.max_age_seconds == 0 {
            tracing::warn!("HSTS max-age is 0; clients will forget the policy");
        }

        if self.stapling.enabled {
            self.stapling.cache_spec()?;
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to import httpd config: {0}")]
    Httpd(#[from] ImportError),
    #[error("Invalid rewrite rule: {0}")]
    Rewrite(#[from] RewriteError),
    #[error("Invalid stapling setting: {0}")]
    Stapling(#[from] StaplingError),
    #[error("Configuration error: {0}")]
    Validation(String),
}
