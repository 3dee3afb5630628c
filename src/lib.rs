//! tlsfront - a minimal TLS-terminating HTTP front-end
//!
//! Terminates TLS with a configured protocol and cipher policy, redirects
//! plaintext HTTP to HTTPS through rewrite rules, adds HSTS to every TLS
//! response and staples OCSP responses. Configuration is native TOML or an
//! httpd-style `.conf` file. The `profile` module audits a configuration or a
//! live server against the Mozilla TLS guidelines.

pub mod config;
pub mod error;
pub mod http;
pub mod httpd;
pub mod middleware;
pub mod profile;
pub mod routes;
pub mod tls;

pub use config::{AppConfig, ConfigError};
pub use error::FrontendError;
pub use http::{start_server, Frontend, ServerError};
