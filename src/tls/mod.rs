//! TLS engine setup.
//!
//! - `protocols`: `SSLProtocol` expressions and negotiable versions
//! - `ciphers`: cipher name table and ordered suite resolution
//! - `server_config`: certificate loading and the rustls `ServerConfig`
//! - `stapling`: OCSP stapling cache, resolver and refresher

pub mod ciphers;
pub mod protocols;
pub mod server_config;
pub mod stapling;

use std::path::PathBuf;

pub use server_config::{build_server_config, load_certified_key, TlsPolicy};
pub use stapling::{Stapler, StaplingCache, StaplingCacheSpec, StaplingError, StaplingResolver};

/// TLS setup error
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Invalid protocol setting: {0}")]
    Protocol(String),

    #[error("Invalid cipher setting: {0}")]
    Cipher(String),

    #[error("Failed to load '{path}': {reason}")]
    Certificate { path: PathBuf, reason: String },

    #[error("Stapling error: {0}")]
    Stapling(#[from] StaplingError),

    #[error("TLS configuration rejected: {0}")]
    Rustls(rustls::Error),
}
