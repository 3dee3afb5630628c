//! TLS profile auditing against the Mozilla server-side TLS guidelines.
//!
//! - `check`: protocol, cipher, HSTS and cipher-order checks
//! - `certificate`: leaf certificate properties
//! - `probe`: live handshake scan of a running server
//! - `report`: the combined result

mod certificate;
mod check;
mod probe;
mod report;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::{AppConfig, ConfigError};
use crate::tls::TlsError;

pub use certificate::{check_certificate_properties, CertificateSummary};
pub use check::{check_cipher_order, check_policy, ObservedPolicy};
pub use probe::{probe, ProbeTarget};
pub use report::ProfileReport;

/// Guidelines shipped with the binary.
const EMBEDDED_GUIDELINES: &str = include_str!("guidelines-5.3.json");

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to read guidelines '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid guidelines: {0}")]
    Guidelines(#[from] serde_json::Error),

    #[error("Unknown profile '{name}' (available: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Invalid target '{0}'")]
    Target(String),

    #[error("Failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Mozilla server-side TLS recommendations, one entry per profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Guidelines {
    pub version: f64,
    #[serde(default)]
    pub href: Option<String>,
    pub configurations: BTreeMap<String, MozillaProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileCiphers {
    #[serde(default)]
    pub iana: Vec<String>,
    #[serde(default)]
    pub openssl: Vec<String>,
}

/// One profile (`old`, `intermediate`, `modern`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MozillaProfile {
    pub certificate_curves: Vec<String>,
    pub certificate_signatures: Vec<String>,
    pub certificate_types: Vec<String>,
    pub ciphers: ProfileCiphers,
    /// TLS 1.3 suites
    pub ciphersuites: Vec<String>,
    pub dh_param_size: Option<u32>,
    pub ecdh_param_size: Option<u32>,
    pub hsts_min_age: Option<u64>,
    /// Days
    pub maximum_certificate_lifespan: Option<u64>,
    pub ocsp_staple: bool,
    pub recommended_certificate_lifespan: Option<u64>,
    pub rsa_key_size: Option<u32>,
    pub server_preferred_order: bool,
    pub tls_curves: Vec<String>,
    pub tls_versions: Vec<String>,
}

impl MozillaProfile {
    /// Every suite name the profile allows, in preference order.
    pub fn allowed_ciphers(&self) -> Vec<&str> {
        self.ciphersuites
            .iter()
            .chain(self.ciphers.openssl.iter())
            .map(String::as_str)
            .collect()
    }
}

impl Guidelines {
    pub fn embedded() -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(EMBEDDED_GUIDELINES)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let guidelines: Self = serde_json::from_str(&contents)?;
        tracing::info!(
            version = guidelines.version,
            path = %path.display(),
            "Loaded Mozilla TLS guidelines"
        );
        Ok(guidelines)
    }

    /// The embedded guidelines, or the given file.
    pub fn load(path: Option<&Path>) -> Result<Self, ProfileError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    pub fn profile(&self, name: &str) -> Result<&MozillaProfile, ProfileError> {
        self.configurations
            .get(name)
            .ok_or_else(|| ProfileError::UnknownProfile {
                name: name.to_string(),
                available: self
                    .configurations
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Offline audit: the policy the configuration would serve, plus its
/// certificate.
pub fn check_config(config: &AppConfig, profile: &MozillaProfile) -> Result<ProfileReport, ProfileError> {
    let observed = ObservedPolicy::from_config(config)?;
    let mut report = ProfileReport::default();
    report.profile_errors.extend(check_policy(&observed, profile));

    match std::fs::read(&config.tls.certificate_file) {
        Ok(pem) => {
            let der = certificate::first_certificate(&pem)?;
            let summary = CertificateSummary::parse(&der)?;
            report
                .profile_errors
                .extend(check_certificate_properties(&summary, profile, observed.ocsp_stapled));
        }
        Err(e) => {
            report.validation_errors.push(format!(
                "cannot read certificate '{}': {}",
                config.tls.certificate_file.display(),
                e
            ));
        }
    }

    Ok(report)
}
