//! Policy checks against a profile.

use std::collections::BTreeSet;

use crate::config::AppConfig;
use crate::tls::ciphers::openssl_name;
use crate::tls::protocols::TlsVersion;
use crate::tls::TlsPolicy;

use super::{MozillaProfile, ProfileError};

/// What a server offers, either read from configuration or scanned live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedPolicy {
    pub protocols: BTreeSet<TlsVersion>,
    /// OpenSSL names; in server preference order when `server_preferred_order`
    pub ciphers: Vec<String>,
    pub server_preferred_order: bool,
    pub hsts_max_age: Option<u64>,
    pub ocsp_stapled: bool,
}

impl ObservedPolicy {
    /// The policy a front-end started from `config` would negotiate.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProfileError> {
        let policy = TlsPolicy::resolve(&config.tls, &config.listen)?;

        Ok(Self {
            protocols: policy.versions.iter().copied().collect(),
            ciphers: policy
                .provider
                .cipher_suites
                .iter()
                .map(|s| openssl_name(s.suite()))
                .collect(),
            server_preferred_order: config.tls.honor_cipher_order,
            hsts_max_age: config.hsts.enabled.then_some(config.hsts.max_age_seconds),
            ocsp_stapled: config.stapling.enabled,
        })
    }
}

/// Profile violations of an observed policy.
pub fn check_policy(observed: &ObservedPolicy, profile: &MozillaProfile) -> Vec<String> {
    let mut errors = Vec::new();

    for protocol in &observed.protocols {
        if !profile.tls_versions.iter().any(|v| v == protocol.as_str()) {
            errors.push(format!("must not support \"{}\"", protocol));
        }
    }

    let allowed = profile.allowed_ciphers();
    for cipher in &observed.ciphers {
        if !allowed.contains(&cipher.as_str()) {
            errors.push(format!("must not support \"{}\"", cipher));
        }
    }

    if let Some(min_age) = profile.hsts_min_age {
        match observed.hsts_max_age {
            None => errors.push("HSTS header is not set".to_string()),
            Some(age) if age < min_age => {
                errors.push(format!("HSTS max-age {} is below {}", age, min_age))
            }
            Some(_) => {}
        }
    }

    if observed.server_preferred_order {
        let supported: Vec<&str> = observed.ciphers.iter().map(String::as_str).collect();
        if !check_cipher_order(&allowed, &supported) {
            errors.push("server has the wrong cipher suite order".to_string());
        }
    }

    errors
}

/// True when `supported` appears in `allowed` in the same relative order.
pub fn check_cipher_order<A, S>(allowed: &[A], supported: &[S]) -> bool
where
    A: AsRef<str>,
    S: AsRef<str>,
{
    let mut remaining = allowed.iter();
    supported
        .iter()
        .all(|s| remaining.any(|a| a.as_ref() == s.as_ref()))
}
