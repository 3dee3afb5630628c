//! rustls server configuration.
//!
//! Turns the `[tls]` settings into a `ServerConfig`: protocol versions from the
//! `SSLProtocol` expression, cipher suites in configured order, cipher-order
//! enforcement, session tickets and ALPN.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::ResolvesServerCert;
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::{ListenConfig, TlsConfig};

use super::ciphers::resolve_cipher_suites;
use super::protocols::{negotiable_versions, parse_protocol_expression, TlsVersion};
use super::TlsError;

/// Load a PEM certificate chain and private key into a certified key.
pub fn load_certified_key(
    cert_path: &Path,
    key_path: &Path,
    provider: &CryptoProvider,
) -> Result<CertifiedKey, TlsError> {
    let chain = CertificateDer::pem_file_iter(cert_path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| TlsError::Certificate {
            path: cert_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if chain.is_empty() {
        return Err(TlsError::Certificate {
            path: cert_path.to_path_buf(),
            reason: "no certificates found".to_string(),
        });
    }

    let key_der = PrivateKeyDer::from_pem_file(key_path).map_err(|e| TlsError::Certificate {
        path: key_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let signing_key = provider
        .key_provider
        .load_private_key(key_der)
        .map_err(|e| TlsError::Certificate {
            path: key_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(CertifiedKey::new(chain, signing_key))
}

/// The TLS policy after resolving names, ready to hand to rustls.
#[derive(Debug, Clone)]
pub struct TlsPolicy {
    pub versions: Vec<TlsVersion>,
    pub provider: Arc<CryptoProvider>,
    pub honor_cipher_order: bool,
    pub session_tickets: bool,
    pub alpn: Vec<Vec<u8>>,
}

impl TlsPolicy {
    pub fn resolve(tls: &TlsConfig, listen: &ListenConfig) -> Result<Self, TlsError> {
        let configured = parse_protocol_expression(&tls.protocol)?;
        let rustls_versions = negotiable_versions(&configured)?;
        let versions: Vec<TlsVersion> = rustls_versions
            .iter()
            .filter_map(|v| TlsVersion::from_rustls(v.version))
            .collect();

        let mut provider = rustls::crypto::aws_lc_rs::default_provider();
        provider.cipher_suites =
            resolve_cipher_suites(&tls.ciphers, &tls.tls13_ciphers, &versions, &provider)?;

        tracing::debug!(
            versions = ?versions,
            suites = ?provider.cipher_suites.iter().map(|s| s.suite()).collect::<Vec<_>>(),
            "Resolved TLS policy"
        );

        Ok(Self {
            versions,
            provider: Arc::new(provider),
            honor_cipher_order: tls.honor_cipher_order,
            session_tickets: tls.session_tickets,
            alpn: listen.protocols.iter().map(|p| p.as_bytes().to_vec()).collect(),
        })
    }

    fn rustls_versions(&self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        self.versions
            .iter()
            .filter_map(TlsVersion::rustls_version)
            .collect()
    }
}

/// Build the listener's `ServerConfig` around a certificate resolver.
pub fn build_server_config(
    policy: &TlsPolicy,
    resolver: Arc<dyn ResolvesServerCert>,
) -> Result<ServerConfig, TlsError> {
    let mut config = ServerConfig::builder_with_provider(policy.provider.clone())
        .with_protocol_versions(&policy.rustls_versions())
        .map_err(TlsError::Rustls)?
        .with_no_client_auth()
        .with_cert_resolver(resolver);

    config.ignore_client_order = policy.honor_cipher_order;
    config.alpn_protocols = policy.alpn.clone();

    if policy.session_tickets {
        config.ticketer = rustls::crypto::aws_lc_rs::Ticketer::new().map_err(TlsError::Rustls)?;
    } else {
        // TLS 1.2 tickets stay off with the default ticketer; TLS 1.3 needs this.
        config.send_tls13_tickets = 0;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tls::stapling::StaplingResolver;

    fn default_policy() -> TlsPolicy {
        let config = AppConfig::default();
        TlsPolicy::resolve(&config.tls, &config.listen).unwrap()
    }

    #[test]
    fn test_default_policy_matches_httpd_file() {
        let policy = default_policy();
        assert_eq!(policy.versions, vec![TlsVersion::Tls13, TlsVersion::Tls12]);
        assert!(!policy.honor_cipher_order);
        assert!(!policy.session_tickets);
        assert_eq!(policy.alpn, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
        assert_eq!(policy.provider.cipher_suites.len(), 9);
    }

    #[test]
    fn test_load_certified_key_and_build() {
        let dir = tempfile::tempdir().unwrap();
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, generated.cert.pem()).unwrap();
        std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();

        let policy = default_policy();
        let key = load_certified_key(&cert_path, &key_path, &policy.provider).unwrap();
        assert_eq!(key.cert.len(), 1);

        let resolver = Arc::new(StaplingResolver::new(Arc::new(key), None));
        let config = build_server_config(&policy, resolver).unwrap();
        assert_eq!(config.send_tls13_tickets, 0);
        assert!(!config.ignore_client_order);
        assert!(!config.ticketer.enabled());
    }

    #[test]
    fn test_session_tickets_and_server_order_enabled() {
        let mut config = AppConfig::default();
        config.tls.session_tickets = true;
        config.tls.honor_cipher_order = true;
        let policy = TlsPolicy::resolve(&config.tls, &config.listen).unwrap();

        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key_der = PrivateKeyDer::from_pem_slice(generated.key_pair.serialize_pem().as_bytes()).unwrap();
        let signing_key = policy.provider.key_provider.load_private_key(key_der).unwrap();
        let key = CertifiedKey::new(vec![generated.cert.der().clone()], signing_key);
        let resolver = Arc::new(StaplingResolver::new(Arc::new(key), None));

        let server = build_server_config(&policy, resolver).unwrap();
        assert!(server.ignore_client_order);
        assert!(server.ticketer.enabled());
        assert!(server.send_tls13_tickets > 0);
    }

    #[test]
    fn test_missing_certificate_file() {
        let policy = default_policy();
        let err = load_certified_key(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
            &policy.provider,
        );
        assert!(matches!(err, Err(TlsError::Certificate { .. })));
    }
}
