//! Live scan of a TLS server.
//!
//! Every suite the TLS engine implements is offered on its own; accepted ones
//! make up the server's cipher list. A recording verifier keeps the chain,
//! the stapled OCSP response and the web-PKI verdict; the chain is then
//! checked for order, hostname, SHA-1 signatures and embedded SCTs. HSTS is
//! read from an HTTPS request. Vulnerability scans are not performed.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::{
    CipherSuite, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    SupportedCipherSuite, SupportedProtocolVersion,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::HstsConfig;
use crate::tls::ciphers::openssl_name;
use crate::tls::protocols::TlsVersion;
use crate::tls::stapling::validate_ocsp_response;
use crate::tls::TlsError;

use super::certificate::{check_certificate_properties, check_received_chain, CertificateSummary};
use super::check::{check_policy, ObservedPolicy};
use super::report::ProfileReport;
use super::{MozillaProfile, ProfileError};

const DEFAULT_PORT: u16 = 443;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// `host[:port]` to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl FromStr for ProbeTarget {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProfileError::Target(s.to_string());

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid())?,
                None if after.is_empty() => DEFAULT_PORT,
                None => return Err(invalid()),
            };
            (host, port)
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
                None => (s, DEFAULT_PORT),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone)]
struct SeenCertificate {
    /// Leaf first, in the order the server sent them
    chain: Vec<Vec<u8>>,
    ocsp: Vec<u8>,
    validation: Result<(), String>,
}

/// Accepts any chain but records what the web-PKI verifier thought of it.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    seen: Mutex<Option<SeenCertificate>>,
}

impl RecordingVerifier {
    fn new(provider: Arc<CryptoProvider>) -> Result<Self, ProfileError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| ProfileError::Certificate(e.to_string()))?;
        Ok(Self {
            inner,
            seen: Mutex::new(None),
        })
    }

    fn seen(&self) -> Option<SeenCertificate> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let validation = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .map(|_| ())
            .map_err(|e| e.to_string());

        let chain = std::iter::once(end_entity)
            .chain(intermediates)
            .map(|cert| cert.as_ref().to_vec())
            .collect();
        let seen = SeenCertificate {
            chain,
            ocsp: ocsp_response.to_vec(),
            validation,
        };
        match self.seen.lock() {
            Ok(mut slot) => *slot = Some(seen),
            Err(poisoned) => *poisoned.into_inner() = Some(seen),
        }

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

struct Prober {
    target: ProbeTarget,
    server_name: ServerName<'static>,
    verifier: Arc<RecordingVerifier>,
}

impl Prober {
    fn client_config(
        &self,
        suites: Vec<SupportedCipherSuite>,
        version: &'static SupportedProtocolVersion,
    ) -> Result<ClientConfig, ProfileError> {
        let provider = CryptoProvider {
            cipher_suites: suites,
            ..aws_lc_rs::default_provider()
        };
        let config = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&[version])
            .map_err(TlsError::Rustls)?
            .dangerous()
            .with_custom_certificate_verifier(self.verifier.clone())
            .with_no_client_auth();
        Ok(config)
    }

    /// Offer `suites` in order; the suite the server picked, if any.
    async fn negotiate(
        &self,
        suites: Vec<SupportedCipherSuite>,
        version: &'static SupportedProtocolVersion,
    ) -> Result<Option<CipherSuite>, ProfileError> {
        let connector = TlsConnector::from(Arc::new(self.client_config(suites, version)?));

        let connect_error = |reason: String| ProfileError::Connect {
            target: self.target.to_string(),
            reason,
        };
        let stream = timeout(
            HANDSHAKE_TIMEOUT,
            TcpStream::connect((self.target.host.as_str(), self.target.port)),
        )
        .await
        .map_err(|_| connect_error("connection timed out".to_string()))?
        .map_err(|e| connect_error(e.to_string()))?;

        match timeout(HANDSHAKE_TIMEOUT, connector.connect(self.server_name.clone(), stream)).await {
            Ok(Ok(tls)) => {
                let (_, connection) = tls.get_ref();
                Ok(connection.negotiated_cipher_suite().map(|s| s.suite()))
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Handshake rejected");
                Ok(None)
            }
            Err(_) => {
                tracing::debug!("Handshake timed out");
                Ok(None)
            }
        }
    }

    /// Suites of one version the server accepts, each offered alone.
    async fn accepted(
        &self,
        version: &'static SupportedProtocolVersion,
    ) -> Result<Vec<SupportedCipherSuite>, ProfileError> {
        let candidates: Vec<SupportedCipherSuite> = aws_lc_rs::ALL_CIPHER_SUITES
            .iter()
            .copied()
            .filter(|s| s.version().version == version.version)
            .collect();

        let results = try_join_all(candidates.iter().map(|suite| async move {
            let accepted = self.negotiate(vec![*suite], version).await?.is_some();
            tracing::debug!(suite = %openssl_name(suite.suite()), accepted, "Probed cipher suite");
            Ok::<_, ProfileError>(accepted.then_some(*suite))
        }))
        .await?;

        Ok(results.into_iter().flatten().collect())
    }

    /// The server's own preference order, or `None` when it follows the client.
    async fn server_order(
        &self,
        accepted: &[SupportedCipherSuite],
        version: &'static SupportedProtocolVersion,
    ) -> Result<Option<Vec<SupportedCipherSuite>>, ProfileError> {
        if accepted.len() < 2 {
            return Ok(None);
        }

        let forward = self.negotiate(accepted.to_vec(), version).await?;
        let reversed: Vec<_> = accepted.iter().rev().copied().collect();
        let backward = self.negotiate(reversed, version).await?;
        if forward.is_none() || forward != backward {
            return Ok(None);
        }

        let mut remaining = accepted.to_vec();
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let Some(chosen) = self.negotiate(remaining.clone(), version).await? else {
                break;
            };
            let Some(index) = remaining.iter().position(|s| s.suite() == chosen) else {
                break;
            };
            order.push(remaining.remove(index));
        }
        order.extend(remaining);
        Ok(Some(order))
    }

    async fn hsts_max_age(&self) -> Option<u64> {
        let client = match reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(HANDSHAKE_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build HTTPS client");
                return None;
            }
        };

        let url = format!("https://{}/", self.target);
        match client.get(&url).send().await {
            Ok(response) => response
                .headers()
                .get(reqwest::header::STRICT_TRANSPORT_SECURITY)
                .and_then(|v| v.to_str().ok())
                .and_then(HstsConfig::max_age_of),
            Err(e) => {
                tracing::warn!(%url, error = %e, "HTTPS request failed, HSTS unknown");
                None
            }
        }
    }
}

/// Scan a running server and compare it with a profile.
pub async fn probe(target: &ProbeTarget, profile: &MozillaProfile) -> Result<ProfileReport, ProfileError> {
    let server_name = ServerName::try_from(target.host.clone())
        .map_err(|_| ProfileError::Target(target.host.clone()))?;
    let provider = Arc::new(aws_lc_rs::default_provider());
    let prober = Prober {
        target: target.clone(),
        server_name,
        verifier: Arc::new(RecordingVerifier::new(provider)?),
    };

    tracing::info!(%target, "Probing TLS server");
    tracing::debug!("TLSv1 and TLSv1.1 are not probed; the TLS engine does not implement them");

    let mut report = ProfileReport::default();
    let mut observed = ObservedPolicy::default();

    for (version, rustls_version) in [
        (TlsVersion::Tls13, &rustls::version::TLS13),
        (TlsVersion::Tls12, &rustls::version::TLS12),
    ] {
        let accepted = prober.accepted(rustls_version).await?;
        if accepted.is_empty() {
            continue;
        }
        observed.protocols.insert(version);

        let ordered = match prober.server_order(&accepted, rustls_version).await? {
            Some(order) => {
                observed.server_preferred_order = true;
                order
            }
            None => accepted,
        };
        observed
            .ciphers
            .extend(ordered.iter().map(|s| openssl_name(s.suite())));
    }

    if observed.protocols.is_empty() {
        report
            .validation_errors
            .push(format!("no TLS handshake with {} succeeded", target));
        return Ok(report);
    }

    observed.hsts_max_age = prober.hsts_max_age().await;

    match prober.verifier.seen() {
        Some(seen) => {
            if let Err(e) = seen.validation {
                report.validation_errors.push(format!("validation not successful: {}", e));
            }
            if !seen.ocsp.is_empty() {
                match validate_ocsp_response(&seen.ocsp) {
                    Ok(validity) => {
                        observed.ocsp_stapled = true;
                        if validity.is_expired(Utc::now()) {
                            if let Some(next_update) = validity.next_update {
                                report
                                    .validation_errors
                                    .push(format!("stapled OCSP response expired at {}", next_update));
                            }
                        }
                    }
                    Err(e) => report
                        .validation_errors
                        .push(format!("stapled OCSP response is invalid: {}", e)),
                }
            }

            report
                .validation_errors
                .extend(check_received_chain(&seen.chain, &prober.target.host)?);

            let leaf = seen.chain.first().map(Vec::as_slice).unwrap_or_default();
            let summary = CertificateSummary::parse(leaf)?;
            report
                .profile_errors
                .extend(check_certificate_properties(&summary, profile, observed.ocsp_stapled));
        }
        None => report
            .validation_errors
            .push("server sent no certificate".to_string()),
    }

    let mut policy_errors = check_policy(&observed, profile);
    policy_errors.append(&mut report.profile_errors);
    report.profile_errors = policy_errors;

    tracing::info!(
        %target,
        protocols = ?observed.protocols,
        ciphers = observed.ciphers.len(),
        server_order = observed.server_preferred_order,
        ocsp = observed.ocsp_stapled,
        "Probe finished"
    );
    Ok(report)
}
