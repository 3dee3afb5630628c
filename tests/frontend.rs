//! End-to-end tests over real sockets.
//!
//! Each test starts its own front-end on ephemeral ports with a freshly
//! generated certificate.
//!
//! Run with: cargo test --test frontend

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::{CipherSuite, ClientConfig, DigitallySignedStruct, HandshakeKind, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use tlsfront::config::AppConfig;
use tlsfront::profile::{self, Guidelines, ProbeTarget};
use tlsfront::Frontend;

/// Smallest structurally valid successful OCSP response.
const OCSP_SUCCESSFUL: [u8; 10] = [0x30, 0x08, 0x0a, 0x01, 0x00, 0xa0, 0x03, 0x30, 0x01, 0x00];

struct TestCerts {
    dir: TempDir,
    cert: PathBuf,
    key: PathBuf,
}

impl TestCerts {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        let certs = Self { dir, cert, key };
        certs.regenerate();
        certs
    }

    /// Write a new self-signed certificate; returns its DER.
    fn regenerate(&self) -> Vec<u8> {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        std::fs::write(&self.cert, generated.cert.pem()).unwrap();
        std::fs::write(&self.key, generated.key_pair.serialize_pem()).unwrap();
        generated.cert.der().to_vec()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn test_config(certs: &TestCerts) -> AppConfig {
    let mut config = AppConfig::default();
    config.listen.host = "127.0.0.1".to_string();
    config.listen.https_port = 0;
    config.redirect.port = 0;
    config.tls.certificate_file = certs.cert.clone();
    config.tls.certificate_key_file = certs.key.clone();
    config
}

fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Accepts any certificate and remembers what the server sent.
#[derive(Debug)]
struct RecordingVerifier {
    provider: Arc<CryptoProvider>,
    end_entity: Mutex<Vec<u8>>,
    ocsp: Mutex<Vec<u8>>,
}

impl RecordingVerifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            provider: Arc::new(aws_lc_rs::default_provider()),
            end_entity: Mutex::new(Vec::new()),
            ocsp: Mutex::new(Vec::new()),
        })
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        *self.end_entity.lock().unwrap() = end_entity.as_ref().to_vec();
        *self.ocsp.lock().unwrap() = ocsp_response.to_vec();
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client offering `suites` in order; all must share one protocol version.
fn client_offering(suites: &[CipherSuite], verifier: Arc<RecordingVerifier>) -> ClientConfig {
    let supported: Vec<_> = suites
        .iter()
        .map(|suite| {
            aws_lc_rs::ALL_CIPHER_SUITES
                .iter()
                .copied()
                .find(|s| s.suite() == *suite)
                .unwrap()
        })
        .collect();
    let version = supported[0].version();
    let provider = CryptoProvider {
        cipher_suites: supported,
        ..aws_lc_rs::default_provider()
    };
    ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[version])
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth()
}

/// Client offering exactly one suite.
fn single_suite_client(suite: CipherSuite, verifier: Arc<RecordingVerifier>) -> ClientConfig {
    client_offering(&[suite], verifier)
}

async fn connect(
    addr: SocketAddr,
    config: ClientConfig,
) -> tokio_rustls::client::TlsStream<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let server_name = ServerName::try_from("localhost").unwrap();
    TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await
        .unwrap()
}

/// Handshake, send one request and read the whole response.
async fn exchange(
    addr: SocketAddr,
    config: Arc<ClientConfig>,
) -> Result<(CipherSuite, Option<HandshakeKind>, String), std::io::Error> {
    let stream = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from("localhost").unwrap();
    let mut tls = TlsConnector::from(config).connect(server_name, stream).await?;

    let (suite, kind) = {
        let (_, connection) = tls.get_ref();
        (
            connection.negotiated_cipher_suite().unwrap().suite(),
            connection.handshake_kind(),
        )
    };

    tls.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = Vec::new();
    tls.read_to_end(&mut response).await?;

    Ok((suite, kind, String::from_utf8_lossy(&response).into_owned()))
}

#[tokio::test]
async fn test_plaintext_request_is_redirected() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();
    let redirect = frontend.redirect_addr().unwrap();

    let response = https_client()
        .get(format!("http://localhost:{}/any/path", redirect.port()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers()[reqwest::header::LOCATION],
        format!("https://localhost:{}/any/path", redirect.port()).as_str()
    );
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_tls_responses_carry_hsts() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();
    let client = https_client();

    for (path, status) in [("/health", 200), ("/missing", 404)] {
        let response = client
            .get(format!("https://localhost:{}{}", frontend.https_addr().port(), path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), status);
        assert_eq!(
            response.headers()[reqwest::header::STRICT_TRANSPORT_SECURITY],
            "max-age=63072000"
        );
    }
}

#[tokio::test]
async fn test_only_listed_suites_negotiate() {
    let certs = TestCerts::new();
    let mut config = test_config(&certs);
    config.tls.ciphers = vec!["ECDHE-ECDSA-AES256-GCM-SHA384".to_string()];
    config.tls.tls13_ciphers = vec!["TLS_AES_256_GCM_SHA384".to_string()];
    let frontend = Frontend::start(&config).await.unwrap();
    let addr = frontend.https_addr();

    let accepted = [
        CipherSuite::TLS13_AES_256_GCM_SHA384,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    ];
    for suite in accepted {
        let client = Arc::new(single_suite_client(suite, RecordingVerifier::new()));
        let (negotiated, _, response) = exchange(addr, client).await.unwrap();
        assert_eq!(negotiated, suite);
        assert!(response.starts_with("HTTP/1.1 200"));
    }

    let rejected = [
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    ];
    for suite in rejected {
        let client = Arc::new(single_suite_client(suite, RecordingVerifier::new()));
        assert!(exchange(addr, client).await.is_err(), "{:?} was accepted", suite);
    }
}

#[tokio::test]
async fn test_no_session_tickets() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();
    let addr = frontend.https_addr();

    // Same config, so a ticket from the first connection would be reused.
    let client = Arc::new(single_suite_client(
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        RecordingVerifier::new(),
    ));
    let (_, first, _) = exchange(addr, client.clone()).await.unwrap();
    let (_, second, _) = exchange(addr, client).await.unwrap();

    assert_eq!(first, Some(HandshakeKind::Full));
    assert_eq!(second, Some(HandshakeKind::Full));
}

#[tokio::test]
async fn test_session_tickets_when_enabled() {
    let certs = TestCerts::new();
    let mut config = test_config(&certs);
    config.tls.session_tickets = true;
    let frontend = Frontend::start(&config).await.unwrap();
    let addr = frontend.https_addr();

    let client = Arc::new(single_suite_client(
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        RecordingVerifier::new(),
    ));
    exchange(addr, client.clone()).await.unwrap();
    let (_, second, _) = exchange(addr, client).await.unwrap();

    assert_eq!(second, Some(HandshakeKind::Resumed));
}

#[tokio::test]
async fn test_stapled_response_reaches_client() {
    let certs = TestCerts::new();
    let ocsp_path = certs.path("ocsp.der");
    std::fs::write(&ocsp_path, OCSP_SUCCESSFUL).unwrap();

    let mut config = test_config(&certs);
    config.stapling.response_file = Some(ocsp_path);
    let frontend = Frontend::start(&config).await.unwrap();

    let verifier = RecordingVerifier::new();
    let client = Arc::new(single_suite_client(
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        verifier.clone(),
    ));
    exchange(frontend.https_addr(), client).await.unwrap();

    assert_eq!(*verifier.ocsp.lock().unwrap(), OCSP_SUCCESSFUL.to_vec());
}

#[tokio::test]
async fn test_stapling_disabled_sends_nothing() {
    let certs = TestCerts::new();
    let ocsp_path = certs.path("ocsp.der");
    std::fs::write(&ocsp_path, OCSP_SUCCESSFUL).unwrap();

    let mut config = test_config(&certs);
    config.stapling.enabled = false;
    config.stapling.response_file = Some(ocsp_path);
    let frontend = Frontend::start(&config).await.unwrap();

    let verifier = RecordingVerifier::new();
    let client = Arc::new(single_suite_client(
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        verifier.clone(),
    ));
    exchange(frontend.https_addr(), client).await.unwrap();

    assert!(verifier.ocsp.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reload_serves_new_certificate() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();
    let addr = frontend.https_addr();

    let replacement = certs.regenerate();
    frontend.reloader().reload().await.unwrap();

    let verifier = RecordingVerifier::new();
    let client = Arc::new(single_suite_client(
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        verifier.clone(),
    ));
    exchange(addr, client).await.unwrap();
    assert_eq!(*verifier.end_entity.lock().unwrap(), replacement);
}

#[tokio::test]
async fn test_failed_reload_keeps_serving() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();

    std::fs::write(&certs.key, "not a key").unwrap();
    assert!(frontend.reloader().reload().await.is_err());

    let client = Arc::new(single_suite_client(
        CipherSuite::TLS13_AES_128_GCM_SHA256,
        RecordingVerifier::new(),
    ));
    assert!(exchange(frontend.https_addr(), client).await.is_ok());
}

#[tokio::test]
async fn test_start_fails_without_certificate() {
    let certs = TestCerts::new();
    let mut config = test_config(&certs);
    config.tls.certificate_file = Path::new("/nonexistent/cert.pem").to_path_buf();
    assert!(matches!(
        Frontend::start(&config).await,
        Err(tlsfront::ServerError::Tls(_))
    ));
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();
    let addr = frontend.https_addr();

    frontend.shutdown(std::time::Duration::from_secs(1));
    frontend.wait().await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_probe_against_modern_profile() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();

    let target: ProbeTarget = format!("localhost:{}", frontend.https_addr().port())
        .parse()
        .unwrap();
    let guidelines = Guidelines::embedded().unwrap();
    let report = profile::probe(&target, guidelines.profile("modern").unwrap())
        .await
        .unwrap();

    // self-signed
    assert!(!report.validated());
    assert!(report
        .validation_errors
        .contains(&"not enough SCTs in certificate, only found 0".to_string()));
    assert!(!report
        .validation_errors
        .iter()
        .any(|e| e.contains("hostname") || e.contains("wrong order") || e.contains("SHA1")));
    assert!(report
        .profile_errors
        .contains(&"must not support \"TLSv1.2\"".to_string()));
    assert!(report
        .profile_errors
        .contains(&"must not support \"ECDHE-ECDSA-AES128-GCM-SHA256\"".to_string()));
    assert!(!report
        .profile_errors
        .iter()
        .any(|e| e.contains("TLS_AES_128_GCM_SHA256") || e.contains("HSTS")));
    // ECDSA certificate, so RSA suites are never accepted
    assert!(!report
        .profile_errors
        .iter()
        .any(|e| e.contains("ECDHE-RSA")));
}

/// HTTP/2 connection preface followed by an empty SETTINGS frame.
const H2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n\x00\x00\x00\x04\x00\x00\x00\x00\x00";
const H2_FRAME_SETTINGS: u8 = 0x04;

#[tokio::test]
async fn test_alpn_negotiates_and_serves_h2() {
    let certs = TestCerts::new();
    let frontend = Frontend::start(&test_config(&certs)).await.unwrap();

    let mut client = single_suite_client(CipherSuite::TLS13_AES_128_GCM_SHA256, RecordingVerifier::new());
    client.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    let mut tls = connect(frontend.https_addr(), client).await;
    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));

    // the server's first frame on an h2 connection is its SETTINGS
    tls.write_all(H2_PREFACE).await.unwrap();
    let mut header = [0u8; 9];
    tls.read_exact(&mut header).await.unwrap();
    assert_eq!(header[3], H2_FRAME_SETTINGS);
}

#[tokio::test]
async fn test_alpn_follows_configured_protocols() {
    let certs = TestCerts::new();
    let mut config = test_config(&certs);
    config.listen.protocols = vec!["http/1.1".to_string()];
    let frontend = Frontend::start(&config).await.unwrap();

    let mut client = single_suite_client(CipherSuite::TLS13_AES_128_GCM_SHA256, RecordingVerifier::new());
    client.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    let tls = connect(frontend.https_addr(), client).await;
    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"http/1.1"[..]));
}

#[tokio::test]
async fn test_cipher_order_preference() {
    let client_order = [
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    ];

    for (honor, expected) in [
        (false, CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256),
        (true, CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384),
    ] {
        let certs = TestCerts::new();
        let mut config = test_config(&certs);
        config.tls.ciphers = vec![
            "ECDHE-ECDSA-AES256-GCM-SHA384".to_string(),
            "ECDHE-ECDSA-AES128-GCM-SHA256".to_string(),
        ];
        config.tls.honor_cipher_order = honor;
        let frontend = Frontend::start(&config).await.unwrap();

        let tls = connect(
            frontend.https_addr(),
            client_offering(&client_order, RecordingVerifier::new()),
        )
        .await;
        let negotiated = tls.get_ref().1.negotiated_cipher_suite().unwrap().suite();
        assert_eq!(negotiated, expected, "honor_cipher_order = {}", honor);
    }
}
