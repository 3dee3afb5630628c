//! OCSP stapling.
//!
//! The stapling cache is sized and named by an httpd-style cache spec
//! (`shmcb:logs/ssl_stapling(32768)`). Responses are held in a byte-weighted
//! in-process cache keyed by the leaf certificate's SHA-256 fingerprint and
//! attached to the certified key at handshake time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use moka::sync::Cache;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls_pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use x509_parser::der_parser::asn1_rs::{Any, Class, Enumerated, FromDer, GeneralizedTime, Oid, Tag};

/// Size used by httpd when a shmcb spec omits one.
pub const DEFAULT_SHMCB_SIZE: u64 = 512_000;

#[derive(Debug, thiserror::Error)]
pub enum StaplingError {
    #[error("Invalid stapling cache spec '{spec}': {reason}")]
    Spec { spec: String, reason: String },

    #[error("Malformed OCSP response: {0}")]
    Malformed(String),

    #[error("OCSP responder returned status '{0}'")]
    Status(OcspResponseStatus),

    #[error("OCSP response expired at {next_update}")]
    Expired { next_update: DateTime<Utc> },

    #[error("OCSP response of {size} bytes exceeds the {capacity} byte stapling cache")]
    TooLarge { size: usize, capacity: u64 },

    #[error("Failed to read OCSP response '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Cache spec
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Shmcb,
}

/// A parsed `SSLStaplingCache` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaplingCacheSpec {
    pub backend: CacheBackend,
    /// Segment name; identifies the cache in logs.
    pub name: String,
    pub size_bytes: u64,
}

impl FromStr for StaplingCacheSpec {
    type Err = StaplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StaplingError::Spec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim().trim_matches('"');
        let (backend, rest) = trimmed
            .split_once(':')
            .ok_or_else(|| invalid("expected 'backend:path'"))?;

        if !backend.eq_ignore_ascii_case("shmcb") {
            return Err(invalid("only the shmcb backend is supported"));
        }

        let (name, size_bytes) = match rest.strip_suffix(')') {
            Some(without_paren) => {
                let (name, size) = without_paren
                    .rsplit_once('(')
                    .ok_or_else(|| invalid("unbalanced parenthesis"))?;
                let size: u64 = size
                    .trim()
                    .parse()
                    .map_err(|_| invalid("size is not a number"))?;
                (name, size)
            }
            None => (rest, DEFAULT_SHMCB_SIZE),
        };

        if name.trim().is_empty() {
            return Err(invalid("missing path"));
        }
        if size_bytes == 0 {
            return Err(invalid("size must be greater than zero"));
        }

        Ok(Self {
            backend: CacheBackend::Shmcb,
            name: name.trim().to_string(),
            size_bytes,
        })
    }
}

impl fmt::Display for StaplingCacheSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shmcb:{}({})", self.name, self.size_bytes)
    }
}

// =============================================================================
// OCSP response envelope
// =============================================================================

/// `OCSPResponseStatus` from RFC 6960.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspResponseStatus {
    Successful,
    MalformedRequest,
    InternalError,
    TryLater,
    SigRequired,
    Unauthorized,
}

impl OcspResponseStatus {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Successful),
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::InternalError),
            3 => Some(Self::TryLater),
            5 => Some(Self::SigRequired),
            6 => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

impl fmt::Display for OcspResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Successful => "successful",
            Self::MalformedRequest => "malformedRequest",
            Self::InternalError => "internalError",
            Self::TryLater => "tryLater",
            Self::SigRequired => "sigRequired",
            Self::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

/// Validity window of the first `SingleResponse` in a basic OCSP response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcspValidity {
    pub this_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
}

impl OcspValidity {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.next_update.is_some_and(|next| next < now)
    }
}

const OID_PKIX_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";

/// Check the outer `OCSPResponse` structure and require a successful status
/// carrying response bytes. Signature validation is left to the client. The
/// validity window is read when the body is a basic response.
pub fn validate_ocsp_response(der: &[u8]) -> Result<OcspValidity, StaplingError> {
    let malformed = |reason: &str| StaplingError::Malformed(reason.to_string());

    let (rest, outer) = Any::from_der(der).map_err(|e| StaplingError::Malformed(e.to_string()))?;
    if outer.tag() != Tag::Sequence {
        return Err(malformed("not a DER SEQUENCE"));
    }
    if !rest.is_empty() {
        return Err(StaplingError::Malformed(format!(
            "{} trailing bytes after the response",
            rest.len()
        )));
    }

    let (response_bytes, status) =
        Enumerated::from_der(outer.data).map_err(|_| malformed("missing responseStatus"))?;
    let status = OcspResponseStatus::from_code(status.0).ok_or_else(|| {
        StaplingError::Malformed(format!("unknown response status {}", status.0))
    })?;
    if status != OcspResponseStatus::Successful {
        return Err(StaplingError::Status(status));
    }

    let (_, body) = Any::from_der(response_bytes)
        .map_err(|_| malformed("successful response without responseBytes"))?;
    if body.class() != Class::ContextSpecific || body.tag() != Tag(0) {
        return Err(malformed("successful response without responseBytes"));
    }

    Ok(basic_response_validity(body.data).unwrap_or_else(|| {
        tracing::debug!("OCSP response body is not a basic response, validity unknown");
        OcspValidity::default()
    }))
}

/// `ResponseBytes` → `BasicOCSPResponse` → `ResponseData` → first `SingleResponse`.
fn basic_response_validity(response_bytes: &[u8]) -> Option<OcspValidity> {
    let (_, response_bytes) = sequence(response_bytes)?;
    let (rest, response_type) = Oid::from_der(response_bytes).ok()?;
    if response_type.to_id_string() != OID_PKIX_OCSP_BASIC {
        return None;
    }
    let (_, octets) = Any::from_der(rest).ok()?;
    if octets.tag() != Tag::OctetString {
        return None;
    }

    let (_, basic) = sequence(octets.data)?;
    let (_, mut response_data) = sequence(basic)?;

    // optional [0] version, then responderID ([1] or [2]) and producedAt
    let (rest, mut element) = Any::from_der(response_data).ok()?;
    if element.class() == Class::ContextSpecific && element.tag() == Tag(0) {
        (response_data, element) = Any::from_der(rest).ok()?;
    } else {
        response_data = rest;
    }
    if element.class() != Class::ContextSpecific {
        return None;
    }
    let (rest, _produced_at) = GeneralizedTime::from_der(response_data).ok()?;

    let (_, responses) = sequence(rest)?;
    let (_, single) = sequence(responses)?;
    let (rest, _cert_id) = Any::from_der(single).ok()?;
    let (rest, _cert_status) = Any::from_der(rest).ok()?;
    let (rest, this_update) = GeneralizedTime::from_der(rest).ok()?;

    let next_update = match Any::from_der(rest) {
        Ok((_, tagged)) if tagged.class() == Class::ContextSpecific && tagged.tag() == Tag(0) => {
            let (_, next) = GeneralizedTime::from_der(tagged.data).ok()?;
            to_utc(&next)
        }
        _ => None,
    };

    Some(OcspValidity {
        this_update: to_utc(&this_update),
        next_update,
    })
}

/// Content of a SEQUENCE and what follows it.
fn sequence(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let (rest, any) = Any::from_der(input).ok()?;
    (any.tag() == Tag::Sequence).then_some((rest, any.data))
}

fn to_utc(time: &GeneralizedTime) -> Option<DateTime<Utc>> {
    let t = &time.0;
    NaiveDate::from_ymd_opt(t.year as i32, t.month.into(), t.day.into())?
        .and_hms_opt(t.hour.into(), t.minute.into(), t.second.into())
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Cache
// =============================================================================

pub type Fingerprint = [u8; 32];

/// SHA-256 over the DER encoding of a certificate.
pub fn certificate_fingerprint(cert: &CertificateDer<'_>) -> Fingerprint {
    Sha256::digest(cert.as_ref()).into()
}

#[derive(Debug)]
pub struct StapledResponse {
    pub der: Vec<u8>,
    pub validity: OcspValidity,
    pub loaded_at: DateTime<Utc>,
}

impl StapledResponse {
    /// Seconds since the response was loaded.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.loaded_at).num_seconds()
    }
}

/// Byte-bounded OCSP response cache.
#[derive(Clone)]
pub struct StaplingCache {
    spec: StaplingCacheSpec,
    entries: Cache<Fingerprint, Arc<StapledResponse>>,
}

impl fmt::Debug for StaplingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaplingCache")
            .field("spec", &self.spec)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl StaplingCache {
    pub fn new(spec: StaplingCacheSpec, timeout: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(spec.size_bytes)
            .weigher(|_key: &Fingerprint, value: &Arc<StapledResponse>| -> u32 {
                value.der.len().try_into().unwrap_or(u32::MAX)
            })
            .time_to_live(timeout)
            .build();

        Self { spec, entries }
    }

    pub fn spec(&self) -> &StaplingCacheSpec {
        &self.spec
    }

    pub fn insert(&self, fingerprint: Fingerprint, der: Vec<u8>) -> Result<(), StaplingError> {
        if der.len() as u64 > self.spec.size_bytes {
            return Err(StaplingError::TooLarge {
                size: der.len(),
                capacity: self.spec.size_bytes,
            });
        }
        let validity = validate_ocsp_response(&der)?;
        let now = Utc::now();
        if let Some(next_update) = validity.next_update.filter(|_| validity.is_expired(now)) {
            return Err(StaplingError::Expired { next_update });
        }

        self.entries.insert(
            fingerprint,
            Arc::new(StapledResponse {
                der,
                validity,
                loaded_at: now,
            }),
        );
        Ok(())
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<StapledResponse>> {
        self.entries.get(fingerprint)
    }
}

// =============================================================================
// Handshake-time resolver
// =============================================================================

/// Serves the configured certificate, stapling a cached OCSP response when one
/// is available.
#[derive(Debug)]
pub struct StaplingResolver {
    key: Arc<CertifiedKey>,
    fingerprint: Fingerprint,
    cache: Option<StaplingCache>,
}

impl StaplingResolver {
    pub fn new(key: Arc<CertifiedKey>, cache: Option<StaplingCache>) -> Self {
        let fingerprint = key
            .end_entity_cert()
            .map(certificate_fingerprint)
            .unwrap_or_default();
        Self {
            key,
            fingerprint,
            cache,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl ResolvesServerCert for StaplingResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let stapled = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(&self.fingerprint));

        match stapled {
            Some(response) => Some(Arc::new(CertifiedKey {
                cert: self.key.cert.clone(),
                key: self.key.key.clone(),
                ocsp: Some(response.der.clone()),
            })),
            None => Some(self.key.clone()),
        }
    }
}

// =============================================================================
// Refresh
// =============================================================================

/// Keeps the cache filled from the configured response file.
#[derive(Debug)]
pub struct Stapler {
    cache: StaplingCache,
    response_file: Option<PathBuf>,
    fingerprint: RwLock<Fingerprint>,
}

impl Stapler {
    pub fn new(cache: StaplingCache, response_file: Option<PathBuf>, fingerprint: Fingerprint) -> Self {
        if response_file.is_none() {
            tracing::warn!(
                cache = %cache.spec(),
                "OCSP stapling enabled without a response file; handshakes will not carry a stapled response"
            );
        }
        Self {
            cache,
            response_file,
            fingerprint: RwLock::new(fingerprint),
        }
    }

    pub fn cache(&self) -> &StaplingCache {
        &self.cache
    }

    /// Point the stapler at a new leaf certificate (after a reload).
    pub fn set_fingerprint(&self, fingerprint: Fingerprint) {
        match self.fingerprint.write() {
            Ok(mut current) => *current = fingerprint,
            Err(poisoned) => *poisoned.into_inner() = fingerprint,
        }
    }

    fn current_fingerprint(&self) -> Fingerprint {
        match self.fingerprint.read() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Reload the response file into the cache. A missing file source is not
    /// an error.
    pub async fn refresh(&self) -> Result<(), StaplingError> {
        let Some(path) = &self.response_file else {
            return Ok(());
        };

        let der = read_response(path).await?;
        let size = der.len();
        let fingerprint = self.current_fingerprint();
        self.cache.insert(fingerprint, der)?;

        let next_update = self
            .cache
            .get(&fingerprint)
            .and_then(|response| response.validity.next_update);
        tracing::info!(
            path = %path.display(),
            bytes = size,
            cache = %self.cache.spec(),
            next_update = ?next_update,
            "Loaded OCSP response"
        );
        Ok(())
    }

    /// Log how old the response still being stapled is.
    fn report_previous(&self) {
        let now = Utc::now();
        match self.cache.get(&self.current_fingerprint()) {
            Some(previous) if previous.validity.is_expired(now) => tracing::warn!(
                age_secs = previous.age_secs(now),
                next_update = ?previous.validity.next_update,
                "Stapled OCSP response is past its nextUpdate"
            ),
            Some(previous) => tracing::info!(
                age_secs = previous.age_secs(now),
                "Keeping previous OCSP response"
            ),
            None => tracing::warn!("No OCSP response to staple"),
        }
    }

    /// Refresh on a fixed interval; failures keep the previous response.
    pub fn spawn_refresher(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately and startup already refreshed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    tracing::warn!(error = %e, "OCSP response refresh failed");
                    self.report_previous();
                }
            }
        })
    }
}

async fn read_response(path: &Path) -> Result<Vec<u8>, StaplingError> {
    tokio::fs::read(path).await.map_err(|source| StaplingError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest structurally valid successful response.
    const SUCCESSFUL: [u8; 10] = [0x30, 0x08, 0x0a, 0x01, 0x00, 0xa0, 0x03, 0x30, 0x01, 0x00];

    #[test]
    fn test_parse_spec_from_httpd_config() {
        let spec: StaplingCacheSpec = "\"shmcb:logs/ssl_stapling(32768)\"".parse().unwrap();
        assert_eq!(spec.backend, CacheBackend::Shmcb);
        assert_eq!(spec.name, "logs/ssl_stapling");
        assert_eq!(spec.size_bytes, 32768);
        assert_eq!(spec.to_string(), "shmcb:logs/ssl_stapling(32768)");
    }

    #[test]
    fn test_parse_spec_default_size() {
        let spec: StaplingCacheSpec = "shmcb:/var/run/stapling".parse().unwrap();
        assert_eq!(spec.size_bytes, DEFAULT_SHMCB_SIZE);
    }

    #[test]
    fn test_parse_spec_errors() {
        assert!("dbm:/tmp/x".parse::<StaplingCacheSpec>().is_err());
        assert!("shmcb:(100)".parse::<StaplingCacheSpec>().is_err());
        assert!("shmcb:logs/x(abc)".parse::<StaplingCacheSpec>().is_err());
        assert!("shmcb:logs/x(0)".parse::<StaplingCacheSpec>().is_err());
        assert!("logs/x".parse::<StaplingCacheSpec>().is_err());
    }

    #[test]
    fn test_validate_successful_response() {
        assert_eq!(validate_ocsp_response(&SUCCESSFUL).unwrap(), OcspValidity::default());
    }

    #[test]
    fn test_validate_rejects_error_status() {
        let try_later = [0x30, 0x03, 0x0a, 0x01, 0x03];
        match validate_ocsp_response(&try_later) {
            Err(StaplingError::Status(OcspResponseStatus::TryLater)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_bad_envelopes() {
        assert!(validate_ocsp_response(&[]).is_err());
        assert!(validate_ocsp_response(&[0x04, 0x00]).is_err());
        // Declared length longer than the buffer.
        assert!(validate_ocsp_response(&[0x30, 0x09, 0x0a, 0x01, 0x00]).is_err());
        // Successful without responseBytes.
        assert!(validate_ocsp_response(&[0x30, 0x03, 0x0a, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_validate_long_form_length() {
        let mut der = vec![0x30, 0x81, 0x86, 0x0a, 0x01, 0x00, 0xa0, 0x81, 0x80];
        der.extend(std::iter::repeat(0u8).take(0x80));
        assert_eq!(der.len(), 3 + 0x86);
        assert!(validate_ocsp_response(&der).is_ok());
    }

    /// DER TLV with short or long form length.
    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        match content.len() {
            len @ 0..=0x7f => out.push(len as u8),
            len @ 0x80..=0xff => out.extend([0x81, len as u8]),
            len => out.extend([0x82, (len >> 8) as u8, len as u8]),
        }
        out.extend_from_slice(content);
        out
    }

    fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
        tlv(0x30, &parts.concat())
    }

    fn time(value: &str) -> Vec<u8> {
        tlv(0x18, value.as_bytes())
    }

    /// A basic response with one SingleResponse; the signature is not real.
    fn basic_response(this_update: &str, next_update: Option<&str>) -> Vec<u8> {
        let sha1 = seq(&[tlv(0x06, &[0x2b, 0x0e, 0x03, 0x02, 0x1a]), vec![0x05, 0x00]]);
        let cert_id = seq(&[sha1, tlv(0x04, &[1; 20]), tlv(0x04, &[2; 20]), tlv(0x02, &[0x01])]);
        let mut single = vec![cert_id, vec![0x80, 0x00], time(this_update)];
        if let Some(next) = next_update {
            single.push(tlv(0xa0, &time(next)));
        }
        let response_data = seq(&[
            tlv(0xa2, &tlv(0x04, &[3; 20])),
            time(this_update),
            seq(&[seq(&single)]),
        ]);
        let ecdsa_sha256 = seq(&[tlv(0x06, &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02])]);
        let basic = seq(&[response_data, ecdsa_sha256, tlv(0x03, &[0x00, 0x01])]);
        let id_pkix_ocsp_basic = tlv(0x06, &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, 0x01]);
        let response_bytes = seq(&[id_pkix_ocsp_basic, tlv(0x04, &basic)]);
        seq(&[tlv(0x0a, &[0x00]), tlv(0xa0, &response_bytes)])
    }

    #[test]
    fn test_validity_window_of_basic_response() {
        let der = basic_response("20250101000000Z", Some("20250108000000Z"));
        let validity = validate_ocsp_response(&der).unwrap();
        assert_eq!(validity.this_update.unwrap().to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(validity.next_update.unwrap().to_rfc3339(), "2025-01-08T00:00:00+00:00");
        assert!(validity.is_expired(Utc::now()));

        let open_ended = validate_ocsp_response(&basic_response("20250101000000Z", None)).unwrap();
        assert!(open_ended.this_update.is_some());
        assert!(!open_ended.is_expired(Utc::now()));
    }

    #[test]
    fn test_cache_rejects_expired_response() {
        let spec: StaplingCacheSpec = "shmcb:logs/ssl_stapling(32768)".parse().unwrap();
        let cache = StaplingCache::new(spec, Duration::from_secs(60));

        let stale = basic_response("20250101000000Z", Some("20250108000000Z"));
        assert!(matches!(
            cache.insert([5; 32], stale),
            Err(StaplingError::Expired { .. })
        ));
        assert!(cache.get(&[5; 32]).is_none());

        let fresh = basic_response("20250101000000Z", Some("99991231235959Z"));
        cache.insert([5; 32], fresh).unwrap();
        let stapled = cache.get(&[5; 32]).unwrap();
        assert!(stapled.validity.next_update.is_some());
        assert!(stapled.age_secs(Utc::now()) >= 0);
    }

    #[test]
    fn test_cache_rejects_oversized_response() {
        let spec = StaplingCacheSpec {
            backend: CacheBackend::Shmcb,
            name: "test".to_string(),
            size_bytes: 8,
        };
        let cache = StaplingCache::new(spec, Duration::from_secs(60));
        match cache.insert([1; 32], SUCCESSFUL.to_vec()) {
            Err(StaplingError::TooLarge { size: 10, capacity: 8 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let spec: StaplingCacheSpec = "shmcb:logs/ssl_stapling(32768)".parse().unwrap();
        let cache = StaplingCache::new(spec, Duration::from_secs(60));
        cache.insert([7; 32], SUCCESSFUL.to_vec()).unwrap();
        assert_eq!(cache.get(&[7; 32]).unwrap().der, SUCCESSFUL.to_vec());
        assert!(cache.get(&[8; 32]).is_none());
    }

    #[tokio::test]
    async fn test_stapler_refresh_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocsp.der");
        std::fs::write(&path, SUCCESSFUL).unwrap();

        let spec: StaplingCacheSpec = "shmcb:logs/ssl_stapling(32768)".parse().unwrap();
        let cache = StaplingCache::new(spec, Duration::from_secs(60));
        let stapler = Stapler::new(cache, Some(path.clone()), [3; 32]);
        stapler.refresh().await.unwrap();
        assert!(stapler.cache().get(&[3; 32]).is_some());

        stapler.set_fingerprint([4; 32]);
        std::fs::write(&path, [0x30, 0x03, 0x0a, 0x01, 0x06]).unwrap();
        assert!(stapler.refresh().await.is_err());
        assert!(stapler.cache().get(&[4; 32]).is_none());
        assert!(stapler.cache().get(&[3; 32]).is_some());
    }

    #[tokio::test]
    async fn test_stapler_without_file_is_noop() {
        let spec: StaplingCacheSpec = "shmcb:x(100)".parse().unwrap();
        let stapler = Stapler::new(StaplingCache::new(spec, Duration::from_secs(1)), None, [0; 32]);
        assert!(stapler.refresh().await.is_ok());
    }
}
