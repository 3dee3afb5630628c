//! Leaf certificate checks.

use std::net::IpAddr;

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use x509_parser::der_parser::Oid;
use x509_parser::objects::{oid2sn, oid_registry};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use super::{MozillaProfile, ProfileError};

const SECONDS_PER_DAY: i64 = 86_400;

/// Certificate properties the guidelines talk about, with guideline names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub lifespan_days: i64,
    /// `rsa`, `ecdsa`, `ed25519`, `ed448`, `dsa`, or the registry name
    pub key_type: String,
    pub rsa_key_size: Option<usize>,
    /// `prime256v1`, `secp384r1`, ...
    pub curve: Option<String>,
    /// `sha256WithRSAEncryption`, `ecdsa-with-SHA256`, ...
    pub signature: String,
}

impl CertificateSummary {
    pub fn parse(der: &[u8]) -> Result<Self, ProfileError> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| ProfileError::Certificate(format!("cannot parse certificate: {}", e)))?;

        let validity = cert.validity();
        let lifespan_days =
            (validity.not_after.timestamp() - validity.not_before.timestamp()) / SECONDS_PER_DAY;

        let spki = cert.public_key();
        let key_type = key_type_name(&spki.algorithm.algorithm);

        let rsa_key_size = match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => Some(rsa.key_size()),
            _ => None,
        };

        let curve = if key_type == "ecdsa" {
            spki.algorithm
                .parameters
                .as_ref()
                .and_then(|params| params.as_oid().ok())
                .map(|oid| oid_name(&oid))
        } else {
            None
        };

        let signature = oid_name(&cert.signature_algorithm.algorithm);

        Ok(Self {
            lifespan_days,
            key_type,
            rsa_key_size,
            curve,
            signature,
        })
    }
}

/// Profile violations of a leaf certificate.
pub fn check_certificate_properties(
    cert: &CertificateSummary,
    profile: &MozillaProfile,
    ocsp_stapled: bool,
) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(max_days) = profile.maximum_certificate_lifespan {
        if cert.lifespan_days > max_days as i64 {
            errors.push(format!(
                "certificate lifespan too long ({} days, at most {})",
                cert.lifespan_days, max_days
            ));
        }
    }

    if !profile.certificate_types.iter().any(|t| t == &cert.key_type) {
        errors.push(format!("wrong certificate type ({})", cert.key_type));
    }

    match (cert.rsa_key_size, profile.rsa_key_size, &cert.curve) {
        (Some(bits), Some(expected), _) if bits != expected as usize => {
            errors.push(format!(
                "RSA certificate has wrong key size ({} bits, expected {})",
                bits, expected
            ));
        }
        (None, _, Some(curve))
            if !profile.certificate_curves.is_empty()
                && !profile.certificate_curves.contains(curve) =>
        {
            errors.push(format!("ECDSA certificate uses wrong curve ({})", curve));
        }
        _ => {}
    }

    if !profile.certificate_signatures.contains(&cert.signature) {
        errors.push(format!("certificate has a wrong signature ({})", cert.signature));
    }

    if profile.ocsp_staple && !ocsp_stapled {
        errors.push("OCSP stapling must be supported".to_string());
    }

    errors
}

/// First certificate of a PEM bundle, as DER.
pub(crate) fn first_certificate(pem: &[u8]) -> Result<Vec<u8>, ProfileError> {
    let cert = CertificateDer::pem_slice_iter(pem)
        .next()
        .ok_or_else(|| ProfileError::Certificate("no certificate in PEM data".to_string()))?
        .map_err(|e| ProfileError::Certificate(e.to_string()))?;
    Ok(cert.as_ref().to_vec())
}

/// Short name from the OID registry, dotted form when unknown.
fn oid_name(oid: &Oid<'_>) -> String {
    oid2sn(oid, oid_registry())
        .map(str::to_string)
        .unwrap_or_else(|_| oid.to_id_string())
}

/// Guideline vocabulary for a public key algorithm.
fn key_type_name(oid: &Oid<'_>) -> String {
    let name = oid_name(oid);
    match name.as_str() {
        "rsaEncryption" => "rsa".to_string(),
        "id-ecPublicKey" => "ecdsa".to_string(),
        "id-dsa" => "dsa".to_string(),
        _ => name,
    }
}

fn is_sha1_signature(name: &str) -> bool {
    matches!(
        name,
        "sha1WithRSAEncryption" | "ecdsa-with-SHA1" | "dsa-with-sha1"
    )
}

/// Minimum number of embedded SCTs a publicly trusted leaf should carry.
const MIN_SCTS: usize = 2;

/// Problems with the chain as the server sent it, leaf first.
pub fn check_received_chain(chain: &[Vec<u8>], host: &str) -> Result<Vec<String>, ProfileError> {
    let certs = chain
        .iter()
        .map(|der| {
            parse_x509_certificate(der)
                .map(|(_, cert)| cert)
                .map_err(|e| ProfileError::Certificate(format!("cannot parse certificate: {}", e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some(leaf) = certs.first() else {
        return Ok(vec!["server sent no certificate".to_string()]);
    };

    let mut errors = Vec::new();

    if !matches_host(leaf, host) {
        errors.push("leaf certificate subject does not match hostname".to_string());
    }

    let ordered = certs
        .windows(2)
        .all(|pair| pair[0].issuer().as_raw() == pair[1].subject().as_raw());
    if !ordered {
        errors.push("certificate chain has wrong order".to_string());
    }

    // a root's self-signature is never checked by clients
    let sha1 = certs
        .iter()
        .filter(|cert| cert.subject().as_raw() != cert.issuer().as_raw())
        .any(|cert| is_sha1_signature(&oid_name(&cert.signature_algorithm.algorithm)));
    if sha1 {
        errors.push("SHA1 signature found in chain".to_string());
    }

    let scts: usize = leaf
        .extensions()
        .iter()
        .map(|ext| match ext.parsed_extension() {
            ParsedExtension::SCT(list) => list.len(),
            _ => 0,
        })
        .sum();
    if scts < MIN_SCTS {
        errors.push(format!("not enough SCTs in certificate, only found {}", scts));
    }

    Ok(errors)
}

/// DNS names from subjectAltName (common names when there is none) or IP
/// addresses, compared the way browsers do.
fn matches_host(cert: &X509Certificate<'_>, host: &str) -> bool {
    let ip: Option<IpAddr> = host.parse().ok();

    let san = match cert.subject_alternative_name() {
        Ok(Some(san)) => Some(san.value.general_names.clone()),
        _ => None,
    };

    match san {
        Some(names) => names.iter().any(|name| match (name, ip) {
            (GeneralName::DNSName(dns), None) => dns_matches(dns, host),
            (GeneralName::IPAddress(octets), Some(IpAddr::V4(v4))) => *octets == v4.octets(),
            (GeneralName::IPAddress(octets), Some(IpAddr::V6(v6))) => *octets == v6.octets(),
            _ => false,
        }),
        None => cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .any(|cn| dns_matches(cn, host)),
    }
}

/// `*.example.com` covers exactly one label.
fn dns_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let host = host.trim_end_matches('.');
    match pattern.strip_prefix("*.") {
        Some(suffix) => match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        },
        None => pattern.eq_ignore_ascii_case(host),
    }
}
