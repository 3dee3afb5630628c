//! Protocol version selection.
//!
//! Accepts the httpd `SSLProtocol` expression language (`all`, `+TLSv1.2`,
//! `-TLSv1`, bare keywords) and narrows the resulting set to the versions the
//! TLS engine can actually negotiate.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rustls::SupportedProtocolVersion;

use super::TlsError;

/// A TLS/SSL protocol version as named by OpenSSL and the Mozilla guidelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Ssl3,
    Tls1,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Versions enabled by the `all` keyword.
    pub const ALL: [TlsVersion; 4] = [
        TlsVersion::Tls1,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
        TlsVersion::Tls13,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Ssl3 => "SSLv3",
            TlsVersion::Tls1 => "TLSv1",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }

    /// The rustls version descriptor, if the engine implements this version.
    pub fn rustls_version(&self) -> Option<&'static SupportedProtocolVersion> {
        match self {
            TlsVersion::Tls12 => Some(&rustls::version::TLS12),
            TlsVersion::Tls13 => Some(&rustls::version::TLS13),
            _ => None,
        }
    }

    pub fn from_rustls(version: rustls::ProtocolVersion) -> Option<Self> {
        match version {
            rustls::ProtocolVersion::SSLv3 => Some(TlsVersion::Ssl3),
            rustls::ProtocolVersion::TLSv1_0 => Some(TlsVersion::Tls1),
            rustls::ProtocolVersion::TLSv1_1 => Some(TlsVersion::Tls11),
            rustls::ProtocolVersion::TLSv1_2 => Some(TlsVersion::Tls12),
            rustls::ProtocolVersion::TLSv1_3 => Some(TlsVersion::Tls13),
            _ => None,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sslv3" => Ok(TlsVersion::Ssl3),
            "tlsv1" | "tlsv1.0" => Ok(TlsVersion::Tls1),
            "tlsv1.1" => Ok(TlsVersion::Tls11),
            "tlsv1.2" => Ok(TlsVersion::Tls12),
            "tlsv1.3" => Ok(TlsVersion::Tls13),
            "sslv2" => Err(TlsError::Protocol(
                "SSLv2 is no longer supported".to_string(),
            )),
            _ => Err(TlsError::Protocol(format!("unknown protocol '{}'", s))),
        }
    }
}

/// Evaluate an `SSLProtocol` expression into a set of versions.
///
/// `+X` adds, `-X` removes, and a keyword without a sign replaces whatever was
/// accumulated so far.
pub fn parse_protocol_expression(expr: &str) -> Result<BTreeSet<TlsVersion>, TlsError> {
    let mut set = BTreeSet::new();
    let mut seen_token = false;

    for token in expr.split_whitespace() {
        let (op, name) = match token.as_bytes()[0] {
            b'+' => (Some(true), &token[1..]),
            b'-' => (Some(false), &token[1..]),
            _ => (None, token),
        };

        let versions: Vec<TlsVersion> = if name.eq_ignore_ascii_case("all") {
            TlsVersion::ALL.to_vec()
        } else {
            vec![name.parse()?]
        };

        match op {
            Some(true) => set.extend(versions),
            Some(false) => {
                for v in versions {
                    set.remove(&v);
                }
            }
            None => {
                if seen_token {
                    tracing::warn!(
                        protocol = %name,
                        "SSLProtocol keyword without +/- overrides earlier settings"
                    );
                }
                set = versions.into_iter().collect();
            }
        }
        seen_token = true;
    }

    if !seen_token {
        return Err(TlsError::Protocol("empty protocol expression".to_string()));
    }

    Ok(set)
}

/// Narrow a version set to what the TLS engine implements, preserving
/// newest-first order.
pub fn negotiable_versions(
    set: &BTreeSet<TlsVersion>,
) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    let mut versions = Vec::new();
    for version in set.iter().rev() {
        match version.rustls_version() {
            Some(v) => versions.push(v),
            None => {
                tracing::info!(protocol = %version, "Protocol not implemented by the TLS engine, skipping");
            }
        }
    }

    if versions.is_empty() {
        return Err(TlsError::Protocol(
            "none of the configured protocols can be negotiated (TLSv1.2 or TLSv1.3 required)"
                .to_string(),
        ));
    }

    Ok(versions)
}
