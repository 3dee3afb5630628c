//! Cipher suite names and resolution.
//!
//! Configuration speaks OpenSSL names (`ECDHE-RSA-AES128-GCM-SHA256`) the way
//! httpd's `SSLCipherSuite` does; IANA names are accepted too. Resolution keeps
//! the configured order and drops names the engine cannot negotiate.

use std::collections::HashSet;

use rustls::crypto::CryptoProvider;
use rustls::{CipherSuite, SupportedCipherSuite};

use super::protocols::TlsVersion;
use super::TlsError;

/// One row of the cipher name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherDescriptor {
    pub openssl: &'static str,
    pub iana: &'static str,
    pub code: u16,
    /// TLS 1.3 suites only run under TLS 1.3; everything else needs <= TLS 1.2.
    pub tls13: bool,
}

const fn suite(openssl: &'static str, iana: &'static str, code: u16, tls13: bool) -> CipherDescriptor {
    CipherDescriptor {
        openssl,
        iana,
        code,
        tls13,
    }
}

pub static CIPHER_TABLE: &[CipherDescriptor] = &[
    suite("TLS_AES_128_GCM_SHA256", "TLS_AES_128_GCM_SHA256", 0x1301, true),
    suite("TLS_AES_256_GCM_SHA384", "TLS_AES_256_GCM_SHA384", 0x1302, true),
    suite("TLS_CHACHA20_POLY1305_SHA256", "TLS_CHACHA20_POLY1305_SHA256", 0x1303, true),
    suite("ECDHE-ECDSA-AES128-GCM-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", 0xC02B, false),
    suite("ECDHE-RSA-AES128-GCM-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", 0xC02F, false),
    suite("ECDHE-ECDSA-AES256-GCM-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", 0xC02C, false),
    suite("ECDHE-RSA-AES256-GCM-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", 0xC030, false),
    suite("ECDHE-ECDSA-CHACHA20-POLY1305", "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", 0xCCA9, false),
    suite("ECDHE-RSA-CHACHA20-POLY1305", "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", 0xCCA8, false),
    suite("DHE-RSA-AES128-GCM-SHA256", "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256", 0x009E, false),
    suite("DHE-RSA-AES256-GCM-SHA384", "TLS_DHE_RSA_WITH_AES_256_GCM_SHA384", 0x009F, false),
    suite("DHE-RSA-CHACHA20-POLY1305", "TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256", 0xCCAA, false),
    suite("ECDHE-ECDSA-AES128-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256", 0xC023, false),
    suite("ECDHE-RSA-AES128-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", 0xC027, false),
    suite("ECDHE-ECDSA-AES128-SHA", "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", 0xC009, false),
    suite("ECDHE-RSA-AES128-SHA", "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", 0xC013, false),
    suite("ECDHE-ECDSA-AES256-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384", 0xC024, false),
    suite("ECDHE-RSA-AES256-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384", 0xC028, false),
    suite("ECDHE-ECDSA-AES256-SHA", "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", 0xC00A, false),
    suite("ECDHE-RSA-AES256-SHA", "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", 0xC014, false),
    suite("DHE-RSA-AES128-SHA256", "TLS_DHE_RSA_WITH_AES_128_CBC_SHA256", 0x0067, false),
    suite("DHE-RSA-AES256-SHA256", "TLS_DHE_RSA_WITH_AES_256_CBC_SHA256", 0x006B, false),
    suite("DHE-RSA-AES128-SHA", "TLS_DHE_RSA_WITH_AES_128_CBC_SHA", 0x0033, false),
    suite("DHE-RSA-AES256-SHA", "TLS_DHE_RSA_WITH_AES_256_CBC_SHA", 0x0039, false),
    suite("AES128-GCM-SHA256", "TLS_RSA_WITH_AES_128_GCM_SHA256", 0x009C, false),
    suite("AES256-GCM-SHA384", "TLS_RSA_WITH_AES_256_GCM_SHA384", 0x009D, false),
    suite("AES128-SHA256", "TLS_RSA_WITH_AES_128_CBC_SHA256", 0x003C, false),
    suite("AES256-SHA256", "TLS_RSA_WITH_AES_256_CBC_SHA256", 0x003D, false),
    suite("AES128-SHA", "TLS_RSA_WITH_AES_128_CBC_SHA", 0x002F, false),
    suite("AES256-SHA", "TLS_RSA_WITH_AES_256_CBC_SHA", 0x0035, false),
    suite("DES-CBC3-SHA", "TLS_RSA_WITH_3DES_EDE_CBC_SHA", 0x000A, false),
];

/// TLS 1.3 suites, in the order httpd enables them by default.
pub const DEFAULT_TLS13_CIPHERS: [&str; 3] = [
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
];

/// Look up a suite by OpenSSL or IANA name (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static CipherDescriptor> {
    CIPHER_TABLE
        .iter()
        .find(|d| d.openssl.eq_ignore_ascii_case(name) || d.iana.eq_ignore_ascii_case(name))
}

/// OpenSSL name for a negotiated suite, falling back to the rustls debug name.
pub fn openssl_name(suite: CipherSuite) -> String {
    let code = u16::from(suite);
    CIPHER_TABLE
        .iter()
        .find(|d| d.code == code)
        .map(|d| d.openssl.to_string())
        .unwrap_or_else(|| format!("{:?}", suite))
}

/// Split an `SSLCipherSuite` value into names.
pub fn parse_cipher_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ':' || c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve configured names into engine suites.
///
/// TLS 1.3 suites come first (they never compete with TLS 1.2 suites in a
/// handshake), followed by the TLS 1.2 list in configured order.
pub fn resolve_cipher_suites(
    ciphers: &[String],
    tls13_ciphers: &[String],
    versions: &[TlsVersion],
    provider: &CryptoProvider,
) -> Result<Vec<SupportedCipherSuite>, TlsError> {
    let tls12_enabled = versions.contains(&TlsVersion::Tls12);
    let tls13_enabled = versions.contains(&TlsVersion::Tls13);

    let mut resolved = Vec::new();
    let mut seen = HashSet::new();

    let sources = [(tls13_ciphers, true), (ciphers, false)];
    for (names, expect_tls13) in sources {
        for name in names {
            let Some(descriptor) = lookup(name) else {
                tracing::warn!(cipher = %name, "Unknown cipher suite name, skipping");
                continue;
            };

            if descriptor.tls13 != expect_tls13 {
                tracing::warn!(
                    cipher = %name,
                    "Cipher suite listed for the wrong protocol family, skipping"
                );
                continue;
            }

            let version_enabled = if descriptor.tls13 { tls13_enabled } else { tls12_enabled };
            if !version_enabled {
                tracing::debug!(cipher = %name, "Cipher suite needs a disabled protocol version, skipping");
                continue;
            }

            let wanted = CipherSuite::from(descriptor.code);
            let Some(found) = provider
                .cipher_suites
                .iter()
                .find(|s| s.suite() == wanted)
            else {
                tracing::debug!(cipher = %name, "Cipher suite not implemented by the TLS engine, skipping");
                continue;
            };

            if seen.insert(descriptor.code) {
                resolved.push(*found);
            }
        }
    }

    if resolved.is_empty() {
        return Err(TlsError::Cipher(
            "no configured cipher suite can be negotiated".to_string(),
        ));
    }

    Ok(resolved)
}
