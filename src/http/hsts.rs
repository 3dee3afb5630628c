//! Strict-Transport-Security header.

use axum::http::header::STRICT_TRANSPORT_SECURITY;
use axum::http::HeaderValue;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{HstsConfig, DEFAULT_HSTS_HEADER};

impl HstsConfig {
    /// `max-age=N[; includeSubDomains][; preload]`
    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.max_age_seconds);
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }
        value
    }

    /// Parse a header value into an enabled policy.
    pub fn from_header_value(value: &str) -> Result<Self, String> {
        let mut max_age = None;
        let mut include_subdomains = false;
        let mut preload = false;

        for directive in value.split(';').map(str::trim).filter(|d| !d.is_empty()) {
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (directive, None),
            };

            if name.eq_ignore_ascii_case("max-age") {
                let arg = arg.ok_or_else(|| "max-age needs a value".to_string())?;
                let seconds = arg
                    .parse::<u64>()
                    .map_err(|_| format!("max-age '{}' is not a number", arg))?;
                if max_age.replace(seconds).is_some() {
                    return Err("max-age given twice".to_string());
                }
            } else if name.eq_ignore_ascii_case("includeSubDomains") {
                include_subdomains = true;
            } else if name.eq_ignore_ascii_case("preload") {
                preload = true;
            } else {
                tracing::debug!(directive = %name, "Ignoring unknown HSTS directive");
            }
        }

        let max_age_seconds = max_age.ok_or_else(|| "missing max-age".to_string())?;
        Ok(Self {
            enabled: true,
            max_age_seconds,
            include_subdomains,
            preload,
        })
    }

    /// Max-age of a header observed on a live server.
    pub fn max_age_of(value: &str) -> Option<u64> {
        Self::from_header_value(value).ok().map(|p| p.max_age_seconds)
    }
}

/// Layer setting the header on every response, errors included.
pub fn hsts_layer(policy: &HstsConfig) -> Option<SetResponseHeaderLayer<HeaderValue>> {
    if !policy.enabled {
        return None;
    }

    if *policy == HstsConfig::default() {
        return Some(SetResponseHeaderLayer::overriding(
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(DEFAULT_HSTS_HEADER),
        ));
    }

    match HeaderValue::from_str(&policy.header_value()) {
        Ok(value) => Some(SetResponseHeaderLayer::overriding(STRICT_TRANSPORT_SECURITY, value)),
        Err(e) => {
            tracing::error!(error = %e, "HSTS header value is not a valid header");
            None
        }
    }
}
