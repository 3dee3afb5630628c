//! Plaintext listener that redirects to HTTPS.
//!
//! Requests are answered by the first matching rewrite rule. Rules follow the
//! `RewriteRule pattern target [flags]` form: the pattern is matched against
//! the URL path, the target may use `$0`..`$9` and `%{VAR}`, and the `R` flag
//! picks the status code.

use std::sync::Arc;

use axum::http::header::{HOST, LOCATION};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{middleware, Router};
use regex::Regex;

use crate::config::RewriteRuleConfig;
use crate::error::FrontendError;
use crate::middleware::{request_id_layer, Listener};

/// Rewrite rule error
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown variable %{{{0}}} in target")]
    Variable(String),

    #[error("Unterminated %{{ in target '{0}'")]
    Target(String),

    #[error("Unsupported flag '{0}'")]
    Flag(String),

    #[error("Status {0} is not a redirect (expected 301, 302, 303, 307 or 308)")]
    Status(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    HttpHost,
    ServerName,
    RequestUri,
    QueryString,
}

impl Variable {
    fn parse(name: &str) -> Result<Self, RewriteError> {
        match name.to_ascii_uppercase().as_str() {
            "HTTP_HOST" => Ok(Self::HttpHost),
            "SERVER_NAME" => Ok(Self::ServerName),
            "REQUEST_URI" => Ok(Self::RequestUri),
            "QUERY_STRING" => Ok(Self::QueryString),
            _ => Err(RewriteError::Variable(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(Variable),
    Capture(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryMode {
    /// Append the request query unless the target has its own
    Default,
    /// `QSA`: always append
    Append,
    /// `QSD`: never append
    Discard,
}

/// A compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    target: Vec<Segment>,
    target_has_query: bool,
    status: StatusCode,
    query: QueryMode,
}

/// Redirect produced by a matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

impl IntoResponse for Redirect {
    fn into_response(self) -> Response {
        (self.status, [(LOCATION, self.location)]).into_response()
    }
}

/// Request values available to a target.
struct RequestVars<'a> {
    host: &'a str,
    path: &'a str,
    query: Option<&'a str>,
}

impl RequestVars<'_> {
    fn get(&self, var: Variable) -> &str {
        match var {
            Variable::HttpHost => self.host,
            Variable::ServerName => strip_port(self.host),
            Variable::RequestUri => self.path,
            Variable::QueryString => self.query.unwrap_or(""),
        }
    }
}

impl RewriteRule {
    pub fn new(pattern: &str, target: &str, flags: &str) -> Result<Self, RewriteError> {
        let regex = Regex::new(pattern).map_err(|source| RewriteError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        // httpd redirects with 302 when R carries no code, and treats an
        // absolute target as an implied redirect.
        let mut status = StatusCode::FOUND;
        let mut query = QueryMode::Default;

        for flag in flags.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (name, value) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (flag, None),
            };
            match name.to_ascii_uppercase().as_str() {
                "R" | "REDIRECT" => {
                    if let Some(value) = value {
                        status = redirect_status(value)?;
                    }
                }
                // every rule redirects, so a match always ends processing
                "L" | "LAST" => {}
                "QSD" | "QSDISCARD" => query = QueryMode::Discard,
                "QSA" | "QSAPPEND" => query = QueryMode::Append,
                _ => return Err(RewriteError::Flag(flag.to_string())),
            }
        }

        let segments = parse_target(target)?;
        let target_has_query = segments
            .iter()
            .any(|s| matches!(s, Segment::Literal(text) if text.contains('?')));

        Ok(Self {
            pattern: regex,
            target: segments,
            target_has_query,
            status,
            query,
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn apply(&self, vars: &RequestVars<'_>) -> Option<Redirect> {
        let captures = self.pattern.captures(vars.path)?;

        let mut location = String::new();
        for segment in &self.target {
            match segment {
                Segment::Literal(text) => location.push_str(text),
                Segment::Var(var) => location.push_str(vars.get(*var)),
                Segment::Capture(index) => {
                    if let Some(m) = captures.get(*index) {
                        location.push_str(m.as_str());
                    }
                }
            }
        }

        let append = match self.query {
            QueryMode::Discard => false,
            QueryMode::Append => true,
            QueryMode::Default => !self.target_has_query,
        };
        if let Some(query) = vars.query.filter(|q| append && !q.is_empty()) {
            location.push(if location.contains('?') { '&' } else { '?' });
            location.push_str(query);
        }

        Some(Redirect {
            status: self.status,
            location,
        })
    }
}

/// Ordered rule set; the first match answers.
#[derive(Debug, Clone)]
pub struct RedirectRules {
    rules: Vec<RewriteRule>,
}

impl RedirectRules {
    pub fn from_config(rules: &[RewriteRuleConfig]) -> Result<Self, RewriteError> {
        let rules = rules
            .iter()
            .map(|r| RewriteRule::new(&r.pattern, &r.target, &r.flags))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Redirect for a request, `None` when no rule matches.
    pub fn apply(&self, host: &str, uri: &Uri) -> Option<Redirect> {
        let vars = RequestVars {
            host,
            path: uri.path(),
            query: uri.query(),
        };
        self.rules.iter().find_map(|rule| rule.apply(&vars))
    }
}

fn redirect_status(value: &str) -> Result<StatusCode, RewriteError> {
    let code = match value.to_ascii_lowercase().as_str() {
        "permanent" => 301,
        "temp" => 302,
        "seeother" => 303,
        other => other
            .parse::<u16>()
            .map_err(|_| RewriteError::Status(value.to_string()))?,
    };
    match code {
        301 | 302 | 303 | 307 | 308 => {
            StatusCode::from_u16(code).map_err(|_| RewriteError::Status(value.to_string()))
        }
        _ => Err(RewriteError::Status(value.to_string())),
    }
}

fn parse_target(target: &str) -> Result<Vec<Segment>, RewriteError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = target.chars().peekable();

    let flush = |literal: &mut String, segments: &mut Vec<Segment>| {
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(literal)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    literal.push(next);
                }
            }
            '$' if chars.peek().is_some_and(|d| d.is_ascii_digit()) => {
                let digit = chars.next().and_then(|d| d.to_digit(10)).unwrap_or(0);
                flush(&mut literal, &mut segments);
                segments.push(Segment::Capture(digit as usize));
            }
            '%' if chars.peek() == Some(&'{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if !closed {
                    return Err(RewriteError::Target(target.to_string()));
                }
                flush(&mut literal, &mut segments);
                segments.push(Segment::Var(Variable::parse(&name)?));
            }
            _ => literal.push(c),
        }
    }
    flush(&mut literal, &mut segments);

    Ok(segments)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

/// Router answering every request from the rule set.
pub fn redirect_router(rules: RedirectRules) -> Router {
    let rules = Arc::new(rules);
    Router::new()
        .fallback(any(move |headers: HeaderMap, uri: Uri| {
            let rules = Arc::clone(&rules);
            async move { redirect_request(&rules, request_host(&headers, &uri), uri) }
        }))
        .layer(middleware::from_fn_with_state(Listener::Redirect, request_id_layer))
}

/// The `Host` header, or the authority of an absolute-form request target.
/// Forwarding headers are never consulted: they are client-controlled.
fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|authority| authority.as_str().to_string()))
}

fn redirect_request(rules: &RedirectRules, host: Option<String>, uri: Uri) -> Result<Redirect, FrontendError> {
    let Some(host) = host else {
        tracing::debug!(%uri, "Request without Host header");
        return Err(FrontendError::BadRequest("missing Host header".to_string()));
    };

    let redirect = rules
        .apply(&host, &uri)
        .ok_or_else(|| FrontendError::NotFound(uri.path().to_string()))?;
    tracing::debug!(from = %uri, to = %redirect.location, status = redirect.status.as_u16(), "Redirecting");
    Ok(redirect)
}
