//! Mapping httpd directives onto `AppConfig`.
//!
//! Starts from httpd's own defaults (no HSTS, no stapling, session tickets on,
//! `SSLProtocol all -SSLv3`, `Protocols http/1.1`) so that a file only gets what
//! it asks for.

use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::{AppConfig, HstsConfig, RewriteRuleConfig};
use crate::tls::ciphers::parse_cipher_list;

use super::lexer::{Directive, Node, Section};
use super::ImportError;

/// Directives that carry no front-end meaning.
const INFORMATIONAL: [&str; 8] = [
    "ServerName",
    "ServerAlias",
    "ServerAdmin",
    "ErrorLog",
    "CustomLog",
    "LogLevel",
    "LoadModule",
    "SSLStaplingResponderTimeout",
];

struct Importer {
    config: AppConfig,
    listen_ports: Vec<u16>,
    global_tls: bool,
    tls_vhost_found: bool,
}

pub fn import(nodes: &[Node]) -> Result<AppConfig, ImportError> {
    let mut config = AppConfig::default();
    config.redirect.enabled = false;
    config.redirect.rules.clear();
    config.hsts.enabled = false;
    config.stapling.enabled = false;
    config.tls.session_tickets = true;
    config.tls.protocol = "all -SSLv3".to_string();
    config.listen.protocols = vec!["http/1.1".to_string()];

    let mut importer = Importer {
        config,
        listen_ports: Vec::new(),
        global_tls: false,
        tls_vhost_found: false,
    };

    importer.global(nodes)?;

    if !importer.tls_vhost_found {
        match (importer.global_tls, importer.listen_ports.first()) {
            (true, Some(port)) => importer.config.listen.https_port = *port,
            _ => {
                return Err(ImportError::Semantic(
                    "no TLS virtual host (SSLEngine on) found".to_string(),
                ))
            }
        }
    }

    Ok(importer.config)
}

impl Importer {
    fn global(&mut self, nodes: &[Node]) -> Result<(), ImportError> {
        for node in nodes {
            match node {
                Node::Directive(d) if d.is("Listen") => {
                    let addr = arg(d, 0)?;
                    self.listen_ports.push(port_of(d, addr)?);
                }
                Node::Directive(d) if d.is("SSLEngine") => {
                    self.global_tls = on_off(d)?;
                }
                Node::Directive(d) => {
                    if !self.tls_directive(d)? {
                        ignore(d);
                    }
                }
                Node::Section(s) if s.is("IfModule") || s.is("IfDefine") => {
                    self.global(&s.children)?;
                }
                Node::Section(s) if s.is("VirtualHost") => self.virtual_host(s)?,
                Node::Section(s) => {
                    tracing::warn!(line = s.line, section = %s.name, "Ignoring unsupported section");
                }
            }
        }
        Ok(())
    }

    fn virtual_host(&mut self, section: &Section) -> Result<(), ImportError> {
        let address = section.args.first().ok_or_else(|| ImportError::Directive {
            line: section.line,
            directive: section.name.clone(),
            message: "missing address".to_string(),
        })?;
        let (host, port) = split_address(address).ok_or_else(|| ImportError::Directive {
            line: section.line,
            directive: section.name.clone(),
            message: format!("cannot read a port from '{}'", address),
        })?;

        let directives = flatten(&section.children);
        let is_tls = directives
            .iter()
            .find(|d| d.is("SSLEngine"))
            .map(|d| on_off(d))
            .transpose()?
            .unwrap_or(false);

        if is_tls {
            self.tls_vhost(&directives, host, port)
        } else {
            self.plain_vhost(&directives, section.line, port)
        }
    }

    fn tls_vhost(&mut self, directives: &[&Directive], host: Option<IpAddr>, port: u16) -> Result<(), ImportError> {
        if self.tls_vhost_found {
            tracing::warn!(port, "Only one TLS virtual host is served; later ones override earlier settings");
        }
        self.tls_vhost_found = true;
        self.config.listen.https_port = port;
        if let Some(host) = host {
            self.config.listen.host = host.to_string();
        }

        for d in directives {
            if d.is("SSLEngine") || self.tls_directive(d)? {
                continue;
            }
            if d.is("Protocols") {
                self.config.listen.protocols = d.args.iter().map(|p| p.to_ascii_lowercase()).collect();
            } else if d.is("DocumentRoot") {
                self.config.listen.document_root = Some(PathBuf::from(arg(d, 0)?));
            } else if d.is("Header") {
                self.header(d)?;
            } else {
                ignore(d);
            }
        }
        Ok(())
    }

    fn plain_vhost(&mut self, directives: &[&Directive], line: usize, port: u16) -> Result<(), ImportError> {
        let mut engine_on = false;
        let mut rules = Vec::new();

        for d in directives {
            if d.is("RewriteEngine") {
                engine_on = on_off(d)?;
            } else if d.is("RewriteRule") {
                let pattern = arg(d, 0)?;
                let target = arg(d, 1)?;
                let flags = d
                    .args
                    .get(2)
                    .map(|f| f.trim_start_matches('[').trim_end_matches(']').to_string())
                    .unwrap_or_default();
                rules.push(RewriteRuleConfig {
                    pattern: pattern.to_string(),
                    target: target.to_string(),
                    flags,
                });
            } else if d.is("RewriteCond") {
                return Err(directive_error(d, "rewrite conditions are not supported"));
            } else {
                ignore(d);
            }
        }

        if !engine_on || rules.is_empty() {
            tracing::warn!(line, port, "Plaintext virtual host has no active rewrite rules, ignoring");
            return Ok(());
        }

        if self.config.redirect.enabled {
            tracing::warn!(line, port, "Only one plaintext virtual host is served; replacing the earlier one");
        }
        self.config.redirect.enabled = true;
        self.config.redirect.port = port;
        self.config.redirect.rules = rules;
        Ok(())
    }

    /// Apply a TLS parameter that may appear globally or in a TLS vhost.
    /// Returns false when the directive is not one of them.
    fn tls_directive(&mut self, d: &Directive) -> Result<bool, ImportError> {
        let tls = &mut self.config.tls;
        let stapling = &mut self.config.stapling;

        if d.is("SSLProtocol") {
            if d.args.is_empty() {
                return Err(directive_error(d, "missing protocol list"));
            }
            tls.protocol = d.args.join(" ");
        } else if d.is("SSLCipherSuite") {
            let first = arg(d, 0)?;
            if first.eq_ignore_ascii_case("TLSv1.3") {
                tls.tls13_ciphers = parse_cipher_list(&d.args[1..].join(":"));
            } else if first.eq_ignore_ascii_case("SSL") {
                tls.ciphers = parse_cipher_list(&d.args[1..].join(":"));
            } else {
                tls.ciphers = parse_cipher_list(&d.args.join(":"));
            }
        } else if d.is("SSLHonorCipherOrder") {
            tls.honor_cipher_order = on_off(d)?;
        } else if d.is("SSLSessionTickets") {
            tls.session_tickets = on_off(d)?;
        } else if d.is("SSLCertificateFile") {
            tls.certificate_file = PathBuf::from(arg(d, 0)?);
        } else if d.is("SSLCertificateKeyFile") {
            tls.certificate_key_file = PathBuf::from(arg(d, 0)?);
        } else if d.is("SSLUseStapling") {
            stapling.enabled = on_off(d)?;
        } else if d.is("SSLStaplingCache") {
            stapling.cache = arg(d, 0)?.to_string();
        } else if d.is("SSLStaplingStandardCacheTimeout") {
            stapling.standard_cache_timeout_seconds = number(d)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    /// `Header [always|onsuccess] set Name value`; only HSTS is understood.
    fn header(&mut self, d: &Directive) -> Result<(), ImportError> {
        let mut args: &[String] = &d.args;
        if let Some(first) = args.first() {
            if first.eq_ignore_ascii_case("always") || first.eq_ignore_ascii_case("onsuccess") {
                args = &args[1..];
            }
        }

        match args {
            [action, name, value, ..]
                if action.eq_ignore_ascii_case("set")
                    && name.eq_ignore_ascii_case("Strict-Transport-Security") =>
            {
                self.config.hsts =
                    HstsConfig::from_header_value(value).map_err(|e| directive_error(d, &e))?;
                Ok(())
            }
            _ => {
                tracing::warn!(line = d.line, args = ?d.args, "Ignoring unsupported Header directive");
                Ok(())
            }
        }
    }
}

/// Directives of a section with `<IfModule>` wrappers removed.
fn flatten(nodes: &[Node]) -> Vec<&Directive> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Directive(d) => out.push(d),
            Node::Section(s) if s.is("IfModule") || s.is("IfDefine") => out.extend(flatten(&s.children)),
            Node::Section(s) => {
                tracing::warn!(line = s.line, section = %s.name, "Ignoring unsupported nested section");
            }
        }
    }
    out
}

fn ignore(d: &Directive) {
    if INFORMATIONAL.iter().any(|name| d.is(name)) {
        tracing::debug!(line = d.line, directive = %d.name, "Ignoring informational directive");
    } else {
        tracing::warn!(line = d.line, directive = %d.name, "Ignoring unsupported directive");
    }
}

fn directive_error(d: &Directive, message: &str) -> ImportError {
    ImportError::Directive {
        line: d.line,
        directive: d.name.clone(),
        message: message.to_string(),
    }
}

fn arg(d: &Directive, index: usize) -> Result<&str, ImportError> {
    d.args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| directive_error(d, &format!("expected at least {} argument(s)", index + 1)))
}

fn on_off(d: &Directive) -> Result<bool, ImportError> {
    let value = arg(d, 0)?;
    if value.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(directive_error(d, &format!("expected On or Off, got '{}'", value)))
    }
}

fn number(d: &Directive) -> Result<u64, ImportError> {
    let value = arg(d, 0)?;
    value
        .parse()
        .map_err(|_| directive_error(d, &format!("'{}' is not a number", value)))
}

fn port_of(d: &Directive, address: &str) -> Result<u16, ImportError> {
    split_address(address)
        .map(|(_, port)| port)
        .ok_or_else(|| directive_error(d, &format!("cannot read a port from '{}'", address)))
}

/// Split `host:port`, `*:port`, `[v6]:port` or a bare port.
fn split_address(address: &str) -> Option<(Option<IpAddr>, u16)> {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Some((host.parse().ok(), port))
        }
        None => Some((None, address.parse().ok()?)),
    }
}
