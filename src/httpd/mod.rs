//! Reader for httpd-style TLS front-end configuration.
//!
//! Supports the directive subset needed to describe a TLS listener, an
//! HTTP-to-HTTPS rewrite vhost, HSTS and OCSP stapling. The file is lexed into
//! a directive tree (`lexer`) and then mapped onto `AppConfig` (`import`).

mod import;
mod lexer;

pub use lexer::{Directive, Node, Section};

use crate::config::AppConfig;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: {directive}: {message}")]
    Directive {
        line: usize,
        directive: String,
        message: String,
    },

    #[error("{0}")]
    Semantic(String),
}

/// Parse an httpd configuration into the front-end configuration.
pub fn parse_config(contents: &str) -> Result<AppConfig, ImportError> {
    let nodes = lexer::parse(contents)?;
    import::import(&nodes)
}
