//! HTTP side of the front-end.
//!
//! - TLS listener with HSTS on every response
//! - Plaintext listener answering with rewrite-rule redirects
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Certificate and OCSP response reload via SIGHUP

pub mod hsts;
pub mod redirect;
mod server;
mod shutdown;

pub use server::{start_server, Frontend, ServerError, TlsReloader};
