//! Liveness probe.
//!
//! Returns 200 OK while the TLS listener accepts connections. Used by
//! orchestrators and load balancers behind the front-end.

pub async fn health() -> &'static str {
    "ok"
}
