//! Listener startup.
//!
//! A `Frontend` owns the TLS listener, the optional plaintext redirect
//! listener and the OCSP refresher. `start_server` adds signal handling and
//! blocks until both listeners have stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ConfigError, ListenConfig, TlsConfig, GRACEFUL_SHUTDOWN_SECS};
use crate::routes::create_router;
use crate::tls::{
    build_server_config, load_certified_key, Stapler, StaplingCache, StaplingResolver, TlsError,
    TlsPolicy,
};

use super::redirect::{redirect_router, RedirectRules};
use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load TLS configuration: {0}")]
    Tls(#[from] TlsError),

    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("Server error: {0}")]
    Server(String),
}

/// Rebuilds the certified key and `ServerConfig` in place.
pub struct TlsReloader {
    tls: TlsConfig,
    listen: ListenConfig,
    rustls_config: RustlsConfig,
    cache: Option<StaplingCache>,
    stapler: Option<Arc<Stapler>>,
}

impl TlsReloader {
    /// Re-read certificate, key and OCSP response. On error the running
    /// configuration is left untouched.
    pub async fn reload(&self) -> Result<(), ServerError> {
        let policy = TlsPolicy::resolve(&self.tls, &self.listen)?;
        let key = load_certified_key(
            &self.tls.certificate_file,
            &self.tls.certificate_key_file,
            &policy.provider,
        )?;
        let resolver = StaplingResolver::new(Arc::new(key), self.cache.clone());
        let fingerprint = resolver.fingerprint();
        let server_config = build_server_config(&policy, Arc::new(resolver))?;

        if let Some(stapler) = &self.stapler {
            stapler.set_fingerprint(fingerprint);
            if let Err(e) = stapler.refresh().await {
                tracing::warn!(error = %e, "OCSP response reload failed");
            }
        }

        self.rustls_config.reload_from_config(Arc::new(server_config));
        tracing::info!(
            cert = %self.tls.certificate_file.display(),
            key = %self.tls.certificate_key_file.display(),
            "TLS configuration reloaded"
        );
        Ok(())
    }
}

type ServeTask = JoinHandle<std::io::Result<()>>;

/// Running listeners.
pub struct Frontend {
    https_addr: SocketAddr,
    redirect_addr: Option<SocketAddr>,
    handles: Vec<Handle>,
    tasks: Vec<ServeTask>,
    refresher: Option<JoinHandle<()>>,
    reloader: Arc<TlsReloader>,
}

impl Frontend {
    /// Load certificates, build the TLS engine and bind both listeners.
    /// Returns once the sockets are bound.
    pub async fn start(config: &AppConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let https_addr = config.listen.https_addr()?;

        let policy = TlsPolicy::resolve(&config.tls, &config.listen)?;
        let key = load_certified_key(
            &config.tls.certificate_file,
            &config.tls.certificate_key_file,
            &policy.provider,
        )?;

        let cache = if config.stapling.enabled {
            let spec = config.stapling.cache_spec().map_err(TlsError::from)?;
            Some(StaplingCache::new(spec, config.stapling.cache_timeout()))
        } else {
            None
        };

        let resolver = StaplingResolver::new(Arc::new(key), cache.clone());
        let stapler = cache.clone().map(|cache| {
            Arc::new(Stapler::new(
                cache,
                config.stapling.response_file.clone(),
                resolver.fingerprint(),
            ))
        });
        if let Some(stapler) = &stapler {
            if let Err(e) = stapler.refresh().await {
                tracing::warn!(error = %e, "No OCSP response loaded at startup");
            }
        }

        let server_config = build_server_config(&policy, Arc::new(resolver))?;
        let rustls_config = RustlsConfig::from_config(Arc::new(server_config));

        tracing::info!(
            %https_addr,
            cert = %config.tls.certificate_file.display(),
            versions = ?policy.versions,
            suites = policy.provider.cipher_suites.len(),
            alpn = ?config.listen.protocols,
            hsts = config.hsts.enabled,
            stapling = config.stapling.enabled,
            "Starting TLS listener"
        );

        let mut handles = Vec::new();
        let mut tasks = Vec::new();

        let tls_handle = Handle::new();
        let app = create_router(config);
        let task = tokio::spawn(
            axum_server::bind_rustls(https_addr, rustls_config.clone())
                .handle(tls_handle.clone())
                .serve(app.into_make_service()),
        );
        let https_addr = bound(&tls_handle, https_addr, task, &mut tasks).await?;
        handles.push(tls_handle);

        let redirect_addr = if config.redirect.enabled {
            let addr = config.listen.redirect_addr(&config.redirect)?;
            let rules = RedirectRules::from_config(&config.redirect.rules).map_err(ConfigError::from)?;
            tracing::info!(%addr, rules = rules.len(), "Starting HTTP redirect listener");

            let handle = Handle::new();
            let task = spawn_plain(addr, redirect_router(rules), handle.clone());
            let addr = match bound(&handle, addr, task, &mut tasks).await {
                Ok(addr) => addr,
                Err(e) => {
                    for handle in &handles {
                        handle.shutdown();
                    }
                    return Err(e);
                }
            };
            handles.push(handle);
            Some(addr)
        } else {
            None
        };

        let refresher = stapler
            .clone()
            .filter(|_| config.stapling.response_file.is_some())
            .map(|stapler| stapler.spawn_refresher(config.stapling.refresh_interval()));

        let reloader = Arc::new(TlsReloader {
            tls: config.tls.clone(),
            listen: config.listen.clone(),
            rustls_config,
            cache,
            stapler,
        });

        Ok(Self {
            https_addr,
            redirect_addr,
            handles,
            tasks,
            refresher,
            reloader,
        })
    }

    pub fn https_addr(&self) -> SocketAddr {
        self.https_addr
    }

    pub fn redirect_addr(&self) -> Option<SocketAddr> {
        self.redirect_addr
    }

    pub fn reloader(&self) -> Arc<TlsReloader> {
        Arc::clone(&self.reloader)
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.handles.clone()
    }

    /// Stop accepting connections and drain open ones.
    pub fn shutdown(&self, grace: Duration) {
        for handle in &self.handles {
            handle.graceful_shutdown(Some(grace));
        }
    }

    /// Wait for every listener to stop.
    pub async fn wait(self) -> Result<(), ServerError> {
        let mut result = Ok(());
        for task in self.tasks {
            if let Err(e) = join(task).await {
                tracing::error!(error = %e, "Listener failed");
                result = Err(e);
            }
        }
        if let Some(refresher) = self.refresher {
            refresher.abort();
        }
        result
    }
}

fn spawn_plain(addr: SocketAddr, app: Router, handle: Handle) -> ServeTask {
    tokio::spawn(
        axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service()),
    )
}

/// Wait until a listener is bound, or collect its bind error.
async fn bound(
    handle: &Handle,
    addr: SocketAddr,
    task: ServeTask,
    tasks: &mut Vec<ServeTask>,
) -> Result<SocketAddr, ServerError> {
    match handle.listening().await {
        Some(local) => {
            tasks.push(task);
            Ok(local)
        }
        None => {
            let reason = match join(task).await {
                Err(e) => e.to_string(),
                Ok(()) => "listener stopped before binding".to_string(),
            };
            Err(ServerError::Bind { addr, reason })
        }
    }
}

async fn join(task: ServeTask) -> Result<(), ServerError> {
    match task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Server(e.to_string())),
        Err(e) => Err(ServerError::Server(format!("listener task panicked: {}", e))),
    }
}

/// Start the front-end and block until it shuts down.
pub async fn start_server(config: &AppConfig) -> Result<(), ServerError> {
    let frontend = Frontend::start(config).await?;

    shutdown::setup_shutdown_handler(
        frontend.handles(),
        Duration::from_secs(GRACEFUL_SHUTDOWN_SECS),
    );
    shutdown::setup_reload_handler(frontend.reloader());

    tracing::info!(
        https = %frontend.https_addr(),
        redirect = ?frontend.redirect_addr(),
        "Front-end ready"
    );

    frontend.wait().await
}
