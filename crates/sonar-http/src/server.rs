//! Server bootstrap and graceful shutdown

use sonar_core::RegistryEvent;
use sonar_discovery::DiscoveryService;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::router::router_with_config;

/// Bind `config.bind_addr` and serve until SIGINT or SIGTERM.
pub async fn serve(service: Arc<DiscoveryService>, config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    serve_with_shutdown(listener, service, config, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` completes.
///
/// Starts the background scan loop when enabled and stops it on exit.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    service: Arc<DiscoveryService>,
    config: ServerConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    let events = spawn_event_logger(&service);
    let background = config
        .background_scan
        .then(|| service.start_background_scan());

    info!(
        addr = %local_addr,
        background_scan = config.background_scan,
        "Sonar query API listening"
    );

    let app = router_with_config(Arc::clone(&service), &config);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(handle) = background {
        handle.stop();
    }
    events.abort();
    info!("Sonar query API stopped");

    result
}

/// Log registry events until the registry goes away.
fn spawn_event_logger(service: &DiscoveryService) -> JoinHandle<()> {
    let mut events = service.registry().subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::AgentDiscovered { agent_id, name }) => {
                    debug!(agent_id = %agent_id, name = %name, "Registry event: discovered");
                }
                Ok(RegistryEvent::StatusChanged {
                    agent_id,
                    old_status,
                    new_status,
                }) => {
                    debug!(
                        agent_id = %agent_id,
                        old_status = %old_status,
                        new_status = %new_status,
                        "Registry event: status changed"
                    );
                }
                Ok(RegistryEvent::AgentEvicted {
                    agent_id,
                    last_seen,
                }) => {
                    debug!(agent_id = %agent_id, last_seen = %last_seen, "Registry event: evicted");
                }
                Ok(RegistryEvent::AgentUpdated { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Registry event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Completes on SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
