//! Router configuration

use axum::{
    Router,
    routing::{get, post},
};
use sonar_discovery::DiscoveryService;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::handlers::{
    check_agent_health, get_agent, get_stats, health_check, list_agents, trigger_discovery,
};

/// Request bodies are tiny `{force}` objects
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DiscoveryService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<DiscoveryService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// Create the query API router with default server settings.
pub fn router(service: Arc<DiscoveryService>) -> Router {
    router_with_config(service, &ServerConfig::default())
}

/// Create the query API router.
pub fn router_with_config(service: Arc<DiscoveryService>, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/agents", get(list_agents))
        .route("/agents/{agent_id}", get(get_agent))
        .route("/agents/{agent_id}/health", post(check_agent_health))
        .route("/discover", post(trigger_discovery))
        .route("/stats", get(get_stats))
        .with_state(AppState::new(service))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}
