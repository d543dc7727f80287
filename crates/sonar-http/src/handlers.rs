//! Query API handlers
//!
//! Read handlers only touch the in-memory registry, so they answer promptly
//! while a scan is in flight.

use axum::{
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use sonar_core::{AgentFilter, AgentRecord, AgentType, RegistryStats};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::router::AppState;

/// Query parameters for `GET /agents`
#[derive(Debug, Default, Deserialize)]
pub struct ListAgentsQuery {
    pub agent_type: Option<String>,
    pub healthy_only: Option<bool>,
    pub capability: Option<String>,
}

impl ListAgentsQuery {
    fn to_filter(&self) -> AgentFilter {
        let mut filter = AgentFilter::new();
        if let Some(agent_type) = &self.agent_type {
            filter = filter.with_type(AgentType::from(agent_type.as_str()));
        }
        if self.healthy_only.unwrap_or(false) {
            filter = filter.healthy_only();
        }
        if let Some(capability) = &self.capability {
            filter = filter.with_capability(capability);
        }
        filter
    }
}

#[derive(Debug, Serialize)]
pub struct AgentList {
    pub agents: Vec<AgentRecord>,
    pub count: usize,
}

/// Body of `POST /discover`
#[derive(Debug, Default, Deserialize)]
pub struct DiscoverRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub status: &'static str,
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub agent_id: String,
    pub healthy: bool,
}

/// GET /agents
pub async fn list_agents(
    State(state): State<AppState>,
    query: Result<Query<ListAgentsQuery>, QueryRejection>,
) -> Result<Json<AgentList>, ApiError> {
    let Query(query) = query?;
    let agents = state.service.registry().list_all(&query.to_filter());
    Ok(Json(AgentList {
        count: agents.len(),
        agents,
    }))
}

/// GET /agents/{agent_id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentRecord>, ApiError> {
    state
        .service
        .registry()
        .get(&agent_id)
        .map(Json)
        .ok_or_else(|| ApiError::agent_not_found(agent_id))
}

/// POST /discover
///
/// Starts a discovery round in the background and returns immediately. An
/// empty body means `force: false`.
pub async fn trigger_discovery(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<DiscoverResponse>), ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        DiscoverRequest::default()
    } else {
        serde_json::from_slice::<DiscoverRequest>(&body)
            .map_err(|e| ApiError::InvalidJson(e.to_string()))?
    };
    let force = request.force;

    let service = state.service.clone();
    tokio::spawn(async move {
        match service.discover(force).await {
            Ok(agents) => info!(force, agents = agents.len(), "Triggered discovery finished"),
            Err(e) => warn!(force, error = %e, "Triggered discovery failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(DiscoverResponse {
            status: "discovery_triggered",
            force,
        }),
    ))
}

/// POST /agents/{agent_id}/health
pub async fn check_agent_health(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<HealthCheckResponse>, ApiError> {
    if !state.service.registry().contains(&agent_id) {
        return Err(ApiError::agent_not_found(agent_id));
    }

    let healthy = state.service.check_health(&agent_id).await;
    Ok(Json(HealthCheckResponse { agent_id, healthy }))
}

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.service.registry().stats())
}

/// GET /health - liveness of the discovery service itself
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sonar",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "scan_rounds": state.service.scan_rounds(),
        "timestamp": chrono::Utc::now(),
    }))
}
