//! End-to-end discovery scenarios against real HTTP servers
//!
//! Each test starts small axum servers on ephemeral ports and points a
//! discovery service at exactly those ports.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{Html, Redirect},
    routing::get,
};
use serde_json::json;
use sonar_core::{AgentStatus, AgentType};
use sonar_discovery::{DiscoveryConfig, DiscoveryService, KnownAgent, ScanTarget};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

// =============================================================================
// Helper Functions
// =============================================================================

/// Find a port nothing is listening on
fn find_available_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Serve `router` on an ephemeral port
async fn start_test_server(router: Router) -> (u16, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (port, handle)
}

fn hello_world_router() -> Router {
    Router::new()
        .route(
            "/.well-known/agent.json",
            get(|| async {
                Json(json!({
                    "name": "HelloWorld Agent",
                    "description": "Just a hello world agent",
                    "version": "1.0.0",
                    "capabilities": {"streaming": true},
                    "skills": [{"id": "hello_world", "tags": ["hello world"]}]
                }))
            }),
        )
        .route("/health", get(|| async { "ok" }))
}

fn counting_router(hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/health",
        get(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({"status": "healthy"}))
            }
        }),
    )
}

fn service_for(root: &TempDir, ports: &[u16]) -> Arc<DiscoveryService> {
    service_with_known(root, ports, vec![])
}

fn service_with_known(
    root: &TempDir,
    ports: &[u16],
    known_agents: Vec<KnownAgent>,
) -> Arc<DiscoveryService> {
    let config = DiscoveryConfig::builder()
        .project_root(root.path())
        .known_agents(known_agents)
        .scan_targets(
            ports
                .iter()
                .map(|&port| ScanTarget::single("127.0.0.1", port))
                .collect(),
        )
        .build()
        .unwrap();
    Arc::new(DiscoveryService::new(config).unwrap())
}

// =============================================================================
// Tests: Discovery
// =============================================================================

#[tokio::test]
async fn test_agent_card_is_discovered() {
    let (port, _server) = start_test_server(hello_world_router()).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    let agents = service.discover(false).await.unwrap();

    assert_eq!(agents.len(), 1);
    let agent = &agents[0];
    assert_eq!(agent.id, format!("127.0.0.1:{port}"));
    assert_eq!(agent.name, "HelloWorld Agent");
    assert_eq!(agent.agent_type, AgentType::A2a);
    assert_eq!(agent.status, AgentStatus::Online);
    assert!(agent.has_capability("streaming"));
    assert_eq!(agent.version.as_deref(), Some("1.0.0"));
    assert_eq!(
        agent.card_endpoint.as_deref(),
        Some(format!("http://127.0.0.1:{port}/.well-known/agent.json").as_str())
    );
}

#[tokio::test]
async fn test_closed_port_yields_nothing() {
    let port = find_available_port();
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    let agents = service.discover(false).await.unwrap();

    assert!(agents.is_empty());
}

#[tokio::test]
async fn test_web_page_is_classified() {
    let router = Router::new().route(
        "/",
        get(|| async {
            Html("<!DOCTYPE html><html><title>A2A Inspector</title></html>")
        }),
    );
    let (port, _server) = start_test_server(router).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    let agents = service.discover(false).await.unwrap();

    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name, "A2A Inspector");
    assert_eq!(agents[0].agent_type, AgentType::Debug);
    assert_eq!(
        agents[0].health_endpoint,
        format!("http://127.0.0.1:{port}/")
    );
    assert!(agents[0].card_endpoint.is_none());
}

#[tokio::test]
async fn test_redirect_counts_as_alive() {
    let router = Router::new().route("/", get(|| async { Redirect::temporary("/login") }));
    let (port, _server) = start_test_server(router).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    let agents = service.discover(false).await.unwrap();

    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].metadata["http_status"], 307);
}

#[tokio::test]
async fn test_non_card_json_on_card_path_falls_through() {
    let router = Router::new()
        .route("/agent", get(|| async { Json(json!({"items": []})) }))
        .route("/status", get(|| async { "running" }));
    let (port, _server) = start_test_server(router).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    let agents = service.discover(false).await.unwrap();

    assert_eq!(agents.len(), 1);
    assert!(agents[0].card_endpoint.is_none());
    assert_eq!(
        agents[0].health_endpoint,
        format!("http://127.0.0.1:{port}/status")
    );
}

#[tokio::test]
async fn test_known_agent_identity_applies() {
    let (port, _server) = start_test_server(counting_router(Arc::default())).await;
    let root = TempDir::new().unwrap();
    let service = service_with_known(
        &root,
        &[],
        vec![KnownAgent::new("Demo UI", &[port], AgentType::Web).with_host("127.0.0.1")],
    );

    let agents = service.discover(false).await.unwrap();

    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name, "Demo UI");
    assert_eq!(agents[0].agent_type, AgentType::Web);
    assert_eq!(agents[0].metadata["source"], "known_agent");
}

#[tokio::test]
async fn test_cache_and_force() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (port, _server) = start_test_server(counting_router(Arc::clone(&hits))).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    service.discover(false).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    service.discover(false).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    service.discover(true).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_repeated_discovery_is_idempotent() {
    let (port, _server) = start_test_server(hello_world_router()).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);

    let first = service.discover(true).await.unwrap();
    let second = service.discover(true).await.unwrap();

    let ids = |agents: &[sonar_core::AgentRecord]| {
        agents.iter().map(|a| a.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(second[0].capabilities, first[0].capabilities);
}

#[tokio::test]
async fn test_declared_agent_is_verified_by_probe() {
    let (port, _server) = start_test_server(hello_world_router()).await;
    let root = TempDir::new().unwrap();
    std::fs::write(
        root.path().join("a2a-config.json"),
        format!(r#"{{"url": "http://127.0.0.1:{port}", "name": "Hello"}}"#),
    )
    .unwrap();
    let service = service_for(&root, &[]);

    let agents = service.discover(false).await.unwrap();

    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].status, AgentStatus::Online);
    assert_eq!(agents[0].name, "HelloWorld Agent");
    assert_eq!(agents[0].metadata["source"], "config_file");
}

// =============================================================================
// Tests: Health Checks
// =============================================================================

#[tokio::test]
async fn test_health_transition_after_shutdown() {
    let (port, server) = start_test_server(hello_world_router()).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);
    let agent_id = format!("127.0.0.1:{port}");

    service.discover(false).await.unwrap();
    assert!(service.check_health(&agent_id).await);

    server.abort();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!service.check_health(&agent_id).await);
    let record = service.registry().get(&agent_id).unwrap();
    assert_eq!(record.status, AgentStatus::Offline);
    assert_eq!(service.discover(false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_failure_status_marks_error() {
    let healthy = Arc::new(AtomicUsize::new(1));
    let flag = Arc::clone(&healthy);
    let router = Router::new().route(
        "/health",
        get(move || {
            let flag = Arc::clone(&flag);
            async move {
                if flag.load(Ordering::SeqCst) == 1 {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }
        }),
    );
    let (port, _server) = start_test_server(router).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);
    let agent_id = format!("127.0.0.1:{port}");

    service.discover(false).await.unwrap();
    healthy.store(0, Ordering::SeqCst);

    assert!(!service.check_health(&agent_id).await);
    let record = service.registry().get(&agent_id).unwrap();
    assert_eq!(record.status, AgentStatus::Error);
    assert_eq!(record.consecutive_failures, 1);

    healthy.store(1, Ordering::SeqCst);
    assert!(service.check_health(&agent_id).await);
    assert_eq!(
        service.registry().get(&agent_id).unwrap().consecutive_failures,
        0
    );
}

#[tokio::test]
async fn test_no_content_service_stays_online_under_health_checks() {
    let router = Router::new()
        .route("/ping", get(|| async { StatusCode::NO_CONTENT }))
        .route("/", get(|| async { Html("<html><body>console</body></html>") }));
    let (port, _server) = start_test_server(router).await;
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[port]);
    let agent_id = format!("127.0.0.1:{port}");

    let agents = service.discover(false).await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].metadata["http_status"], 204);
    assert_eq!(agents[0].health_endpoint, format!("http://127.0.0.1:{port}/"));

    assert!(service.check_health(&agent_id).await);
    let record = service.registry().get(&agent_id).unwrap();
    assert_eq!(record.status, AgentStatus::Online);
    assert_eq!(record.consecutive_failures, 0);
}

#[tokio::test]
async fn test_unknown_agent_health_is_false() {
    let root = TempDir::new().unwrap();
    let service = service_for(&root, &[]);

    assert!(!service.check_health("127.0.0.1:1").await);
    assert!(service.registry().is_empty());
}
