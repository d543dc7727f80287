//! Port probing
//!
//! A probe answers one question: is something worth recording listening on
//! `host:port`? It never fails. A closed port, a timeout or a response nobody
//! recognises all come back as [`ProbeOutcome::NotFound`].
//!
//! # Strategy
//!
//! 1. TCP connect pre-check, so closed ports cost one refused connection
//!    instead of a full HTTP timeout.
//! 2. Structured agent-card endpoints. A 200 whose body is a card wins.
//! 3. Generic endpoints. Any 2xx or 3xx wins; redirects are not followed.
//!
//! The first winning endpoint ends the probe. It becomes the record's health
//! endpoint only if it answered 200; otherwise health checks go to the site
//! root, since the health checker wants a 200.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, redirect};
use serde_json::Value;
use sonar_core::{AgentRecord, AgentStatus, AgentType, agent_id, base_url};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::classifier::{self, Classification};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;

/// Structured agent-card endpoints, in probe order
pub const CARD_ENDPOINTS: &[&str] = &["/.well-known/agent.json", "/agent/card", "/agent"];

/// Generic web and health endpoints, in probe order
pub const GENERIC_ENDPOINTS: &[&str] = &["/health", "/status", "/ping", "/"];

/// Upper bound on body bytes read for classification
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Which discovery pass produced a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSource {
    PortScan,
    KnownAgent,
    ConfigFile,
}

impl TargetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSource::PortScan => "port_scan",
            TargetSource::KnownAgent => "known_agent",
            TargetSource::ConfigFile => "config_file",
        }
    }
}

/// What to probe, and what we expect to find there.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub expected_name: Option<String>,
    pub expected_type: Option<AgentType>,
    pub source: TargetSource,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            expected_name: None,
            expected_type: None,
            source: TargetSource::PortScan,
        }
    }

    /// A known service with a fixed identity.
    pub fn known(
        host: impl Into<String>,
        port: u16,
        name: impl Into<String>,
        agent_type: AgentType,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            expected_name: Some(name.into()),
            expected_type: Some(agent_type),
            source: TargetSource::KnownAgent,
        }
    }

    pub fn id(&self) -> String {
        agent_id(&self.host, self.port)
    }

    /// Card endpoints are skipped for known services that are not A2A agents.
    fn wants_card(&self) -> bool {
        self.expected_type
            .as_ref()
            .is_none_or(|t| *t == AgentType::A2a)
    }
}

/// Result of probing one target.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Found(AgentRecord),
    NotFound,
}

impl ProbeOutcome {
    pub fn into_record(self) -> Option<AgentRecord> {
        match self {
            ProbeOutcome::Found(record) => Some(record),
            ProbeOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ProbeOutcome::Found(_))
    }
}

/// Something that can look at a port and tell what is there.
#[async_trait]
pub trait AgentProbe: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// A response that satisfied an endpoint's success rule.
#[derive(Debug)]
struct EndpointHit {
    endpoint: String,
    status: u16,
    content_type: Option<String>,
    body: String,
}

/// HTTP implementation of [`AgentProbe`].
#[derive(Clone)]
pub struct HttpProber {
    http: Client,
    connect_timeout: Duration,
}

impl std::fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProber")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl HttpProber {
    /// Build a prober with the timeouts from `config`.
    pub fn new(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let http = Client::builder()
            .timeout(config.probe_timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(redirect::Policy::none())
            // Scans touch each port once; pooled sockets would only linger
            .pool_max_idle_per_host(0)
            .user_agent(format!("sonar-discovery/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            connect_timeout: config.connect_timeout,
        })
    }

    /// TCP connect pre-check.
    async fn is_listening(&self, host: &str, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    /// GET `base + path`, returning the response if `accept` likes its status.
    async fn fetch(
        &self,
        base: &str,
        path: &str,
        accept: impl Fn(reqwest::StatusCode) -> bool,
    ) -> Option<EndpointHit> {
        let endpoint = format!("{base}{path}");
        let mut response = match self.http.get(&endpoint).send().await {
            Ok(response) => response,
            Err(e) => {
                trace!(endpoint = %endpoint, error = %e, "Probe request failed");
                return None;
            }
        };

        let status = response.status();
        if !accept(status) {
            trace!(endpoint = %endpoint, status = status.as_u16(), "Probe endpoint rejected");
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() >= MAX_BODY_BYTES {
                        body.truncate(MAX_BODY_BYTES);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Keep what arrived; headers already proved liveness
                    trace!(endpoint = %endpoint, error = %e, "Probe body read interrupted");
                    break;
                }
            }
        }

        Some(EndpointHit {
            endpoint,
            status: status.as_u16(),
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn build_record(
        target: &ProbeTarget,
        hit: EndpointHit,
        classification: Classification,
    ) -> AgentRecord {
        let name = if classification.structured {
            classification.name
        } else {
            target
                .expected_name
                .clone()
                .unwrap_or(classification.name)
        };
        let agent_type = target
            .expected_type
            .clone()
            .unwrap_or(classification.agent_type);
        let health_endpoint = if hit.status == reqwest::StatusCode::OK.as_u16() {
            hit.endpoint.clone()
        } else {
            format!("{}/", base_url(&target.host, target.port))
        };
        let mut record = AgentRecord::new(&target.host, target.port, name)
            .with_type(agent_type)
            .with_status(AgentStatus::Online)
            .with_last_seen(Utc::now())
            .with_capabilities(classification.capabilities)
            .with_health_endpoint(health_endpoint)
            .with_metadata("probed_endpoint", Value::from(hit.endpoint.clone()))
            .with_metadata("http_status", Value::from(hit.status))
            .with_metadata(
                "content_preview",
                Value::from(classifier::content_preview(&hit.body)),
            )
            .with_metadata("source", Value::from(target.source.as_str()));

        if let Some(content_type) = hit.content_type {
            record = record.with_metadata("content_type", Value::from(content_type));
        }
        if let Some(description) = classification.description {
            record = record.with_metadata("description", Value::from(description));
        }
        if classification.structured {
            record = record.with_card_endpoint(&hit.endpoint);
        }
        if let Some(version) = classification.version {
            record = record.with_version(version);
        }
        if let Some(uptime) = classification.uptime {
            record = record.with_uptime(uptime);
        }
        record
    }
}

#[async_trait]
impl AgentProbe for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        if !self.is_listening(&target.host, target.port).await {
            trace!(target = %target.id(), "Port not listening");
            return ProbeOutcome::NotFound;
        }

        let base = base_url(&target.host, target.port);

        if target.wants_card() {
            for path in CARD_ENDPOINTS {
                let Some(hit) = self
                    .fetch(&base, path, |s| s == reqwest::StatusCode::OK)
                    .await
                else {
                    continue;
                };

                let classification =
                    classifier::classify(&hit.body, hit.content_type.as_deref(), target.port);
                if classification.structured {
                    debug!(
                        target = %target.id(),
                        endpoint = %hit.endpoint,
                        name = %classification.name,
                        "Agent card found"
                    );
                    return ProbeOutcome::Found(Self::build_record(target, hit, classification));
                }
            }
        }

        for path in GENERIC_ENDPOINTS {
            if let Some(hit) = self
                .fetch(&base, path, |s| s.is_success() || s.is_redirection())
                .await
            {
                let classification =
                    classifier::classify(&hit.body, hit.content_type.as_deref(), target.port);
                debug!(
                    target = %target.id(),
                    endpoint = %hit.endpoint,
                    name = %classification.name,
                    "Service found"
                );
                return ProbeOutcome::Found(Self::build_record(target, hit, classification));
            }
        }

        debug!(target = %target.id(), "Port open but no endpoint answered");
        ProbeOutcome::NotFound
    }
}
