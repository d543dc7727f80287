//! Targeted health checks
//!
//! Unlike the bulk scan, a health check re-probes one registry entry at its
//! stored health endpoint with a longer timeout, and writes the outcome back
//! in place. It never removes records; only the staleness sweep does.

use reqwest::Client;
use sonar_core::{AgentRegistry, HealthOutcome};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DiscoveryResult;

/// HTTP health checker.
#[derive(Clone)]
pub struct HealthChecker {
    http: Client,
    timeout: Duration,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> DiscoveryResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .user_agent(format!("sonar-discovery/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, timeout })
    }

    /// GET `url` and map the response to a [`HealthOutcome`].
    ///
    /// Only a 200 counts as healthy. Any other status is `Failing`; transport
    /// errors (refused, reset, timeout) are `Unreachable`.
    pub async fn probe_endpoint(&self, url: &str) -> HealthOutcome {
        match self.http.get(url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => HealthOutcome::Healthy,
            Ok(response) => HealthOutcome::Failing {
                status_code: response.status().as_u16(),
            },
            Err(e) => {
                debug!(url = %url, error = %e, "Health check request failed");
                HealthOutcome::Unreachable
            }
        }
    }

    /// Check one registry entry and store the result.
    ///
    /// Returns `false` without side effects when `agent_id` is unknown.
    pub async fn check(&self, registry: &AgentRegistry, agent_id: &str) -> bool {
        let Some(record) = registry.get(agent_id) else {
            debug!(agent_id = %agent_id, "Health check for unknown agent");
            return false;
        };

        let outcome = self.probe_endpoint(&record.health_endpoint).await;
        match registry.record_health(agent_id, outcome) {
            Ok(updated) => {
                info!(
                    agent_id = %agent_id,
                    endpoint = %record.health_endpoint,
                    outcome = ?outcome,
                    status = %updated.status,
                    "Health check completed"
                );
                updated.is_online()
            }
            // Evicted while the request was in flight
            Err(_) => false,
        }
    }
}
