//! Agent record types.
//!
//! An [`AgentRecord`] is what the registry stores for every `host:port` that
//! answered a probe (or was declared in an `a2a-config.json` file).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Build the canonical registry key for a host and port.
pub fn agent_id(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// Base URL for a host and port.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Status of a discovered agent.
///
/// `Starting` is reserved for launcher integrations; the discovery engine
/// never assigns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Responded to the most recent probe or health check
    Online,
    /// Health check could not connect
    Offline,
    /// Reserved for external producers
    Starting,
    /// Connected but answered with a non-success status
    Error,
    /// Declared but not yet confirmed by a probe
    Unknown,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Starting => "starting",
            AgentStatus::Error => "error",
            AgentStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of service behind a port.
///
/// The set is open: anything outside the well-known tags round-trips through
/// [`AgentType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentType {
    A2a,
    Web,
    Debug,
    Analytics,
    Api,
    Service,
    Custom(String),
}

impl AgentType {
    pub fn as_str(&self) -> &str {
        match self {
            AgentType::A2a => "a2a",
            AgentType::Web => "web",
            AgentType::Debug => "debug",
            AgentType::Analytics => "analytics",
            AgentType::Api => "api",
            AgentType::Service => "service",
            AgentType::Custom(tag) => tag,
        }
    }
}

impl From<&str> for AgentType {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "a2a" => AgentType::A2a,
            "web" => AgentType::Web,
            "debug" => AgentType::Debug,
            "analytics" => AgentType::Analytics,
            "api" => AgentType::Api,
            "service" => AgentType::Service,
            other => AgentType::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AgentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(AgentType::from(tag.as_str()))
    }
}

/// A service discovered on a local port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// `"{host}:{port}"`
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub host: String,
    pub port: u16,
    /// `http://{host}:{port}`
    pub url: String,
    pub status: AgentStatus,
    /// Last successful probe
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Endpoint the health checker targets
    pub health_endpoint: String,
    /// Agent card location, when the probe found a structured card
    #[serde(default)]
    pub card_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<serde_json::Value>,
    /// Health checks failed in a row
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl AgentRecord {
    /// Create a record for `host:port` with status `Unknown`.
    pub fn new(host: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        let host = host.into();
        let url = base_url(&host, port);
        Self {
            id: agent_id(&host, port),
            name: name.into(),
            agent_type: AgentType::Service,
            health_endpoint: format!("{url}/health"),
            host,
            port,
            url,
            status: AgentStatus::Unknown,
            last_seen: Utc::now(),
            capabilities: Vec::new(),
            metadata: serde_json::Map::new(),
            card_endpoint: None,
            version: None,
            uptime: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = agent_type;
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Add a capability tag; duplicates are ignored.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.add_capability(capability);
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for capability in capabilities {
            self.add_capability(capability);
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = endpoint.into();
        self
    }

    pub fn with_card_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.card_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_uptime(mut self, uptime: serde_json::Value) -> Self {
        self.uptime = Some(uptime);
        self
    }

    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = last_seen;
        self
    }

    pub fn add_capability(&mut self, capability: impl Into<String>) {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(capability))
    }

    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }

    /// Whether `last_seen` lies further than `window` before `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => self.last_seen < now - window,
            // Windows beyond chrono's range never expire
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_identity() {
        let record = AgentRecord::new("localhost", 9999, "HelloWorld Agent");

        assert_eq!(record.id, "localhost:9999");
        assert_eq!(record.id, agent_id(&record.host, record.port));
        assert_eq!(record.url, "http://localhost:9999");
        assert_eq!(record.health_endpoint, "http://localhost:9999/health");
        assert_eq!(record.status, AgentStatus::Unknown);
    }

    #[test]
    fn test_capabilities_are_deduplicated() {
        let record = AgentRecord::new("localhost", 3000, "Web UI")
            .with_capability("ui")
            .with_capabilities(["rest", "ui", "chat"]);

        assert_eq!(record.capabilities, vec!["ui", "rest", "chat"]);
        assert!(record.has_capability("CHAT"));
        assert!(!record.has_capability("websocket"));
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let record = AgentRecord::new("localhost", 8000, "Service-8000")
            .with_last_seen(now - chrono::Duration::minutes(6));

        assert!(record.is_stale_at(now, Duration::from_secs(300)));
        assert!(!record.is_stale_at(now, Duration::from_secs(600)));
    }

    #[test]
    fn test_agent_type_round_trip() {
        assert_eq!(AgentType::from("A2A"), AgentType::A2a);
        assert_eq!(
            AgentType::from("scheduler"),
            AgentType::Custom("scheduler".to_string())
        );

        let json = serde_json::to_string(&AgentType::Custom("scheduler".into())).unwrap();
        assert_eq!(json, "\"scheduler\"");
        let parsed: AgentType = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(parsed, AgentType::Debug);
    }

    #[test]
    fn test_record_json_shape() {
        let record = AgentRecord::new("localhost", 9999, "HelloWorld Agent")
            .with_type(AgentType::A2a)
            .with_status(AgentStatus::Online)
            .with_capability("streaming")
            .with_card_endpoint("http://localhost:9999/.well-known/agent.json");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "localhost:9999");
        assert_eq!(json["type"], "a2a");
        assert_eq!(json["status"], "online");
        assert_eq!(json["capabilities"][0], "streaming");
        assert!(json["last_seen"].as_str().unwrap().contains('T'));
        assert!(json.get("version").is_none());
    }
}
