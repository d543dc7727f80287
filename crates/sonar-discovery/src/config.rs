//! # Discovery Configuration
//!
//! [`DiscoveryConfig`] carries every tunable of the discovery engine. Defaults
//! match a developer workstation running the A2A samples; everything can be
//! overridden from the environment or a YAML file.
//!
//! ## Environment Variables
//!
//! - `SONAR_PROJECT_ROOT` - Root of the `a2a-config.json` scan (default: `.`)
//! - `SONAR_CONFIG_FILE` - YAML file with `known_agents` and `scan_targets`
//! - `SONAR_SCAN_TARGETS` - Comma separated `host:start-end` or `host:port` entries
//! - `SONAR_CACHE_TTL` - Reuse a completed scan for this long (default: 30s)
//! - `SONAR_STALE_AFTER` - Evict records unseen for this long (default: 5m)
//! - `SONAR_PROBE_TIMEOUT` - Per-request probe timeout (default: 2s)
//! - `SONAR_CONNECT_TIMEOUT` - TCP pre-check timeout (default: 1s)
//! - `SONAR_HEALTH_TIMEOUT` - Targeted health-check timeout (default: 5s)
//! - `SONAR_SCAN_INTERVAL` - Background scan period (default: 30s)
//! - `SONAR_ERROR_BACKOFF` - Pause after a failed background scan (default: 10s)
//! - `SONAR_MAX_CONCURRENT_PROBES` - In-flight probe limit (default: 20)
//! - `SONAR_CONFIG_SCAN_DEPTH` - Directory depth of the config-file scan (default: 6)
//!
//! Durations use humantime syntax (`500ms`, `30s`, `5m`).
//!
//! ## YAML file
//!
//! ```yaml
//! known_agents:
//!   - name: HelloWorld Agent
//!     ports: [9999]
//!     type: a2a
//! scan_targets:
//!   - localhost:3000-3100
//!   - localhost:9999
//! ```

use serde::Deserialize;
use sonar_core::AgentType;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt, fs, time::Duration};

/// Name of the per-project agent declaration file
pub const AGENT_CONFIG_FILE_NAME: &str = "a2a-config.json";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Invalid scan target '{target}': {message}")]
    InvalidScanTarget { target: String, message: String },

    #[error("Failed to load config file {path}: {message}")]
    FileError { path: PathBuf, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

// ============================================================================
// Scan targets and known agents
// ============================================================================

/// An inclusive port range on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: String,
    pub start: u16,
    pub end: u16,
}

impl ScanTarget {
    pub fn range(host: impl Into<String>, start: u16, end: u16) -> Self {
        Self {
            host: host.into(),
            start,
            end,
        }
    }

    pub fn single(host: impl Into<String>, port: u16) -> Self {
        Self::range(host, port, port)
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}:{}", self.host, self.start)
        } else {
            write!(f, "{}:{}-{}", self.host, self.start, self.end)
        }
    }
}

impl FromStr for ScanTarget {
    type Err = ConfigError;

    /// Parse `host:port` or `host:start-end`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ConfigError::InvalidScanTarget {
            target: s.to_string(),
            message: message.to_string(),
        };

        let (host, ports) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port or host:start-end"))?;
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }

        let parse_port = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|e| invalid(&format!("invalid port '{p}': {e}")))
        };

        let target = match ports.split_once('-') {
            Some((start, end)) => Self::range(host, parse_port(start)?, parse_port(end)?),
            None => Self::single(host, parse_port(ports)?),
        };

        if target.start > target.end {
            return Err(invalid("range start is greater than range end"));
        }
        Ok(target)
    }
}

impl<'de> Deserialize<'de> for ScanTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_agent_type() -> AgentType {
    AgentType::Service
}

/// A well-known service probed with its expected identity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnownAgent {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    pub ports: Vec<u16>,
    #[serde(rename = "type", default = "default_agent_type")]
    pub agent_type: AgentType,
}

impl KnownAgent {
    pub fn new(name: impl Into<String>, ports: &[u16], agent_type: AgentType) -> Self {
        Self {
            name: name.into(),
            host: default_host(),
            ports: ports.to_vec(),
            agent_type,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

/// Built-in known-agent table.
pub fn default_known_agents() -> Vec<KnownAgent> {
    vec![
        KnownAgent::new("HelloWorld Agent", &[9999], AgentType::A2a),
        KnownAgent::new("A2A Agent Server", &[10000, 10001, 10002], AgentType::A2a),
        KnownAgent::new("A2A Inspector", &[5001], AgentType::Debug),
        KnownAgent::new("Demo UI", &[12000], AgentType::Web),
    ]
}

/// Built-in port-range table.
pub fn default_scan_targets() -> Vec<ScanTarget> {
    vec![
        ScanTarget::range("localhost", 3000, 4000),
        ScanTarget::range("localhost", 8000, 9000),
        ScanTarget::single("localhost", 5000),
        ScanTarget::single("localhost", 5001),
        ScanTarget::single("localhost", 9999),
        ScanTarget::single("localhost", 10000),
        ScanTarget::single("localhost", 12000),
    ]
}

/// Shape of the optional YAML config file.
#[derive(Debug, Deserialize)]
struct DiscoveryFile {
    #[serde(default)]
    known_agents: Option<Vec<KnownAgent>>,
    #[serde(default)]
    scan_targets: Option<Vec<ScanTarget>>,
}

// ============================================================================
// Config
// ============================================================================

/// Discovery engine configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Root of the `a2a-config.json` scan
    pub project_root: PathBuf,
    /// Maximum directory depth of the config-file scan
    pub config_scan_depth: usize,
    pub known_agents: Vec<KnownAgent>,
    pub scan_targets: Vec<ScanTarget>,
    /// How long a completed scan satisfies non-forced requests
    pub cache_ttl: Duration,
    /// Records unseen for longer than this are evicted
    pub stale_after: Duration,
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
    pub health_timeout: Duration,
    pub scan_interval: Duration,
    pub error_backoff: Duration,
    pub max_concurrent_probes: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            config_scan_depth: 6,
            known_agents: default_known_agents(),
            scan_targets: default_scan_targets(),
            cache_ttl: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            health_timeout: Duration::from_secs(5),
            scan_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(10),
            max_concurrent_probes: 20,
        }
    }
}

impl DiscoveryConfig {
    /// Start a builder from defaults.
    #[must_use]
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::new()
    }

    /// Load from the environment on top of defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed or the result fails
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        DiscoveryConfigBuilder::from_env()?.build()
    }

    /// Total number of range-scan probes per pass.
    pub fn scan_target_count(&self) -> usize {
        self.scan_targets.iter().map(ScanTarget::len).sum()
    }
}

/// Builder for [`DiscoveryConfig`] with environment variable support
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value
    /// or the YAML file named by `SONAR_CONFIG_FILE` cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(path) = get_env_string("SONAR_CONFIG_FILE") {
            builder = builder.load_file(path)?;
        }
        if let Some(root) = get_env_string("SONAR_PROJECT_ROOT") {
            builder = builder.project_root(root);
        }
        if let Some(targets) = get_env_string("SONAR_SCAN_TARGETS") {
            let targets = targets
                .split(',')
                .filter(|t| !t.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<ScanTarget>, _>>()?;
            builder = builder.scan_targets(targets);
        }

        if let Some(ttl) = get_env_duration("SONAR_CACHE_TTL")? {
            builder = builder.cache_ttl(ttl);
        }
        if let Some(window) = get_env_duration("SONAR_STALE_AFTER")? {
            builder = builder.stale_after(window);
        }
        if let Some(timeout) = get_env_duration("SONAR_PROBE_TIMEOUT")? {
            builder = builder.probe_timeout(timeout);
        }
        if let Some(timeout) = get_env_duration("SONAR_CONNECT_TIMEOUT")? {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = get_env_duration("SONAR_HEALTH_TIMEOUT")? {
            builder = builder.health_timeout(timeout);
        }
        if let Some(interval) = get_env_duration("SONAR_SCAN_INTERVAL")? {
            builder = builder.scan_interval(interval);
        }
        if let Some(backoff) = get_env_duration("SONAR_ERROR_BACKOFF")? {
            builder = builder.error_backoff(backoff);
        }
        if let Some(limit) = get_env_usize("SONAR_MAX_CONCURRENT_PROBES")? {
            builder = builder.max_concurrent_probes(limit);
        }
        if let Some(depth) = get_env_usize("SONAR_CONFIG_SCAN_DEPTH")? {
            builder = builder.config_scan_depth(depth);
        }

        Ok(builder)
    }

    /// Merge `known_agents` and `scan_targets` from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileError` if the file cannot be read or parsed.
    pub fn load_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file_error = |message: String| ConfigError::FileError {
            path: path.to_path_buf(),
            message,
        };

        let raw = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        let file: DiscoveryFile =
            serde_yaml::from_str(&raw).map_err(|e| file_error(e.to_string()))?;

        if let Some(known_agents) = file.known_agents {
            self.config.known_agents = known_agents;
        }
        if let Some(scan_targets) = file.scan_targets {
            self.config.scan_targets = scan_targets;
        }
        Ok(self)
    }

    #[must_use]
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.project_root = root.into();
        self
    }

    #[must_use]
    pub fn config_scan_depth(mut self, depth: usize) -> Self {
        self.config.config_scan_depth = depth;
        self
    }

    #[must_use]
    pub fn known_agents(mut self, known_agents: Vec<KnownAgent>) -> Self {
        self.config.known_agents = known_agents;
        self
    }

    #[must_use]
    pub fn scan_targets(mut self, scan_targets: Vec<ScanTarget>) -> Self {
        self.config.scan_targets = scan_targets;
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn stale_after(mut self, window: Duration) -> Self {
        self.config.stale_after = window;
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_timeout = timeout;
        self
    }

    #[must_use]
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.config.scan_interval = interval;
        self
    }

    #[must_use]
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    #[must_use]
    pub fn max_concurrent_probes(mut self, limit: usize) -> Self {
        self.config.max_concurrent_probes = limit;
        self
    }

    /// Validate configuration and build `DiscoveryConfig`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<DiscoveryConfig, ConfigError> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let config = &self.config;

        let durations = [
            ("cache_ttl", config.cache_ttl),
            ("stale_after", config.stale_after),
            ("probe_timeout", config.probe_timeout),
            ("connect_timeout", config.connect_timeout),
            ("health_timeout", config.health_timeout),
            ("scan_interval", config.scan_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if config.max_concurrent_probes == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_probes must be greater than 0".to_string(),
            ));
        }

        if let Some(target) = config.scan_targets.iter().find(|t| t.start > t.end) {
            return Err(ConfigError::ValidationError(format!(
                "scan target {target} has start greater than end"
            )));
        }

        if let Some(agent) = config.known_agents.iter().find(|a| a.ports.is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "known agent '{}' has no ports",
                agent.name
            )));
        }

        Ok(())
    }
}

// Environment variable helper functions

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match get_env_string(key) {
        Some(val) => val
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid integer '{val}': {e}"),
            }),
        None => Ok(None),
    }
}

fn get_env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match get_env_string(key) {
        Some(val) => humantime::parse_duration(val.trim())
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid duration '{val}': {e}"),
            }),
        None => Ok(None),
    }
}
