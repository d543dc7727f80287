//! HTTP server configuration

use sonar_discovery::ConfigError;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Default bind address for the query API
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8090";

/// Query API server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Upper bound on one request, including on-demand health checks
    pub request_timeout: Duration,
    pub enable_cors: bool,
    /// Run the periodic discovery loop alongside the server
    pub background_scan: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            request_timeout: Duration::from_secs(30),
            enable_cors: true,
            background_scan: true,
        }
    }
}

impl ServerConfig {
    /// Load `SONAR_BIND_ADDR` and `SONAR_REQUEST_TIMEOUT` on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = get_env_string("SONAR_BIND_ADDR") {
            config.bind_addr = addr.trim().parse().map_err(|e| ConfigError::InvalidEnvVar {
                key: "SONAR_BIND_ADDR".to_string(),
                message: format!("invalid socket address '{addr}': {e}"),
            })?;
        }

        if let Some(timeout) = get_env_string("SONAR_REQUEST_TIMEOUT") {
            config.request_timeout =
                humantime::parse_duration(timeout.trim()).map_err(|e| ConfigError::InvalidEnvVar {
                    key: "SONAR_REQUEST_TIMEOUT".to_string(),
                    message: format!("invalid duration '{timeout}': {e}"),
                })?;
        }

        if config.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_background_scan(mut self, enabled: bool) -> Self {
        self.background_scan = enabled;
        self
    }
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
