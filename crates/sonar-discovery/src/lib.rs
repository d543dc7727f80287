//! # Sonar Discovery
//!
//! Finds agents and web services listening on local ports, classifies what
//! they are, and keeps an [`AgentRegistry`](sonar_core::AgentRegistry) up to
//! date.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sonar_discovery::{DiscoveryConfig, DiscoveryService};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(DiscoveryService::new(DiscoveryConfig::from_env()?)?);
//!
//! for agent in service.discover(false).await? {
//!     println!("{} {} {}", agent.id, agent.name, agent.status);
//! }
//!
//! let background = service.start_background_scan();
//! // ...
//! background.stop();
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod config_scan;
pub mod error;
pub mod health;
pub mod probe;
pub mod service;

pub use classifier::{Classification, classify};
pub use config::{
    AGENT_CONFIG_FILE_NAME, ConfigError, DiscoveryConfig, DiscoveryConfigBuilder, KnownAgent,
    ScanTarget,
};
pub use config_scan::DeclaredAgent;
pub use error::{DiscoveryError, DiscoveryResult};
pub use health::HealthChecker;
pub use probe::{AgentProbe, HttpProber, ProbeOutcome, ProbeTarget, TargetSource};
pub use service::{BackgroundTaskHandle, DiscoveryService, ScanReport};
