//! # Sonar
//!
//! Discovery and health monitoring for agents running on the local machine.
//!
//! Sonar probes configured port ranges, a table of well-known agent ports and
//! endpoints declared in `a2a-config.json` files, classifies whatever answers,
//! and keeps the results in an in-memory registry exposed over HTTP.
//!
//! The workspace is split into:
//!
//! - [`model`]: record model and [`AgentRegistry`](model::AgentRegistry)
//! - [`discovery`]: probes, classifier, scheduler and health checks
//! - [`http`]: the axum query API
//!
//! ```rust,no_run
//! use sonar::discovery::{DiscoveryConfig, DiscoveryService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(DiscoveryService::new(DiscoveryConfig::default())?);
//!     let agents = service.discover(false).await?;
//!     println!("{} agent(s) discovered", agents.len());
//!     Ok(())
//! }
//! ```

pub use sonar_core as model;
pub use sonar_discovery as discovery;
pub use sonar_http as http;

pub use sonar_core::{AgentRecord, AgentRegistry, AgentStatus, AgentType};
pub use sonar_discovery::{DiscoveryConfig, DiscoveryService};
