//! # Sonar Core
//!
//! Data model and registry shared by the Sonar discovery engine and its HTTP
//! surface.
//!
//! ## Example
//!
//! ```rust
//! use sonar_core::{AgentFilter, AgentRecord, AgentRegistry, AgentStatus, AgentType};
//!
//! let registry = AgentRegistry::new();
//! registry
//!     .upsert(
//!         AgentRecord::new("localhost", 9999, "HelloWorld Agent")
//!             .with_type(AgentType::A2a)
//!             .with_status(AgentStatus::Online)
//!             .with_capability("streaming"),
//!     )
//!     .unwrap();
//!
//! let healthy = registry.list_all(&AgentFilter::new().healthy_only());
//! assert_eq!(healthy[0].id, "localhost:9999");
//! ```

pub mod error;
pub mod registry;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use registry::{AgentFilter, AgentRegistry, HealthOutcome, RegistryEvent, RegistryStats};
pub use types::{AgentRecord, AgentStatus, AgentType, agent_id, base_url};
