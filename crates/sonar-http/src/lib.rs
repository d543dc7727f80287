//! # Sonar HTTP
//!
//! Query API over a [`DiscoveryService`](sonar_discovery::DiscoveryService).
//!
//! | Method & Path | Purpose |
//! |---|---|
//! | `GET /agents` | list records, filtered by `agent_type`, `healthy_only`, `capability` |
//! | `GET /agents/{agent_id}` | one record |
//! | `POST /discover` | start a discovery round (`{"force": bool}`) |
//! | `POST /agents/{agent_id}/health` | re-check one agent |
//! | `GET /stats` | counts by status and type |
//! | `GET /health` | liveness of this service |
//!
//! ```rust,no_run
//! use sonar_discovery::{DiscoveryConfig, DiscoveryService};
//! use sonar_http::{ServerConfig, serve};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(DiscoveryService::new(DiscoveryConfig::from_env()?)?);
//!     serve(service, ServerConfig::from_env()?).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use config::{DEFAULT_BIND_ADDR, ServerConfig};
pub use error::{ApiError, ErrorBody};
pub use router::{AppState, router, router_with_config};
pub use server::{serve, serve_with_shutdown, shutdown_signal};
