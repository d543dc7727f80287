//! Subcommand implementations

use sonar_core::AgentRecord;
use sonar_discovery::{
    ConfigError, DiscoveryConfig, DiscoveryConfigBuilder, DiscoveryError, DiscoveryService,
    ProbeOutcome,
};
use sonar_http::ServerConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Environment configuration, optionally layered with a YAML file.
fn load_config(config_file: Option<&Path>) -> Result<DiscoveryConfig, CliError> {
    let mut builder = DiscoveryConfigBuilder::from_env()?;
    if let Some(path) = config_file {
        builder = builder.load_file(path)?;
    }
    Ok(builder.build()?)
}

/// `sonar serve`
pub async fn serve(
    config_file: Option<&Path>,
    bind: Option<SocketAddr>,
    background: bool,
) -> Result<(), CliError> {
    let discovery = load_config(config_file)?;
    let mut server = ServerConfig::from_env()?.with_background_scan(background);
    if let Some(bind) = bind {
        server = server.with_bind_addr(bind);
    }

    info!(
        scan_targets = discovery.scan_target_count(),
        known_agents = discovery.known_agents.len(),
        project_root = %discovery.project_root.display(),
        "Starting Sonar"
    );
    let service = Arc::new(DiscoveryService::new(discovery)?);
    sonar_http::serve(service, server).await?;
    Ok(())
}

/// `sonar scan`
pub async fn scan(config_file: Option<&Path>, json: bool) -> Result<(), CliError> {
    let service = DiscoveryService::new(load_config(config_file)?)?;
    let report = service.scan().await?;
    let agents = service.registry().snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    println!(
        "Probed {} targets in {:.1}s, {} agent(s) found",
        report.targets_probed,
        report.duration.as_secs_f64(),
        agents.len()
    );
    for agent in &agents {
        print_agent_line(agent);
    }
    Ok(())
}

/// `sonar check --url`. Returns whether anything answered.
pub async fn check(url: &str) -> Result<bool, CliError> {
    let service = DiscoveryService::new(DiscoveryConfig::from_env()?)?;

    match service.probe_url(url).await? {
        ProbeOutcome::Found(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(true)
        }
        ProbeOutcome::NotFound => {
            println!("No agent or service answered at {url}");
            Ok(false)
        }
    }
}

fn print_agent_line(agent: &AgentRecord) {
    println!(
        "  {:<22} {:<8} {:<10} {}",
        agent.id,
        agent.status.as_str(),
        agent.agent_type.as_str(),
        agent.name
    );
}
