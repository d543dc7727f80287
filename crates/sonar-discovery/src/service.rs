//! Discovery scheduler
//!
//! [`DiscoveryService`] owns the registry and runs scan rounds against it. A
//! round has four passes, in order:
//!
//! 1. config-file scan of the project root,
//! 2. range scan over configured ports plus declared endpoints,
//! 3. known-agent probes, whose results replace range-scan results,
//! 4. declaration of config entries nobody answered for, as `Unknown`,
//!
//! followed by eviction of stale records. Rounds are serialized, and
//! non-forced requests inside the cache TTL are served from the registry.

use chrono::Utc;
use sonar_core::{AgentRecord, AgentRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::DiscoveryConfig;
use crate::config_scan::{self, DeclaredAgent};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::health::HealthChecker;
use crate::probe::{AgentProbe, HttpProber, ProbeOutcome, ProbeTarget};

/// Summary of one scan round.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Range-scan targets after de-duplication
    pub targets_probed: usize,
    /// Distinct agents that answered in any pass
    pub found: usize,
    /// Declared entries stored as unverified
    pub declared: usize,
    pub evicted: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct ScanState {
    last_completed: Option<Instant>,
}

impl ScanState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.last_completed.is_some_and(|at| at.elapsed() < ttl)
    }
}

/// Discovery engine: registry, probes, scheduler and health checks.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    registry: Arc<AgentRegistry>,
    probe: Arc<dyn AgentProbe>,
    health: HealthChecker,
    scan_state: Mutex<ScanState>,
    scan_rounds: AtomicU64,
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("registry", &self.registry)
            .field("scan_rounds", &self.scan_rounds())
            .finish()
    }
}

impl DiscoveryService {
    /// Create a service that probes over HTTP.
    pub fn new(config: DiscoveryConfig) -> DiscoveryResult<Self> {
        let probe = Arc::new(HttpProber::new(&config)?);
        Self::with_probe(config, probe)
    }

    /// Create a service with a custom probe implementation.
    pub fn with_probe(
        config: DiscoveryConfig,
        probe: Arc<dyn AgentProbe>,
    ) -> DiscoveryResult<Self> {
        let health = HealthChecker::new(config.health_timeout)?;
        Ok(Self {
            config,
            registry: Arc::new(AgentRegistry::new()),
            probe,
            health,
            scan_state: Mutex::new(ScanState::default()),
            scan_rounds: AtomicU64::new(0),
        })
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Number of scan rounds started so far.
    pub fn scan_rounds(&self) -> u64 {
        self.scan_rounds.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Discover agents and return every registry record.
    ///
    /// Without `force`, a round completed within the cache TTL is reused and
    /// no I/O happens. Callers that queued behind a running round re-check
    /// the cache once it finishes.
    pub async fn discover(&self, force: bool) -> DiscoveryResult<Vec<AgentRecord>> {
        let mut state = self.scan_state.lock().await;

        if !force && state.is_fresh(self.config.cache_ttl) {
            debug!("Serving discovery from cache");
        } else {
            self.run_scan().await?;
            state.last_completed = Some(Instant::now());
        }

        Ok(self.registry.snapshot())
    }

    /// Run one forced round and return its summary.
    pub async fn scan(&self) -> DiscoveryResult<ScanReport> {
        let mut state = self.scan_state.lock().await;
        let report = self.run_scan().await?;
        state.last_completed = Some(Instant::now());
        Ok(report)
    }

    async fn run_scan(&self) -> DiscoveryResult<ScanReport> {
        let started = Instant::now();
        let round = self.scan_rounds.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(round, "Scan round started");

        let declared = self.load_declared().await?;

        let range_targets = self.range_targets(&declared);
        let targets_probed = range_targets.len();
        let mut found = self.probe_all(range_targets).await;

        let known_targets = self
            .config
            .known_agents
            .iter()
            .flat_map(|known| {
                known.ports.iter().map(move |&port| {
                    ProbeTarget::known(&known.host, port, &known.name, known.agent_type.clone())
                })
            })
            .collect();
        found.extend(self.probe_all(known_targets).await);

        let mut declared_count = 0;
        for agent in declared.iter().filter(|a| !found.contains(&a.id())) {
            if self.registry.declare(agent.to_record())? {
                declared_count += 1;
            }
        }

        let evicted = self
            .registry
            .evict_stale(Utc::now(), self.config.stale_after);

        let report = ScanReport {
            targets_probed,
            found: found.len(),
            declared: declared_count,
            evicted,
            duration: started.elapsed(),
        };
        info!(
            round,
            targets_probed = report.targets_probed,
            found = report.found,
            declared = report.declared,
            evicted = report.evicted.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Scan round completed"
        );
        Ok(report)
    }

    async fn load_declared(&self) -> DiscoveryResult<Vec<DeclaredAgent>> {
        let root = self.config.project_root.clone();
        let depth = self.config.config_scan_depth;
        let declared =
            tokio::task::spawn_blocking(move || config_scan::load_declared_agents(&root, depth))
                .await?;
        Ok(declared)
    }

    /// Declared endpoints first so their identity survives de-duplication.
    fn range_targets(&self, declared: &[DeclaredAgent]) -> Vec<ProbeTarget> {
        let mut seen = HashSet::new();
        let declared = declared.iter().map(DeclaredAgent::probe_target);
        let ranges = self.config.scan_targets.iter().flat_map(|range| {
            range
                .ports()
                .map(move |port| ProbeTarget::new(range.host.clone(), port))
        });

        declared
            .chain(ranges)
            .filter(|target| seen.insert(target.id()))
            .collect()
    }

    /// Probe `targets` with bounded concurrency, storing hits as they arrive.
    ///
    /// A failing or panicking probe is logged and skipped. Returns the ids
    /// that answered.
    async fn probe_all(&self, targets: Vec<ProbeTarget>) -> HashSet<String> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes));
        let mut tasks = JoinSet::new();

        for target in targets {
            let semaphore = Arc::clone(&semaphore);
            let probe = Arc::clone(&self.probe);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| DiscoveryError::task_failed(e.to_string()))?;
                Ok::<_, DiscoveryError>(probe.probe(&target).await)
            });
        }

        let mut found = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(error = %e, "Probe task failed");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Probe task panicked");
                    continue;
                }
            };

            if let ProbeOutcome::Found(record) = outcome {
                let agent_id = record.id.clone();
                match self.registry.upsert(record) {
                    Ok(()) => {
                        found.insert(agent_id);
                    }
                    Err(e) => {
                        warn!(agent_id = %agent_id, error = %e, "Discarding invalid probe result")
                    }
                }
            }
        }
        found
    }

    // ========================================================================
    // Single-target operations
    // ========================================================================

    /// Re-check one registry entry; see [`HealthChecker::check`].
    pub async fn check_health(&self, agent_id: &str) -> bool {
        self.health.check(&self.registry, agent_id).await
    }

    /// Probe one `host:port` without touching the registry.
    pub async fn probe_one(&self, host: &str, port: u16) -> ProbeOutcome {
        self.probe.probe(&ProbeTarget::new(host, port)).await
    }

    /// Probe the host and port of `url` without touching the registry.
    pub async fn probe_url(&self, url: &str) -> DiscoveryResult<ProbeOutcome> {
        let parsed =
            Url::parse(url).map_err(|e| DiscoveryError::invalid_target(url, e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| DiscoveryError::invalid_target(url, "missing host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| DiscoveryError::invalid_target(url, "missing port"))?;

        Ok(self.probe_one(host, port).await)
    }

    // ========================================================================
    // Background loop
    // ========================================================================

    /// Run forced scans every `scan_interval` until the handle is stopped.
    ///
    /// A failed or panicking round is logged and followed by `error_backoff`.
    pub fn start_background_scan(self: &Arc<Self>) -> BackgroundTaskHandle {
        let service = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let backoff = service.config.error_backoff;

            loop {
                interval.tick().await;

                let round = Arc::clone(&service);
                match tokio::spawn(async move { round.discover(true).await }).await {
                    Ok(Ok(agents)) => {
                        debug!(agents = agents.len(), "Background scan completed");
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, backoff = ?backoff, "Background scan failed");
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) => {
                        error!(error = %e, backoff = ?backoff, "Background scan panicked");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        });

        BackgroundTaskHandle { handle }
    }
}

/// Handle for the background scan loop.
#[derive(Debug)]
pub struct BackgroundTaskHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl BackgroundTaskHandle {
    /// Stop the loop. A round already in flight runs to completion.
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
