//! In-memory agent registry
//!
//! The registry is a map from `host:port` to [`AgentRecord`]. Every mutation
//! is atomic per key and none of them suspend, so API handlers can read it
//! while a scan is in flight.
//!
//! Records leave the registry only through [`AgentRegistry::evict_stale`];
//! failed health checks change a record's status but keep it listed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::types::{AgentRecord, AgentStatus, AgentType, agent_id};

/// Capacity of the registry event channel
const EVENT_CHANNEL_SIZE: usize = 256;

// ============================================================================
// Events
// ============================================================================

/// Events emitted by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A record was stored under a new id.
    AgentDiscovered { agent_id: String, name: String },
    /// An existing record was replaced without a status change.
    AgentUpdated { agent_id: String },
    /// A record's status changed.
    StatusChanged {
        agent_id: String,
        old_status: AgentStatus,
        new_status: AgentStatus,
    },
    /// A stale record was removed.
    AgentEvicted {
        agent_id: String,
        last_seen: DateTime<Utc>,
    },
}

// ============================================================================
// Health outcomes
// ============================================================================

/// Result of a targeted health probe, as applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Endpoint answered 200
    Healthy,
    /// Endpoint answered with another status code
    Failing { status_code: u16 },
    /// Connection refused, reset or timed out
    Unreachable,
}

impl HealthOutcome {
    fn status(&self) -> AgentStatus {
        match self {
            HealthOutcome::Healthy => AgentStatus::Online,
            HealthOutcome::Failing { .. } => AgentStatus::Error,
            HealthOutcome::Unreachable => AgentStatus::Offline,
        }
    }
}

// ============================================================================
// Filters and stats
// ============================================================================

/// Filter for [`AgentRegistry::list_all`].
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub agent_type: Option<AgentType>,
    /// Only records with status `Online`
    pub healthy_only: bool,
    pub capability: Option<String>,
}

impl AgentFilter {
    /// Create an empty filter (matches every record).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    pub fn healthy_only(mut self) -> Self {
        self.healthy_only = true;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Check if a record matches this filter.
    pub fn matches(&self, record: &AgentRecord) -> bool {
        if self
            .agent_type
            .as_ref()
            .is_some_and(|t| record.agent_type != *t)
        {
            return false;
        }

        if self.healthy_only && !record.is_online() {
            return false;
        }

        if self
            .capability
            .as_ref()
            .is_some_and(|c| !record.has_capability(c))
        {
            return false;
        }

        true
    }
}

/// Aggregate counts over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

// ============================================================================
// Registry
// ============================================================================

/// Keyed store of discovered agents.
pub struct AgentRegistry {
    records: DashMap<String, AgentRecord>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("records", &self.records.len())
            .finish()
    }
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            records: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn validate(record: &AgentRecord) -> RegistryResult<()> {
        let expected = agent_id(&record.host, record.port);
        if record.id != expected {
            return Err(RegistryError::invalid_record(
                &record.id,
                format!("id must be '{expected}'"),
            ));
        }
        Ok(())
    }

    /// Insert or fully replace the record stored under `record.id`.
    pub fn upsert(&self, record: AgentRecord) -> RegistryResult<()> {
        Self::validate(&record)?;

        let agent_id = record.id.clone();
        let name = record.name.clone();
        let new_status = record.status;

        match self.records.insert(agent_id.clone(), record) {
            None => {
                info!(agent_id = %agent_id, name = %name, status = %new_status, "Agent discovered");
                self.emit_event(RegistryEvent::AgentDiscovered { agent_id, name });
            }
            Some(previous) if previous.status != new_status => {
                info!(
                    agent_id = %agent_id,
                    old_status = %previous.status,
                    new_status = %new_status,
                    "Agent status changed"
                );
                self.emit_event(RegistryEvent::StatusChanged {
                    agent_id,
                    old_status: previous.status,
                    new_status,
                });
            }
            Some(_) => {
                debug!(agent_id = %agent_id, "Agent record refreshed");
                self.emit_event(RegistryEvent::AgentUpdated { agent_id });
            }
        }

        Ok(())
    }

    /// Store a declared-but-unverified record.
    ///
    /// The record is written only when nothing is stored under its id or the
    /// stored record is itself unconfirmed. Returns whether it was written.
    pub fn declare(&self, record: AgentRecord) -> RegistryResult<bool> {
        Self::validate(&record)?;

        let agent_id = record.id.clone();
        let name = record.name.clone();

        let inserted_new = match self.records.entry(agent_id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
            Entry::Occupied(mut entry) if entry.get().status == AgentStatus::Unknown => {
                entry.insert(record);
                false
            }
            Entry::Occupied(_) => return Ok(false),
        };

        if inserted_new {
            info!(agent_id = %agent_id, name = %name, "Declared agent registered");
            self.emit_event(RegistryEvent::AgentDiscovered { agent_id, name });
        } else {
            self.emit_event(RegistryEvent::AgentUpdated { agent_id });
        }

        Ok(true)
    }

    /// Apply a health-check outcome to a stored record.
    ///
    /// Success refreshes `last_seen` and resets the failure counter; failures
    /// only change the status and bump the counter.
    pub fn record_health(
        &self,
        agent_id: &str,
        outcome: HealthOutcome,
    ) -> RegistryResult<AgentRecord> {
        let (updated, old_status) = {
            let mut record = self
                .records
                .get_mut(agent_id)
                .ok_or_else(|| RegistryError::agent_not_found(agent_id))?;

            let old_status = record.status;
            record.status = outcome.status();
            match outcome {
                HealthOutcome::Healthy => {
                    record.last_seen = Utc::now();
                    record.consecutive_failures = 0;
                }
                HealthOutcome::Failing { .. } | HealthOutcome::Unreachable => {
                    record.consecutive_failures = record.consecutive_failures.saturating_add(1);
                }
            }
            (record.clone(), old_status)
        };

        if old_status != updated.status {
            info!(
                agent_id = %agent_id,
                old_status = %old_status,
                new_status = %updated.status,
                "Agent status changed"
            );
            self.emit_event(RegistryEvent::StatusChanged {
                agent_id: agent_id.to_string(),
                old_status,
                new_status: updated.status,
            });
        }

        Ok(updated)
    }

    /// Get a record by id.
    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.records.get(agent_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.records.contains_key(agent_id)
    }

    /// List records matching `filter`, ordered by host then port.
    pub fn list_all(&self, filter: &AgentFilter) -> Vec<AgentRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.host.cmp(&b.host).then(a.port.cmp(&b.port)));
        records
    }

    /// All records, ordered by host then port.
    pub fn snapshot(&self) -> Vec<AgentRecord> {
        self.list_all(&AgentFilter::default())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record whose `last_seen` is older than `now - window`.
    ///
    /// Returns the evicted ids.
    pub fn evict_stale(&self, now: DateTime<Utc>, window: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.records.retain(|id, record| {
            if record.is_stale_at(now, window) {
                evicted.push((id.clone(), record.last_seen));
                false
            } else {
                true
            }
        });

        let mut ids = Vec::with_capacity(evicted.len());
        for (agent_id, last_seen) in evicted {
            info!(agent_id = %agent_id, last_seen = %last_seen, "Evicted stale agent");
            ids.push(agent_id.clone());
            self.emit_event(RegistryEvent::AgentEvicted {
                agent_id,
                last_seen,
            });
        }
        ids
    }

    /// Count records by status and type.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for record in self.records.iter() {
            stats.total_agents += 1;
            *stats
                .by_status
                .entry(record.status.to_string())
                .or_insert(0) += 1;
            *stats
                .by_type
                .entry(record.agent_type.to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn online(port: u16, agent_type: AgentType) -> AgentRecord {
        AgentRecord::new("localhost", port, format!("Service-{port}"))
            .with_type(agent_type)
            .with_status(AgentStatus::Online)
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let registry = AgentRegistry::new();
        registry.upsert(online(9999, AgentType::Service)).unwrap();

        let mut renamed = online(9999, AgentType::A2a);
        renamed.name = "HelloWorld Agent".into();
        registry.upsert(renamed).unwrap();

        assert_eq!(registry.len(), 1);
        let stored = registry.get("localhost:9999").unwrap();
        assert_eq!(stored.name, "HelloWorld Agent");
        assert_eq!(stored.agent_type, AgentType::A2a);
    }

    #[test]
    fn test_upsert_rejects_mismatched_id() {
        let registry = AgentRegistry::new();
        let mut record = online(8000, AgentType::Web);
        record.id = "elsewhere:1".into();

        let err = registry.upsert(record).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRecord { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_unique_and_canonical() {
        let registry = AgentRegistry::new();
        for port in [3000, 3001, 3000, 8000, 8000] {
            registry.upsert(online(port, AgentType::Web)).unwrap();
        }

        let records = registry.snapshot();
        let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), records.len());
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.id, format!("{}:{}", record.host, record.port));
        }
    }

    #[test]
    fn test_healthy_filter_is_online_subset() {
        let registry = AgentRegistry::new();
        registry.upsert(online(3000, AgentType::Web)).unwrap();
        registry
            .upsert(online(3001, AgentType::Web).with_status(AgentStatus::Offline))
            .unwrap();
        registry
            .upsert(online(3002, AgentType::Api).with_status(AgentStatus::Error))
            .unwrap();
        registry.upsert(online(3003, AgentType::Api)).unwrap();

        let healthy = registry.list_all(&AgentFilter::new().healthy_only());
        let expected: Vec<_> = registry
            .snapshot()
            .into_iter()
            .filter(|r| r.status == AgentStatus::Online)
            .collect();
        assert_eq!(healthy, expected);
        assert_eq!(healthy.len(), 2);
    }

    #[test]
    fn test_type_and_capability_filters() {
        let registry = AgentRegistry::new();
        registry
            .upsert(online(3000, AgentType::Web).with_capability("ui"))
            .unwrap();
        registry
            .upsert(online(8000, AgentType::Api).with_capability("rest"))
            .unwrap();

        let apis = registry.list_all(&AgentFilter::new().with_type(AgentType::Api));
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].port, 8000);

        let ui = registry.list_all(&AgentFilter::new().with_capability("UI"));
        assert_eq!(ui.len(), 1);
        assert_eq!(ui[0].port, 3000);
    }

    #[test]
    fn test_evict_stale_removes_old_records() {
        let registry = AgentRegistry::new();
        let now = Utc::now();
        registry
            .upsert(
                online(3000, AgentType::Web).with_last_seen(now - chrono::Duration::minutes(10)),
            )
            .unwrap();
        registry
            .upsert(online(3001, AgentType::Web).with_last_seen(now - chrono::Duration::minutes(1)))
            .unwrap();

        let evicted = registry.evict_stale(now, Duration::from_secs(300));

        assert_eq!(evicted, vec!["localhost:3000".to_string()]);
        assert!(registry.get("localhost:3000").is_none());
        assert!(
            registry
                .snapshot()
                .iter()
                .all(|r| !r.is_stale_at(now, Duration::from_secs(300)))
        );
    }

    #[test]
    fn test_record_health_transitions() {
        let registry = AgentRegistry::new();
        registry.upsert(online(9999, AgentType::A2a)).unwrap();

        let record = registry
            .record_health("localhost:9999", HealthOutcome::Unreachable)
            .unwrap();
        assert_eq!(record.status, AgentStatus::Offline);
        assert_eq!(record.consecutive_failures, 1);

        let record = registry
            .record_health("localhost:9999", HealthOutcome::Failing { status_code: 503 })
            .unwrap();
        assert_eq!(record.status, AgentStatus::Error);
        assert_eq!(record.consecutive_failures, 2);

        let record = registry
            .record_health("localhost:9999", HealthOutcome::Healthy)
            .unwrap();
        assert_eq!(record.status, AgentStatus::Online);
        assert_eq!(record.consecutive_failures, 0);

        assert!(matches!(
            registry.record_health("localhost:1", HealthOutcome::Healthy),
            Err(RegistryError::AgentNotFound { .. })
        ));
    }

    #[test]
    fn test_declare_never_downgrades_confirmed_record() {
        let registry = AgentRegistry::new();
        registry.upsert(online(7000, AgentType::A2a)).unwrap();

        let declared = AgentRecord::new("localhost", 7000, "Declared");
        assert!(!registry.declare(declared).unwrap());
        assert_eq!(registry.get("localhost:7000").unwrap().status, AgentStatus::Online);

        let fresh = AgentRecord::new("localhost", 7001, "Declared");
        assert!(registry.declare(fresh.clone()).unwrap());
        assert!(registry.declare(fresh).unwrap());
        assert_eq!(registry.get("localhost:7001").unwrap().status, AgentStatus::Unknown);
    }

    #[test]
    fn test_stats() {
        let registry = AgentRegistry::new();
        registry.upsert(online(3000, AgentType::Web)).unwrap();
        registry.upsert(online(3001, AgentType::Web)).unwrap();
        registry
            .upsert(online(9999, AgentType::A2a).with_status(AgentStatus::Offline))
            .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.by_status.get("online"), Some(&2));
        assert_eq!(stats.by_status.get("offline"), Some(&1));
        assert_eq!(stats.by_type.get("web"), Some(&2));
        assert_eq!(stats.by_type.get("a2a"), Some(&1));
    }

    #[test]
    fn test_event_subscription() {
        let registry = AgentRegistry::new();
        let mut rx = registry.subscribe();

        registry.upsert(online(9999, AgentType::A2a)).unwrap();
        match rx.try_recv().unwrap() {
            RegistryEvent::AgentDiscovered { agent_id, .. } => {
                assert_eq!(agent_id, "localhost:9999");
            }
            other => panic!("Expected AgentDiscovered event, got {other:?}"),
        }

        registry
            .record_health("localhost:9999", HealthOutcome::Unreachable)
            .unwrap();
        match rx.try_recv().unwrap() {
            RegistryEvent::StatusChanged {
                old_status,
                new_status,
                ..
            } => {
                assert_eq!(old_status, AgentStatus::Online);
                assert_eq!(new_status, AgentStatus::Offline);
            }
            other => panic!("Expected StatusChanged event, got {other:?}"),
        }

        registry.evict_stale(
            Utc::now() + chrono::Duration::minutes(10),
            Duration::from_secs(300),
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            RegistryEvent::AgentEvicted { .. }
        ));
    }
}
