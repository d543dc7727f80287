//! Project config-file scan
//!
//! Agents can declare themselves in an `a2a-config.json` anywhere under the
//! project root. A file holds a single declaration, an array of them, or an
//! object with an `agents` array. Declarations carry either `host`/`port` or a
//! `url`; everything else is optional.
//!
//! Unreadable or malformed files are logged and skipped. Within a readable
//! file, a malformed declaration only costs that one entry.

use serde::Deserialize;
use serde_json::Value;
use sonar_core::{AgentRecord, AgentType, agent_id};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;
use walkdir::{DirEntry, WalkDir};

use crate::classifier::capability_tags;
use crate::config::AGENT_CONFIG_FILE_NAME;
use crate::probe::{ProbeTarget, TargetSource};

/// Directory names never descended into
const IGNORED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "venv"];

/// An agent declared in a project config file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredAgent {
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
    pub agent_type: Option<AgentType>,
    pub capabilities: Vec<String>,
    /// File the declaration came from
    pub source: PathBuf,
}

impl DeclaredAgent {
    pub fn id(&self) -> String {
        agent_id(&self.host, self.port)
    }

    /// Probe target carrying the declared identity.
    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget {
            host: self.host.clone(),
            port: self.port,
            expected_name: self.name.clone(),
            expected_type: self.agent_type.clone(),
            source: TargetSource::ConfigFile,
        }
    }

    /// Unverified registry record for this declaration.
    pub fn to_record(&self) -> AgentRecord {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("Agent Port {}", self.port));

        AgentRecord::new(&self.host, self.port, name)
            .with_type(self.agent_type.clone().unwrap_or(AgentType::A2a))
            .with_capabilities(self.capabilities.iter().cloned())
            .with_metadata("source", Value::from(TargetSource::ConfigFile.as_str()))
            .with_metadata(
                "config_path",
                Value::from(self.source.display().to_string()),
            )
    }
}

// ============================================================================
// File format
// ============================================================================

/// Entries stay untyped until each is read on its own.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Wrapped { agents: Vec<Value> },
    Many(Vec<Value>),
    Single(Value),
}

impl ConfigDocument {
    fn into_declarations(self) -> Vec<Value> {
        match self {
            ConfigDocument::Wrapped { agents } | ConfigDocument::Many(agents) => agents,
            ConfigDocument::Single(declaration) => vec![declaration],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDeclaration {
    #[serde(default)]
    host: Option<String>,
    /// Wider than `u16` so an out-of-range port is reported, not a parse error
    #[serde(default)]
    port: Option<u64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type", alias = "agent_type")]
    agent_type: Option<AgentType>,
    #[serde(default)]
    capabilities: Value,
}

impl RawDeclaration {
    fn resolve(self, source: &Path) -> Option<DeclaredAgent> {
        let parsed_url = self.url.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(
                    path = %source.display(),
                    url = %raw,
                    error = %e,
                    "Ignoring invalid agent url"
                );
                None
            }
        });

        let host = self
            .host
            .or_else(|| {
                parsed_url
                    .as_ref()
                    .and_then(|u| u.host_str().map(str::to_string))
            })
            .unwrap_or_else(|| "localhost".to_string());
        let port = match self.port {
            Some(raw) => match u16::try_from(raw) {
                Ok(port) => Some(port),
                Err(_) => {
                    warn!(path = %source.display(), port = raw, "Agent port out of range skipped");
                    return None;
                }
            },
            None => parsed_url.as_ref().and_then(Url::port_or_known_default),
        };

        let Some(port) = port else {
            warn!(path = %source.display(), "Agent declaration without port or url skipped");
            return None;
        };

        Some(DeclaredAgent {
            host,
            port,
            name: self.name,
            agent_type: self.agent_type,
            capabilities: capability_tags(&self.capabilities),
            source: source.to_path_buf(),
        })
    }
}

// ============================================================================
// Scanning
// ============================================================================

fn is_ignored_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
}

/// Paths of every agent config file under `root`, at most `max_depth` levels down.
pub fn find_config_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable path");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && e.file_name() == AGENT_CONFIG_FILE_NAME)
        .map(DirEntry::into_path)
        .collect()
}

/// Parse one config file's contents.
///
/// Fails only when the file is not JSON. Entries that do not read as a
/// declaration are logged and skipped.
pub fn parse_config(
    contents: &str,
    source: &Path,
) -> Result<Vec<DeclaredAgent>, serde_json::Error> {
    let document: ConfigDocument = serde_json::from_str(contents)?;
    Ok(document
        .into_declarations()
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawDeclaration>(entry) {
            Ok(raw) => raw.resolve(source),
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Malformed agent declaration skipped");
                None
            }
        })
        .collect())
}

/// Every agent declared under `root`.
///
/// Blocking; run it off the async executor.
pub fn load_declared_agents(root: &Path, max_depth: usize) -> Vec<DeclaredAgent> {
    let mut declared = Vec::new();

    for path in find_config_files(root, max_depth) {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read agent config");
                continue;
            }
        };
        match parse_config(&contents, &path) {
            Ok(agents) => {
                debug!(path = %path.display(), count = agents.len(), "Loaded agent config");
                declared.extend(agents);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to parse agent config"),
        }
    }

    declared
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonar_core::AgentStatus;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_single_declaration() {
        let agents = parse_config(
            r#"{"host": "127.0.0.1", "port": 7100, "name": "Planner", "type": "a2a",
                "capabilities": {"streaming": true}}"#,
            Path::new("a2a-config.json"),
        )
        .unwrap();

        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id(), "127.0.0.1:7100");
        assert_eq!(agents[0].name.as_deref(), Some("Planner"));
        assert_eq!(agents[0].agent_type, Some(AgentType::A2a));
        assert_eq!(agents[0].capabilities, vec!["streaming"]);
    }

    #[test]
    fn test_wrapped_and_array_forms() {
        let wrapped = parse_config(
            r#"{"agents": [{"port": 7001}, {"url": "http://127.0.0.1:7002"}]}"#,
            Path::new("x"),
        )
        .unwrap();
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[0].id(), "localhost:7001");
        assert_eq!(wrapped[1].id(), "127.0.0.1:7002");

        let array = parse_config(r#"[{"port": 7003, "capabilities": ["chat"]}]"#, Path::new("x"))
            .unwrap();
        assert_eq!(array[0].capabilities, vec!["chat"]);
    }

    #[test]
    fn test_declaration_without_port_is_skipped() {
        let agents = parse_config(r#"[{"name": "Nowhere"}, {"port": 7004}]"#, Path::new("x"))
            .unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].port, 7004);
    }

    #[test]
    fn test_bad_entry_does_not_drop_its_neighbours() {
        let agents = parse_config(
            r#"{"agents": [
                {"port": 70000, "name": "Too High"},
                {"port": 7006, "name": "Fine"},
                {"port": "seven", "name": "Not A Number"},
                "just a string",
                {"url": "http://127.0.0.1:7007"}
            ]}"#,
            Path::new("x"),
        )
        .unwrap();

        let ids: Vec<String> = agents.iter().map(DeclaredAgent::id).collect();
        assert_eq!(ids, vec!["localhost:7006", "127.0.0.1:7007"]);
        assert_eq!(agents[0].name.as_deref(), Some("Fine"));
    }

    #[test]
    fn test_record_is_unknown_with_fallback_name() {
        let agent = DeclaredAgent {
            host: "localhost".into(),
            port: 7005,
            name: None,
            agent_type: None,
            capabilities: vec![],
            source: PathBuf::from("/proj/a2a-config.json"),
        };
        let record = agent.to_record();

        assert_eq!(record.name, "Agent Port 7005");
        assert_eq!(record.status, AgentStatus::Unknown);
        assert_eq!(record.agent_type, AgentType::A2a);
        assert_eq!(record.metadata["source"], "config_file");
    }

    #[test]
    fn test_scan_skips_ignored_dirs_and_bad_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a2a-config.json", r#"{"port": 7010}"#);
        write(dir.path(), "agents/planner/a2a-config.json", r#"{"port": 7011}"#);
        write(dir.path(), "broken/a2a-config.json", "{not json");
        write(dir.path(), "node_modules/pkg/a2a-config.json", r#"{"port": 7012}"#);
        write(dir.path(), ".git/a2a-config.json", r#"{"port": 7013}"#);
        write(dir.path(), "target/debug/a2a-config.json", r#"{"port": 7014}"#);

        let mut ports: Vec<u16> = load_declared_agents(dir.path(), 6)
            .into_iter()
            .map(|a| a.port)
            .collect();
        ports.sort_unstable();

        assert_eq!(ports, vec![7010, 7011]);
    }

    #[test]
    fn test_scan_respects_depth() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b/c/a2a-config.json", r#"{"port": 7020}"#);

        assert!(load_declared_agents(dir.path(), 2).is_empty());
        assert_eq!(load_declared_agents(dir.path(), 4).len(), 1);
    }
}
