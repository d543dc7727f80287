//! Response classification
//!
//! Turns the body of a probe response into a name, type and capability set.
//! Structured agent cards are read field by field; anything else goes through
//! ordered keyword tables. The tables are heuristics, not an exhaustive
//! catalogue: they recognise the services commonly found on a development box
//! and fall back to `Service-{port}` otherwise.

use serde_json::{Map, Value};
use sonar_core::AgentType;

/// Characters of the body kept in record metadata
pub const CONTENT_PREVIEW_CHARS: usize = 200;

/// Outcome of classifying one response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub name: String,
    pub agent_type: AgentType,
    pub capabilities: Vec<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub uptime: Option<Value>,
    /// The body was a structured agent card
    pub structured: bool,
}

// ============================================================================
// Keyword tables
// ============================================================================

/// Keywords and the label they select. Matching is case-insensitive
/// substring search on the body.
type KeywordRule<T> = (&'static [&'static str], T);

const HTML_MARKERS: &[&str] = &["<html", "<!doctype html"];

/// First match wins.
const NAME_RULES: &[KeywordRule<&str>] = &[
    (&["a2a inspector", "inspector"], "A2A Inspector"),
    (&["analytics", "dashboard"], "Analytics Service"),
    (HTML_MARKERS, "Web UI"),
];

/// First match wins.
const TYPE_RULES: &[KeywordRule<AgentType>] = &[
    (&["debug", "inspector"], AgentType::Debug),
    (&["analytics", "metrics"], AgentType::Analytics),
    (&["api", "swagger", "openapi"], AgentType::Api),
    (HTML_MARKERS, AgentType::Web),
];

/// Every matching rule contributes its tag.
const CAPABILITY_RULES: &[KeywordRule<&str>] = &[
    (&["api", "rest", "json"], "rest"),
    (&["websocket", "socket.io", "ws://", "wss://"], "websocket"),
    (&["debug", "inspector"], "debug"),
    (&["analytics", "metrics", "chart"], "analytics"),
    (HTML_MARKERS, "ui"),
    (&["chat", "conversation"], "chat"),
];

fn matches_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

fn first_match<T: Clone>(haystack: &str, rules: &[KeywordRule<T>]) -> Option<T> {
    rules
        .iter()
        .find(|(keywords, _)| matches_any(haystack, keywords))
        .map(|(_, label)| label.clone())
}

// ============================================================================
// Structured cards
// ============================================================================

/// Capability tags from a card's `capabilities` value.
///
/// A flag object yields its `true` keys; an array yields its strings.
pub fn capability_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Object(flags) => flags
            .iter()
            .filter(|(_, enabled)| enabled.as_bool() == Some(true))
            .map(|(name, _)| name.clone())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn push_unique(tags: &mut Vec<String>, tag: impl Into<String>) {
    let tag = tag.into();
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Tags of every skill object in a card's `skills` array.
///
/// Entries that are not objects, and tags that are not strings, are ignored.
fn skill_tags(skills: Option<&Value>) -> impl Iterator<Item = &str> {
    skills
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|skill| skill.get("tags").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
}

/// Read a card field by field. Only `name` has to be well formed; optional
/// fields of the wrong type are dropped.
fn classify_card(name: &str, card: &Map<String, Value>) -> Classification {
    let mut capabilities = Vec::new();
    if let Some(flags) = card.get("capabilities") {
        for tag in capability_tags(flags) {
            push_unique(&mut capabilities, tag);
        }
    }
    for tag in skill_tags(card.get("skills")) {
        push_unique(&mut capabilities, tag);
    }

    Classification {
        name: name.to_string(),
        agent_type: AgentType::A2a,
        capabilities,
        description: card
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        version: card.get("version").and_then(scalar_to_string),
        uptime: card.get("uptime").filter(|v| !v.is_null()).cloned(),
        structured: true,
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Classify a response body.
///
/// Never fails: malformed JSON falls through to the text heuristics.
pub fn classify(body: &str, content_type: Option<&str>, port: u16) -> Classification {
    let parsed = serde_json::from_str::<Value>(body).ok();

    if let Some(Value::Object(object)) = &parsed
        && let Some(name) = object.get("name").and_then(Value::as_str)
    {
        return classify_card(name, object);
    }

    let lowered = body.to_lowercase();
    let mut capabilities: Vec<String> = CAPABILITY_RULES
        .iter()
        .filter(|(keywords, _)| matches_any(&lowered, keywords))
        .map(|(_, tag)| tag.to_string())
        .collect();

    let is_json = parsed.is_some()
        || content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    if is_json {
        push_unique(&mut capabilities, "rest");
    }

    // Health endpoints often report version and uptime without a name
    let (version, uptime) = match parsed {
        Some(Value::Object(mut object)) => (
            object.remove("version").as_ref().and_then(scalar_to_string),
            object.remove("uptime"),
        ),
        _ => (None, None),
    };

    Classification {
        name: first_match(&lowered, NAME_RULES)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Service-{port}")),
        agent_type: first_match(&lowered, TYPE_RULES).unwrap_or(AgentType::Service),
        capabilities,
        description: None,
        version,
        uptime,
        structured: false,
    }
}

/// First [`CONTENT_PREVIEW_CHARS`] characters of a body.
pub fn content_preview(body: &str) -> String {
    body.chars().take(CONTENT_PREVIEW_CHARS).collect()
}
