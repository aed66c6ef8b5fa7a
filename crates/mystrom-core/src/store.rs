// ── State store interface ──
//
// The engine writes into a hierarchical key/value store with per-node
// metadata (kind, value type, writability). The hosting runtime owns the
// real store; `MemoryStore` is the in-process implementation used by the
// binary and the tests, with optional JSON snapshot persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;

// ── Values ───────────────────────────────────────────────────────────

/// Runtime type of a state node, fixed when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Boolean,
    Number,
    String,
    /// JSON array stored as its serialized text.
    Array,
    /// First observation was `null`.
    Mixed,
}

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl StateValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Mixed,
            Self::Bool(_) => ValueKind::Boolean,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::String,
        }
    }

    /// Lenient boolean view used for command nodes: numbers are truthy when
    /// non-zero, text accepts `true`/`false`/`on`/`off`/`1`/`0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Some(true),
                "false" | "off" | "0" => Some(false),
                _ => None,
            },
            Self::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) | Self::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as it goes on the wire: text verbatim, everything else
    /// in its JSON spelling.
    pub fn to_raw_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ── Objects ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Device,
    Channel,
    State,
}

/// Metadata attached to a node when it is first created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub kind: ObjectKind,
    pub name: String,
    pub role: String,
    /// `None` for devices and channels.
    pub value_kind: Option<ValueKind>,
    pub writable: bool,
}

impl ObjectMeta {
    pub fn device(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Device,
            name: name.into(),
            role: "indicator".into(),
            value_kind: None,
            writable: false,
        }
    }

    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Channel,
            ..Self::device(name)
        }
    }

    pub fn state(name: impl Into<String>, value_kind: ValueKind, writable: bool) -> Self {
        Self {
            kind: ObjectKind::State,
            name: name.into(),
            role: "indicator".into(),
            value_kind: Some(value_kind),
            writable,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

/// Current value of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub value: StateValue,
    /// `true` when written by the engine, `false` for user-originated writes
    /// still waiting to be acted on.
    pub ack: bool,
    pub updated_at: DateTime<Utc>,
}

// ── Store trait ──────────────────────────────────────────────────────

/// Narrow interface to the hosting runtime's object/state store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the object if it does not exist. Existing metadata is never
    /// overwritten. Returns `true` if the object was created.
    async fn ensure_object(&self, path: &str, meta: ObjectMeta) -> Result<bool, CoreError>;

    async fn get_state(&self, path: &str) -> Result<Option<State>, CoreError>;

    /// Overwrite the value in place.
    async fn set_state(&self, path: &str, value: StateValue, ack: bool) -> Result<(), CoreError>;
}

// ── MemoryStore ──────────────────────────────────────────────────────

/// Concurrent in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<String, ObjectMeta>,
    states: DashMap<String, State>,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    objects: BTreeMap<String, ObjectMeta>,
    states: BTreeMap<String, State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`save`](Self::save). A missing file
    /// yields an empty store.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "no state snapshot, starting empty");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| CoreError::Store {
            message: format!("corrupt state snapshot {}: {e}", path.display()),
        })?;

        Ok(Self {
            objects: snapshot.objects.into_iter().collect(),
            states: snapshot.states.into_iter().collect(),
        })
    }

    /// Write every object and state to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let snapshot = Snapshot {
            objects: self
                .objects
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            states: self
                .states
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| CoreError::Store {
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn object(&self, path: &str) -> Option<ObjectMeta> {
        self.objects.get(path).map(|r| r.value().clone())
    }

    pub fn value(&self, path: &str) -> Option<StateValue> {
        self.states.get(path).map(|r| r.value().value.clone())
    }

    /// Sorted paths of all objects under `prefix` (inclusive).
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        let nested = format!("{prefix}.");
        let mut paths: Vec<String> = self
            .objects
            .iter()
            .map(|e| e.key().clone())
            .filter(|p| p == prefix || p.starts_with(&nested))
            .collect();
        paths.sort();
        paths
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn ensure_object(&self, path: &str, meta: ObjectMeta) -> Result<bool, CoreError> {
        if self.objects.contains_key(path) {
            return Ok(false);
        }
        self.objects.entry(path.to_owned()).or_insert(meta);
        Ok(true)
    }

    async fn get_state(&self, path: &str) -> Result<Option<State>, CoreError> {
        Ok(self.states.get(path).map(|r| r.value().clone()))
    }

    async fn set_state(&self, path: &str, value: StateValue, ack: bool) -> Result<(), CoreError> {
        self.states.insert(
            path.to_owned(),
            State {
                value,
                ack,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}
