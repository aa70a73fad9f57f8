//! Overlay core types: value records, merge statuses and structural changes.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod workload;

pub use workload::{ContainerConfig, ContainerRecords, RecordKind, WorkloadConfig};

/// Reference to a single key inside a named secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

impl SecretKeyRef {
    pub fn is_blank(&self) -> bool { self.name.is_empty() && self.key.is_empty() }
    pub fn is_complete(&self) -> bool { !self.name.is_empty() && !self.key.is_empty() }
}

/// Where a record's value comes from. A record holds at most one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Plain(String),
    Secret(SecretKeyRef),
}

impl ValueSource {
    pub fn mode(&self) -> ValueMode {
        match self {
            ValueSource::Plain(_) => ValueMode::Plain,
            ValueSource::Secret(_) => ValueMode::Secret,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            ValueSource::Plain(v) => v.is_empty(),
            ValueSource::Secret(r) => r.is_blank(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMode {
    Plain,
    Secret,
}

/// A keyed entry of an env-var or file-mount list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord", into = "RawRecord")]
pub struct ValueRecord {
    pub key: String,
    /// Target path; only meaningful for file mounts.
    pub mount_path: Option<String>,
    pub source: Option<ValueSource>,
}

impl ValueRecord {
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), mount_path: None, source: Some(ValueSource::Plain(value.into())) }
    }

    pub fn secret(key: impl Into<String>, secret_name: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mount_path: None,
            source: Some(ValueSource::Secret(SecretKeyRef { name: secret_name.into(), key: secret_key.into() })),
        }
    }

    pub fn with_mount_path(mut self, path: impl Into<String>) -> Self {
        self.mount_path = Some(path.into());
        self
    }

    pub fn plain_value(&self) -> Option<&str> {
        match &self.source {
            Some(ValueSource::Plain(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn secret_ref(&self) -> Option<&SecretKeyRef> {
        match &self.source {
            Some(ValueSource::Secret(r)) => Some(r),
            _ => None,
        }
    }

    /// Current mode; records without a source are in plain mode.
    pub fn mode(&self) -> ValueMode {
        self.source.as_ref().map(ValueSource::mode).unwrap_or(ValueMode::Plain)
    }

    /// Switch between plain and secret mode. Switching clears the other representation;
    /// setting the current mode again keeps the value.
    pub fn set_mode(&mut self, mode: ValueMode) {
        if self.source.as_ref().map(ValueSource::mode) == Some(mode) {
            return;
        }
        self.source = Some(match mode {
            ValueMode::Plain => ValueSource::Plain(String::new()),
            ValueMode::Secret => ValueSource::Secret(SecretKeyRef::default()),
        });
    }

    /// True when nothing was entered: no key, no mount path and no value.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
            && self.mount_path.as_deref().map_or(true, str::is_empty)
            && self.source.as_ref().map_or(true, ValueSource::is_blank)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mount_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value_from: Option<RawValueFrom>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawValueFrom {
    secret_ref: SecretKeyRef,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {0:?} sets both value and valueFrom")]
    BothSources(String),
}

impl TryFrom<RawRecord> for ValueRecord {
    type Error = RecordError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let source = match (raw.value, raw.value_from) {
            (Some(_), Some(_)) => return Err(RecordError::BothSources(raw.key)),
            (Some(v), None) => Some(ValueSource::Plain(v)),
            (None, Some(vf)) => Some(ValueSource::Secret(vf.secret_ref)),
            (None, None) => None,
        };
        Ok(ValueRecord { key: raw.key, mount_path: raw.mount_path, source })
    }
}

impl From<ValueRecord> for RawRecord {
    fn from(r: ValueRecord) -> Self {
        let (value, value_from) = match r.source {
            Some(ValueSource::Plain(v)) => (Some(v), None),
            Some(ValueSource::Secret(s)) => (None, Some(RawValueFrom { secret_ref: s })),
            None => (None, None),
        };
        RawRecord { key: r.key, mount_path: r.mount_path, value, value_from }
    }
}

/// Classification of a merged entry relative to base and override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Inherited,
    Overridden,
    New,
}

/// One row of the merged view. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRecordWithStatus {
    pub record: ValueRecord,
    pub status: RecordStatus,
    /// Base version of an overridden record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_value: Option<ValueRecord>,
    /// Slot in the override list; `None` for inherited rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single path-qualified difference between two trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
}

impl Change {
    pub fn added(path: impl Into<String>, new_value: serde_json::Value) -> Self {
        Self { path: path.into(), kind: ChangeKind::Added, old_value: None, new_value: Some(new_value) }
    }

    pub fn removed(path: impl Into<String>, old_value: serde_json::Value) -> Self {
        Self { path: path.into(), kind: ChangeKind::Removed, old_value: Some(old_value), new_value: None }
    }

    pub fn modified(path: impl Into<String>, old_value: serde_json::Value, new_value: serde_json::Value) -> Self {
        Self { path: path.into(), kind: ChangeKind::Modified, old_value: Some(old_value), new_value: Some(new_value) }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<serde_json::Value>| v.as_ref().map(|v| v.to_string()).unwrap_or_default();
        match self.kind {
            ChangeKind::Added => write!(f, "+ {}: {}", self.path, show(&self.new_value)),
            ChangeKind::Removed => write!(f, "- {}: {}", self.path, show(&self.old_value)),
            ChangeKind::Modified => write!(f, "~ {}: {} -> {}", self.path, show(&self.old_value), show(&self.new_value)),
        }
    }
}

pub mod prelude {
    pub use super::{
        Change, ChangeKind, ContainerConfig, ContainerRecords, RecordKind, RecordStatus, SecretKeyRef, ValueMode,
        ValueRecord, ValueRecordWithStatus, ValueSource, WorkloadConfig,
    };
}
