//! Workload configuration shape exchanged with the control plane.
//!
//! Unknown fields are carried in `extra` so a fetched configuration serializes back
//! with the same shape it arrived in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ValueRecord;

/// Records keyed by container name.
pub type ContainerRecords = BTreeMap<String, Vec<ValueRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Env,
    File,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Env => "env",
            RecordKind::File => "files",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<ValueRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ValueRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContainerConfig {
    pub fn is_empty(&self) -> bool { self.env.is_empty() && self.files.is_empty() && self.extra.is_empty() }

    pub fn records(&self, kind: RecordKind) -> &[ValueRecord] {
        match kind {
            RecordKind::Env => &self.env,
            RecordKind::File => &self.files,
        }
    }

    pub fn records_mut(&mut self, kind: RecordKind) -> &mut Vec<ValueRecord> {
        match kind {
            RecordKind::Env => &mut self.env,
            RecordKind::File => &mut self.files,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkloadConfig {
    /// Records of one container; empty when the container is unknown.
    pub fn records(&self, container: &str, kind: RecordKind) -> &[ValueRecord] {
        self.containers.get(container).map(|c| c.records(kind)).unwrap_or(&[])
    }

    pub fn records_mut(&mut self, container: &str, kind: RecordKind) -> &mut Vec<ValueRecord> {
        self.containers.entry(container.to_string()).or_default().records_mut(kind)
    }

    /// Mutable view over one record kind, usable wherever [`RecordLists`] is expected.
    pub fn lists_mut(&mut self, kind: RecordKind) -> KindLists<'_> {
        KindLists { config: self, kind }
    }

    /// Copy without containers that carry nothing.
    pub fn pruned(&self) -> WorkloadConfig {
        let mut out = self.clone();
        out.containers.retain(|_, c| !c.is_empty());
        out
    }

    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }
}

/// Per-container record lists an edit session can target.
pub trait RecordLists {
    fn list(&self, container: &str) -> Option<&Vec<ValueRecord>>;
    /// Returns the list for `container`, creating it when missing.
    fn list_mut(&mut self, container: &str) -> &mut Vec<ValueRecord>;
}

impl RecordLists for ContainerRecords {
    fn list(&self, container: &str) -> Option<&Vec<ValueRecord>> { self.get(container) }
    fn list_mut(&mut self, container: &str) -> &mut Vec<ValueRecord> {
        self.entry(container.to_string()).or_default()
    }
}

pub struct KindLists<'a> {
    config: &'a mut WorkloadConfig,
    kind: RecordKind,
}

impl RecordLists for KindLists<'_> {
    fn list(&self, container: &str) -> Option<&Vec<ValueRecord>> {
        self.config.containers.get(container).map(|c| match self.kind {
            RecordKind::Env => &c.env,
            RecordKind::File => &c.files,
        })
    }

    fn list_mut(&mut self, container: &str) -> &mut Vec<ValueRecord> {
        self.config.records_mut(container, self.kind)
    }
}
