//! Per-row validation of record lists before save.

use overlay_core::{RecordKind, ValueRecord, ValueSource};
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "problem", rename_all = "camelCase")]
pub enum RecordProblem {
    #[error("a key is required when a value is set")]
    MissingKey,
    #[error("file mounts need a mount path")]
    MissingMountPath,
    #[error("secret reference needs both a secret name and a key")]
    IncompleteSecretRef,
    #[error("key {key:?} is already used by row {first}")]
    DuplicateKey { key: String, first: usize },
}

/// A problem attached to one row of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordIssue {
    pub index: usize,
    #[serde(flatten)]
    pub problem: RecordProblem,
}

impl std::fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.index, self.problem)
    }
}

/// Validate one list. Empty rows are skipped; they are dropped on apply anyway.
pub fn validate_records(records: &[ValueRecord], kind: RecordKind) -> Vec<RecordIssue> {
    let mut issues = Vec::new();
    let mut seen: FxHashMap<&str, usize> = FxHashMap::default();

    for (index, r) in records.iter().enumerate() {
        if r.is_empty() {
            continue;
        }
        if r.key.is_empty() {
            issues.push(RecordIssue { index, problem: RecordProblem::MissingKey });
        } else if let Some(&first) = seen.get(r.key.as_str()) {
            issues.push(RecordIssue { index, problem: RecordProblem::DuplicateKey { key: r.key.clone(), first } });
        } else {
            seen.insert(r.key.as_str(), index);
        }
        if kind == RecordKind::File && r.mount_path.as_deref().map_or(true, str::is_empty) {
            issues.push(RecordIssue { index, problem: RecordProblem::MissingMountPath });
        }
        if let Some(ValueSource::Secret(s)) = &r.source {
            if !s.is_complete() {
                issues.push(RecordIssue { index, problem: RecordProblem::IncompleteSecretRef });
            }
        }
    }
    issues
}
