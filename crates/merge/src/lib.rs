//! Overlay merge: layers an override record list on top of a base list.
//!
//! The merged view keeps base entries in their original order (inherited or overridden)
//! and appends override-only entries in override order. Nothing here allocates state that
//! outlives a call; the view is recomputed whenever base or override change.

#![forbid(unsafe_code)]

use overlay_core::{RecordKind, RecordStatus, ValueRecord, ValueRecordWithStatus, WorkloadConfig};
use rustc_hash::{FxHashMap, FxHashSet};

pub mod edit;
pub mod traits;
pub mod validate;

pub use edit::{BufferField, EditBuffer, EditError, EditSession};
pub use traits::{PendingTraits, TraitInstance, TraitIssue};
pub use validate::{validate_records, RecordIssue, RecordProblem};

/// Key → index into `overrides`. Later duplicates replace earlier ones.
fn override_lookup(overrides: &[ValueRecord]) -> FxHashMap<&str, usize> {
    let mut lookup = FxHashMap::default();
    for (i, r) in overrides.iter().enumerate() {
        lookup.insert(r.key.as_str(), i);
    }
    lookup
}

/// Merge `base` and `overrides` into a status-tagged view.
///
/// Duplicate keys are not collapsed: the lookup keeps the last override per key, so an
/// earlier override sharing a base key does not appear, and every base duplicate points
/// at the same override slot.
pub fn merge(base: &[ValueRecord], overrides: &[ValueRecord]) -> Vec<ValueRecordWithStatus> {
    let lookup = override_lookup(overrides);
    let mut out = Vec::with_capacity(base.len() + overrides.len());
    let mut base_keys: FxHashSet<&str> = FxHashSet::default();

    for b in base {
        base_keys.insert(b.key.as_str());
        match lookup.get(b.key.as_str()) {
            Some(&idx) => out.push(ValueRecordWithStatus {
                record: overrides[idx].clone(),
                status: RecordStatus::Overridden,
                base_value: Some(b.clone()),
                source_index: Some(idx),
            }),
            None => out.push(ValueRecordWithStatus {
                record: b.clone(),
                status: RecordStatus::Inherited,
                base_value: None,
                source_index: None,
            }),
        }
    }

    for (idx, o) in overrides.iter().enumerate() {
        if base_keys.contains(o.key.as_str()) {
            continue;
        }
        out.push(ValueRecordWithStatus {
            record: o.clone(),
            status: RecordStatus::New,
            base_value: None,
            source_index: Some(idx),
        });
    }
    out
}

/// Effective records after layering, in merged-view order.
pub fn resolve(base: &[ValueRecord], overrides: &[ValueRecord]) -> Vec<ValueRecord> {
    merge(base, overrides).into_iter().map(|row| row.record).collect()
}

/// Merged view for one container of a workload.
pub fn merge_container(
    base: &WorkloadConfig,
    overrides: &WorkloadConfig,
    container: &str,
    kind: RecordKind,
) -> Vec<ValueRecordWithStatus> {
    merge(base.records(container, kind), overrides.records(container, kind))
}
