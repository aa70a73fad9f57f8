//! Workload override editor: merged rows, per-kind edit sessions, change preview and save.

use std::collections::BTreeSet;

use metrics::counter;
use overlay_core::{Change, RecordKind, ValueRecord, ValueRecordWithStatus, WorkloadConfig};
use overlay_diff::{diff_serialized, DiffOptions};
use overlay_merge::edit::ApplyOutcome;
use overlay_merge::{
    merge_container, validate_records, BufferField, EditBuffer, EditError, EditSession, PendingTraits, RecordIssue,
    TraitIssue,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{ControlPlane, OverlayError, OverlayResult, WorkloadRef, WorkloadSnapshot};

/// A save-blocking problem, located by container and record kind or by trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum EditorIssue {
    Record {
        container: String,
        kind: RecordKind,
        #[serde(flatten)]
        issue: RecordIssue,
    },
    Trait(TraitIssue),
}

impl std::fmt::Display for EditorIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditorIssue::Record { container, kind, issue } => write!(f, "{}.{} {}", container, kind.as_str(), issue),
            EditorIssue::Trait(t) => write!(f, "trait {}: {}", t.index, t.problem),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveReport {
    pub saved: bool,
    pub overrides: Vec<Change>,
    pub traits: Vec<Change>,
}

pub struct WorkloadEditor {
    target: WorkloadRef,
    base: WorkloadConfig,
    fetched: WorkloadConfig,
    current: WorkloadConfig,
    env: EditBuffer,
    files: EditBuffer,
    traits: PendingTraits,
    diff_opts: DiffOptions,
}

impl WorkloadEditor {
    pub fn new(target: WorkloadRef, snapshot: WorkloadSnapshot) -> Self {
        Self {
            target,
            base: snapshot.base,
            fetched: snapshot.overrides.clone(),
            current: snapshot.overrides,
            env: EditBuffer::new(),
            files: EditBuffer::new(),
            traits: PendingTraits::new(snapshot.traits),
            diff_opts: DiffOptions::default(),
        }
    }

    pub async fn load(cp: &dyn ControlPlane, target: WorkloadRef) -> OverlayResult<Self> {
        let snapshot = cp.fetch_workload(&target).await?;
        Ok(Self::new(target, snapshot))
    }

    pub fn with_diff_options(mut self, opts: DiffOptions) -> Self {
        self.diff_opts = opts;
        self
    }

    pub fn target(&self) -> &WorkloadRef { &self.target }
    pub fn base(&self) -> &WorkloadConfig { &self.base }
    pub fn overrides(&self) -> &WorkloadConfig { &self.current }
    pub fn traits(&self) -> &PendingTraits { &self.traits }
    pub fn traits_mut(&mut self) -> &mut PendingTraits { &mut self.traits }

    /// Containers known to either layer, sorted.
    pub fn containers(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self.base.container_names().chain(self.current.container_names()).collect();
        names.into_iter().collect()
    }

    pub fn rows(&self, container: &str, kind: RecordKind) -> Vec<ValueRecordWithStatus> {
        merge_container(&self.base, &self.current, container, kind)
    }

    fn buffer(&self, kind: RecordKind) -> &EditBuffer {
        match kind {
            RecordKind::Env => &self.env,
            RecordKind::File => &self.files,
        }
    }

    pub fn session(&self, kind: RecordKind) -> Option<&EditSession> { self.buffer(kind).session() }

    pub fn is_editing(&self) -> bool { self.env.is_editing() || self.files.is_editing() }

    /// Open a session on a merged row. Inherited rows are overridden first: a copy of the
    /// base record is appended to the override list and edited there.
    pub fn start_edit(&mut self, container: &str, kind: RecordKind, row: &ValueRecordWithStatus) -> Result<usize, EditError> {
        let (buffer, mut lists) = self.split(kind);
        match row.source_index {
            Some(index) => buffer.start_edit(&lists, container, index).map(|_| index),
            None => buffer.start_override(&mut lists, container, &row.record),
        }
    }

    /// Append an empty override row and open a session on it.
    pub fn add_row(&mut self, container: &str, kind: RecordKind) -> Result<usize, EditError> {
        let (buffer, mut lists) = self.split(kind);
        buffer.start_new(&mut lists, container, None)
    }

    pub fn update(&mut self, kind: RecordKind, field: BufferField) -> Result<(), EditError> {
        match kind {
            RecordKind::Env => self.env.update_buffer(field),
            RecordKind::File => self.files.update_buffer(field),
        }
    }

    pub fn apply(&mut self, kind: RecordKind) -> Result<ApplyOutcome, EditError> {
        let (buffer, mut lists) = self.split(kind);
        buffer.apply_edit(&mut lists)
    }

    pub fn cancel(&mut self, kind: RecordKind) -> Result<(), EditError> {
        let (buffer, mut lists) = self.split(kind);
        buffer.cancel_edit(&mut lists)
    }

    /// Drop an override row so the base record (if any) shows through again.
    /// Refused while a session of the same kind is open, since indices would shift.
    pub fn remove_override(&mut self, container: &str, kind: RecordKind, index: usize) -> Result<ValueRecord, EditError> {
        if let Some(s) = self.buffer(kind).session() {
            return Err(EditError::AlreadyEditing { container: s.container.clone(), index: s.index });
        }
        let list = self.current.records_mut(container, kind);
        if index >= list.len() {
            return Err(EditError::NoSuchRow { container: container.to_string(), index });
        }
        Ok(list.remove(index))
    }

    fn split(&mut self, kind: RecordKind) -> (&mut EditBuffer, overlay_core::workload::KindLists<'_>) {
        let buffer = match kind {
            RecordKind::Env => &mut self.env,
            RecordKind::File => &mut self.files,
        };
        (buffer, self.current.lists_mut(kind))
    }

    /// Override changes relative to what was fetched.
    pub fn pending_changes(&self) -> OverlayResult<Vec<Change>> {
        Ok(diff_serialized(&self.fetched.pruned(), &self.current.pruned(), self.diff_opts)?)
    }

    pub fn has_changes(&self) -> bool {
        self.fetched.pruned() != self.current.pruned() || self.traits.has_changes()
    }

    pub fn validate(&self) -> Vec<EditorIssue> {
        let mut issues = Vec::new();
        for (container, cfg) in self.current.containers.iter() {
            for kind in [RecordKind::Env, RecordKind::File] {
                for issue in validate_records(cfg.records(kind), kind) {
                    issues.push(EditorIssue::Record { container: container.clone(), kind, issue });
                }
            }
        }
        issues.extend(self.traits.validate().into_iter().map(EditorIssue::Trait));
        issues
    }

    /// Send the current overrides (and traits, when edited) to the control plane.
    ///
    /// Refused while a session is open or validation reports issues. On success the
    /// current state becomes the new baseline for change preview.
    pub async fn save(&mut self, cp: &dyn ControlPlane) -> OverlayResult<SaveReport> {
        if self.is_editing() {
            counter!("overlay_save_blocked_total", 1u64);
            return Err(OverlayError::Conflict("apply or cancel the open edit before saving".into()));
        }
        let issues = self.validate();
        if !issues.is_empty() {
            counter!("overlay_save_blocked_total", 1u64);
            let msg = issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ");
            warn!(target = %self.target, issues = issues.len(), "save blocked by validation");
            return Err(OverlayError::Validation(msg));
        }

        let overrides = self.pending_changes()?;
        let traits = self.traits.pending_changes();
        if overrides.is_empty() && traits.is_empty() {
            return Ok(SaveReport { saved: false, overrides, traits });
        }
        if !overrides.is_empty() {
            let payload = self.current.pruned();
            cp.save_overrides(&self.target, &payload).await?;
            self.current = payload.clone();
            self.fetched = payload;
        }
        if !traits.is_empty() {
            cp.save_traits(&self.target, self.traits.current()).await?;
            self.traits.commit();
        }
        counter!("overlay_save_total", 1u64);
        info!(target = %self.target, overrides = overrides.len(), traits = traits.len(), "workload saved");
        Ok(SaveReport { saved: true, overrides, traits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::RecordStatus;

    fn editor() -> WorkloadEditor {
        let mut base = WorkloadConfig::default();
        base.records_mut("main", RecordKind::Env).push(ValueRecord::plain("LOG_LEVEL", "info"));
        base.records_mut("main", RecordKind::Env).push(ValueRecord::plain("PORT", "8080"));
        let mut overrides = WorkloadConfig::default();
        overrides.records_mut("main", RecordKind::Env).push(ValueRecord::plain("DB_HOST", "db"));
        let target = WorkloadRef { namespace: "acme".into(), component: "api".into(), environment: "dev".into() };
        WorkloadEditor::new(target, WorkloadSnapshot { base, overrides, traits: vec![] })
    }

    #[test]
    fn editing_inherited_row_creates_override() {
        let mut ed = editor();
        let rows = ed.rows("main", RecordKind::Env);
        assert_eq!(rows[0].status, RecordStatus::Inherited);

        let idx = ed.start_edit("main", RecordKind::Env, &rows[0]).unwrap();
        assert_eq!(idx, 1);
        ed.update(RecordKind::Env, BufferField::PlainValue("debug".into())).unwrap();
        ed.apply(RecordKind::Env).unwrap();

        let rows = ed.rows("main", RecordKind::Env);
        assert_eq!(rows[0].status, RecordStatus::Overridden);
        assert_eq!(rows[0].record.plain_value(), Some("debug"));
        assert_eq!(rows[0].source_index, Some(1));
        assert_eq!(rows[2].record.key, "DB_HOST");
    }

    #[test]
    fn one_session_per_kind() {
        let mut ed = editor();
        ed.add_row("main", RecordKind::Env).unwrap();
        assert!(ed.add_row("main", RecordKind::Env).is_err());
        // file mounts keep their own session
        ed.add_row("main", RecordKind::File).unwrap();
        assert!(ed.session(RecordKind::File).map(|s| s.is_new_row).unwrap_or(false));
        assert!(ed.remove_override("main", RecordKind::Env, 0).is_err());
    }

    #[test]
    fn pending_changes_report_override_edits() {
        let mut ed = editor();
        assert!(ed.pending_changes().unwrap().is_empty());
        let rows = ed.rows("main", RecordKind::Env);
        let new_row = rows.iter().find(|r| r.record.key == "DB_HOST").unwrap().clone();
        ed.start_edit("main", RecordKind::Env, &new_row).unwrap();
        ed.update(RecordKind::Env, BufferField::PlainValue("db.internal".into())).unwrap();
        ed.apply(RecordKind::Env).unwrap();

        let changes = ed.pending_changes().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "containers.main.env");
        assert!(ed.has_changes());
    }

    #[test]
    fn removing_override_restores_inherited_row() {
        let mut ed = editor();
        let rows = ed.rows("main", RecordKind::Env);
        ed.start_edit("main", RecordKind::Env, &rows[1]).unwrap();
        ed.update(RecordKind::Env, BufferField::PlainValue("9090".into())).unwrap();
        ed.apply(RecordKind::Env).unwrap();
        assert_eq!(ed.rows("main", RecordKind::Env)[1].status, RecordStatus::Overridden);

        let removed = ed.remove_override("main", RecordKind::Env, 1).unwrap();
        assert_eq!(removed, ValueRecord::plain("PORT", "9090"));
        assert_eq!(ed.rows("main", RecordKind::Env)[1].status, RecordStatus::Inherited);
    }
}
