//! Single-row edit buffer.
//!
//! An [`EditBuffer`] is either idle or holds exactly one [`EditSession`]. The session works
//! on a detached copy of the row; committed lists only change on `start_new` (the row is
//! appended), `apply_edit` and `cancel_edit` of a new row. Calls that are illegal in the
//! current state leave everything untouched and return an [`EditError`].

use overlay_core::workload::RecordLists;
use overlay_core::{ValueMode, ValueRecord, ValueSource};
use tracing::debug;

/// A field-level mutation of the buffered record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferField {
    Key(String),
    MountPath(String),
    Mode(ValueMode),
    /// Switches the record to plain mode when needed.
    PlainValue(String),
    /// Switches the record to secret mode when needed.
    SecretName(String),
    /// Switches the record to secret mode when needed.
    SecretKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub container: String,
    pub index: usize,
    pub is_new_row: bool,
    pub buffer: ValueRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("an edit session is already open on {container}[{index}]")]
    AlreadyEditing { container: String, index: usize },
    #[error("no edit session is open")]
    NotEditing,
    #[error("container {container:?} has no row {index}")]
    NoSuchRow { container: String, index: usize },
}

/// What `apply_edit` did to the committed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Written(usize),
    Removed(usize),
}

#[derive(Debug, Default)]
pub struct EditBuffer {
    session: Option<EditSession>,
}

impl EditBuffer {
    pub fn new() -> Self { Self { session: None } }

    pub fn is_editing(&self) -> bool { self.session.is_some() }

    pub fn session(&self) -> Option<&EditSession> { self.session.as_ref() }

    pub fn is_editing_row(&self, container: &str, index: usize) -> bool {
        self.session.as_ref().map_or(false, |s| s.container == container && s.index == index)
    }

    fn ensure_idle(&self) -> Result<(), EditError> {
        match &self.session {
            Some(s) => {
                debug!(container = %s.container, index = s.index, "edit session already open; ignoring start");
                Err(EditError::AlreadyEditing { container: s.container.clone(), index: s.index })
            }
            None => Ok(()),
        }
    }

    /// Open a session on an existing committed row.
    pub fn start_edit<L: RecordLists + ?Sized>(&mut self, lists: &L, container: &str, index: usize) -> Result<(), EditError> {
        self.ensure_idle()?;
        let row = lists
            .list(container)
            .and_then(|l| l.get(index))
            .ok_or_else(|| EditError::NoSuchRow { container: container.to_string(), index })?;
        self.session = Some(EditSession {
            container: container.to_string(),
            index,
            is_new_row: false,
            buffer: row.clone(),
        });
        Ok(())
    }

    /// Append a new row (the seed, or an empty record) and open a session on it.
    /// Returns the index of the appended row.
    pub fn start_new<L: RecordLists + ?Sized>(
        &mut self,
        lists: &mut L,
        container: &str,
        seed: Option<ValueRecord>,
    ) -> Result<usize, EditError> {
        self.ensure_idle()?;
        let buffer = seed.unwrap_or_default();
        let list = lists.list_mut(container);
        list.push(buffer.clone());
        let index = list.len() - 1;
        self.session = Some(EditSession { container: container.to_string(), index, is_new_row: true, buffer });
        Ok(index)
    }

    /// Start overriding an inherited record: the new row is seeded with a copy of it.
    pub fn start_override<L: RecordLists + ?Sized>(
        &mut self,
        lists: &mut L,
        container: &str,
        inherited: &ValueRecord,
    ) -> Result<usize, EditError> {
        self.start_new(lists, container, Some(inherited.clone()))
    }

    pub fn update_buffer(&mut self, field: BufferField) -> Result<(), EditError> {
        let session = self.session.as_mut().ok_or(EditError::NotEditing)?;
        let buf = &mut session.buffer;
        match field {
            BufferField::Key(k) => buf.key = k,
            BufferField::MountPath(p) => buf.mount_path = Some(p),
            BufferField::Mode(m) => buf.set_mode(m),
            BufferField::PlainValue(v) => buf.source = Some(ValueSource::Plain(v)),
            BufferField::SecretName(name) => {
                buf.set_mode(ValueMode::Secret);
                if let Some(ValueSource::Secret(r)) = buf.source.as_mut() {
                    r.name = name;
                }
            }
            BufferField::SecretKey(key) => {
                buf.set_mode(ValueMode::Secret);
                if let Some(ValueSource::Secret(r)) = buf.source.as_mut() {
                    r.key = key;
                }
            }
        }
        Ok(())
    }

    /// Commit the buffer. An empty buffer removes the row instead of writing it.
    pub fn apply_edit<L: RecordLists + ?Sized>(&mut self, lists: &mut L) -> Result<ApplyOutcome, EditError> {
        let session = self.session.take().ok_or(EditError::NotEditing)?;
        let list = lists.list_mut(&session.container);
        if session.index >= list.len() {
            debug!(container = %session.container, index = session.index, "edit target vanished; dropping session");
            return Err(EditError::NoSuchRow { container: session.container, index: session.index });
        }
        if session.buffer.is_empty() {
            list.remove(session.index);
            Ok(ApplyOutcome::Removed(session.index))
        } else {
            list[session.index] = session.buffer;
            Ok(ApplyOutcome::Written(session.index))
        }
    }

    /// Discard the buffer. A row that was never committed is removed.
    pub fn cancel_edit<L: RecordLists + ?Sized>(&mut self, lists: &mut L) -> Result<(), EditError> {
        let session = self.session.take().ok_or(EditError::NotEditing)?;
        if session.is_new_row {
            let list = lists.list_mut(&session.container);
            if session.index < list.len() {
                list.remove(session.index);
            }
        }
        Ok(())
    }
}
