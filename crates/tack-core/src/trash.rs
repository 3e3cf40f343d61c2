use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::Result;
use crate::model::{ItemKind, Note, Task};
use crate::store::{RecordQuery, RecordStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrashedRecord {
    Task(Task),
    Note(Note),
}

/// One row of the trash view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrashedItem {
    pub kind: ItemKind,
    pub deleted_at: Option<DateTime<Utc>>,
    pub item: TrashedRecord,
}

impl TrashedItem {
    pub fn id(&self) -> Uuid {
        match &self.item {
            TrashedRecord::Task(task) => task.id,
            TrashedRecord::Note(note) => note.id,
        }
    }

    pub fn title(&self) -> &str {
        match &self.item {
            TrashedRecord::Task(task) => &task.title,
            TrashedRecord::Note(note) => &note.title,
        }
    }
}

/// Newest deletion first; items missing `deleted_at` go last. Equal
/// timestamps keep their input order, tasks before notes.
fn by_deleted_at_desc(a: &TrashedItem, b: &TrashedItem) -> Ordering {
    match (a.deleted_at, b.deleted_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merges trashed tasks and notes into one reverse-chronological list.
/// Records that are not flagged deleted are skipped.
pub fn merge_trashed(tasks: Vec<Task>, notes: Vec<Note>) -> Vec<TrashedItem> {
    let mut items: Vec<TrashedItem> = tasks
        .into_iter()
        .filter(|task| task.deleted)
        .map(|task| TrashedItem {
            kind: ItemKind::Task,
            deleted_at: task.deleted_at,
            item: TrashedRecord::Task(task),
        })
        .chain(notes.into_iter().filter(|note| note.deleted).map(|note| TrashedItem {
            kind: ItemKind::Note,
            deleted_at: note.deleted_at,
            item: TrashedRecord::Note(note),
        }))
        .collect();
    items.sort_by(by_deleted_at_desc);
    items
}

impl<S: RecordStore> Engine<S> {
    #[instrument(skip(self))]
    pub fn list_trashed(&self) -> Result<Vec<TrashedItem>> {
        let owner = self.owner()?;
        let query = RecordQuery::owned_by(owner).trashed();
        let tasks = self.store().query_tasks(&query)?;
        let notes = self.store().query_notes(&query)?;
        Ok(merge_trashed(tasks, notes))
    }

    /// Badge value: number of trashed tasks, without loading them.
    pub fn trashed_task_count(&self) -> Result<usize> {
        let owner = self.owner()?;
        Ok(self.store().count_tasks(&RecordQuery::owned_by(owner).trashed())?)
    }

    #[instrument(skip(self), fields(kind = %kind, id = %id))]
    pub fn restore_item(&self, kind: ItemKind, id: Uuid) -> Result<()> {
        match kind {
            ItemKind::Task => self.restore_task(id).map(|_| ()),
            ItemKind::Note => self.restore_note(id).map(|_| ()),
        }
    }

    /// Hard delete with no undo; callers confirm with the user first.
    #[instrument(skip(self), fields(kind = %kind, id = %id))]
    pub fn purge_item(&self, kind: ItemKind, id: Uuid) -> Result<()> {
        match kind {
            ItemKind::Task => self.purge_task(id),
            ItemKind::Note => self.purge_note(id),
        }
    }

    /// Purges everything in the owner's trash and returns how many records
    /// were removed.
    #[instrument(skip(self))]
    pub fn empty_trash(&self) -> Result<usize> {
        let items = self.list_trashed()?;
        for item in &items {
            self.purge_item(item.kind, item.id())?;
        }
        info!(purged = items.len(), "trash emptied");
        Ok(items.len())
    }
}
