use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::model::{Note, NoteChanges, OwnerId, Task, TaskChanges};

/// Which list a task query is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListScope {
    #[default]
    Any,
    /// Tasks that belong to no list.
    Unlisted,
    List(Uuid),
}

impl ListScope {
    pub fn of(list_id: Option<Uuid>) -> Self {
        match list_id {
            Some(id) => ListScope::List(id),
            None => ListScope::Unlisted,
        }
    }

    fn contains(self, list_id: Option<Uuid>) -> bool {
        match self {
            ListScope::Any => true,
            ListScope::Unlisted => list_id.is_none(),
            ListScope::List(id) => list_id == Some(id),
        }
    }
}

/// Owner-scoped selection understood by every record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub owner_id: OwnerId,
    pub deleted: Option<bool>,
    pub list: ListScope,
}

impl RecordQuery {
    pub fn owned_by(owner_id: impl Into<OwnerId>) -> Self {
        Self {
            owner_id: owner_id.into(),
            deleted: None,
            list: ListScope::Any,
        }
    }

    #[must_use]
    pub fn trashed(mut self) -> Self {
        self.deleted = Some(true);
        self
    }

    #[must_use]
    pub fn live(mut self) -> Self {
        self.deleted = Some(false);
        self
    }

    #[must_use]
    pub fn in_list(mut self, list: ListScope) -> Self {
        self.list = list;
        self
    }

    pub fn matches_task(&self, task: &Task) -> bool {
        task.owner_id == self.owner_id
            && self.deleted.is_none_or(|deleted| task.deleted == deleted)
            && self.list.contains(task.list_id)
    }

    pub fn matches_note(&self, note: &Note) -> bool {
        note.owner_id == self.owner_id && self.deleted.is_none_or(|deleted| note.deleted == deleted)
    }
}

/// CRUD over task and note records. Queries return tasks by ascending
/// `order`, then creation time; notes by creation time.
pub trait RecordStore: Send + Sync {
    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>>;

    fn query_tasks(&self, query: &RecordQuery) -> anyhow::Result<Vec<Task>>;

    fn count_tasks(&self, query: &RecordQuery) -> anyhow::Result<usize> {
        Ok(self.query_tasks(query)?.len())
    }

    fn create_task(&self, task: Task) -> anyhow::Result<Task>;

    fn update_task(&self, id: Uuid, changes: &TaskChanges) -> anyhow::Result<Task>;

    fn delete_task(&self, id: Uuid) -> anyhow::Result<()>;

    fn get_note(&self, id: Uuid) -> anyhow::Result<Option<Note>>;

    fn query_notes(&self, query: &RecordQuery) -> anyhow::Result<Vec<Note>>;

    fn create_note(&self, note: Note) -> anyhow::Result<Note>;

    fn update_note(&self, id: Uuid, changes: &NoteChanges) -> anyhow::Result<Note>;

    fn delete_note(&self, id: Uuid) -> anyhow::Result<()>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        (**self).get_task(id)
    }

    fn query_tasks(&self, query: &RecordQuery) -> anyhow::Result<Vec<Task>> {
        (**self).query_tasks(query)
    }

    fn count_tasks(&self, query: &RecordQuery) -> anyhow::Result<usize> {
        (**self).count_tasks(query)
    }

    fn create_task(&self, task: Task) -> anyhow::Result<Task> {
        (**self).create_task(task)
    }

    fn update_task(&self, id: Uuid, changes: &TaskChanges) -> anyhow::Result<Task> {
        (**self).update_task(id, changes)
    }

    fn delete_task(&self, id: Uuid) -> anyhow::Result<()> {
        (**self).delete_task(id)
    }

    fn get_note(&self, id: Uuid) -> anyhow::Result<Option<Note>> {
        (**self).get_note(id)
    }

    fn query_notes(&self, query: &RecordQuery) -> anyhow::Result<Vec<Note>> {
        (**self).query_notes(query)
    }

    fn create_note(&self, note: Note) -> anyhow::Result<Note> {
        (**self).create_note(note)
    }

    fn update_note(&self, id: Uuid, changes: &NoteChanges) -> anyhow::Result<Note> {
        (**self).update_note(id, changes)
    }

    fn delete_note(&self, id: Uuid) -> anyhow::Result<()> {
        (**self).delete_note(id)
    }
}

pub(crate) fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
}

pub(crate) fn sort_notes(notes: &mut [Note]) {
    notes.sort_by_key(|note| note.created_at);
}

/// Record store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<BTreeMap<Uuid, Task>>,
    notes: Mutex<BTreeMap<Uuid, Note>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_len(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl RecordStore for MemoryStore {
    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.tasks.lock().get(&id).cloned())
    }

    fn query_tasks(&self, query: &RecordQuery) -> anyhow::Result<Vec<Task>> {
        let mut out: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|task| query.matches_task(task))
            .cloned()
            .collect();
        sort_tasks(&mut out);
        trace!(count = out.len(), "memory task query");
        Ok(out)
    }

    fn count_tasks(&self, query: &RecordQuery) -> anyhow::Result<usize> {
        Ok(self.tasks.lock().values().filter(|task| query.matches_task(task)).count())
    }

    fn create_task(&self, task: Task) -> anyhow::Result<Task> {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&task.id) {
            return Err(anyhow!("task already exists: {}", task.id));
        }
        debug!(task_id = %task.id, "memory store created task");
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn update_task(&self, id: Uuid, changes: &TaskChanges) -> anyhow::Result<Task> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        changes.apply(task);
        Ok(task.clone())
    }

    fn delete_task(&self, id: Uuid) -> anyhow::Result<()> {
        self.tasks
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("task not found: {id}"))
    }

    fn get_note(&self, id: Uuid) -> anyhow::Result<Option<Note>> {
        Ok(self.notes.lock().get(&id).cloned())
    }

    fn query_notes(&self, query: &RecordQuery) -> anyhow::Result<Vec<Note>> {
        let mut out: Vec<Note> = self
            .notes
            .lock()
            .values()
            .filter(|note| query.matches_note(note))
            .cloned()
            .collect();
        sort_notes(&mut out);
        Ok(out)
    }

    fn create_note(&self, note: Note) -> anyhow::Result<Note> {
        let mut notes = self.notes.lock();
        if notes.contains_key(&note.id) {
            return Err(anyhow!("note already exists: {}", note.id));
        }
        notes.insert(note.id, note.clone());
        Ok(note)
    }

    fn update_note(&self, id: Uuid, changes: &NoteChanges) -> anyhow::Result<Note> {
        let mut notes = self.notes.lock();
        let note = notes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("note not found: {id}"))?;
        changes.apply(note);
        Ok(note.clone())
    }

    fn delete_note(&self, id: Uuid) -> anyhow::Result<()> {
        self.notes
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("note not found: {id}"))
    }
}
