use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{Note, NoteChanges, Task, TaskChanges};
use crate::store::{RecordQuery, RecordStore, sort_notes, sort_tasks};

/// Record store backed by two JSON-lines files in one data directory.
/// Every write rewrites the whole file through a temp file and rename.
#[derive(Debug)]
pub struct JsonlStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub notes_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let notes_path = data_dir.join("notes.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !notes_path.exists() {
            fs::write(&notes_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            notes = %notes_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            notes_path,
            write_lock: Mutex::new(()),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_notes(&self) -> anyhow::Result<Vec<Note>> {
        load_jsonl(&self.notes_path).context("failed to load notes.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, notes))]
    fn save_notes(&self, notes: &[Note]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.notes_path, notes).context("failed to save notes.data")
    }
}

impl RecordStore for JsonlStore {
    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.load_tasks()?.into_iter().find(|task| task.id == id))
    }

    fn query_tasks(&self, query: &RecordQuery) -> anyhow::Result<Vec<Task>> {
        let mut out: Vec<Task> = self
            .load_tasks()?
            .into_iter()
            .filter(|task| query.matches_task(task))
            .collect();
        sort_tasks(&mut out);
        Ok(out)
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    fn create_task(&self, task: Task) -> anyhow::Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(anyhow!("task already exists: {}", task.id));
        }
        tasks.push(task.clone());
        self.save_tasks(&tasks)?;
        Ok(task)
    }

    #[tracing::instrument(skip(self, changes), fields(task_id = %id))]
    fn update_task(&self, id: Uuid, changes: &TaskChanges) -> anyhow::Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let updated = {
            let task = tasks
                .iter_mut()
                .find(|task| task.id == id)
                .ok_or_else(|| anyhow!("task not found: {id}"))?;
            changes.apply(task);
            task.clone()
        };
        self.save_tasks(&tasks)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    fn delete_task(&self, id: Uuid) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Err(anyhow!("task not found: {id}"));
        }
        self.save_tasks(&tasks)
    }

    fn get_note(&self, id: Uuid) -> anyhow::Result<Option<Note>> {
        Ok(self.load_notes()?.into_iter().find(|note| note.id == id))
    }

    fn query_notes(&self, query: &RecordQuery) -> anyhow::Result<Vec<Note>> {
        let mut out: Vec<Note> = self
            .load_notes()?
            .into_iter()
            .filter(|note| query.matches_note(note))
            .collect();
        sort_notes(&mut out);
        Ok(out)
    }

    #[tracing::instrument(skip(self, note), fields(note_id = %note.id))]
    fn create_note(&self, note: Note) -> anyhow::Result<Note> {
        let _guard = self.write_lock.lock();
        let mut notes = self.load_notes()?;
        if notes.iter().any(|n| n.id == note.id) {
            return Err(anyhow!("note already exists: {}", note.id));
        }
        notes.push(note.clone());
        self.save_notes(&notes)?;
        Ok(note)
    }

    #[tracing::instrument(skip(self, changes), fields(note_id = %id))]
    fn update_note(&self, id: Uuid, changes: &NoteChanges) -> anyhow::Result<Note> {
        let _guard = self.write_lock.lock();
        let mut notes = self.load_notes()?;
        let updated = {
            let note = notes
                .iter_mut()
                .find(|note| note.id == id)
                .ok_or_else(|| anyhow!("note not found: {id}"))?;
            changes.apply(note);
            note.clone()
        };
        self.save_notes(&notes)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(note_id = %id))]
    fn delete_note(&self, id: Uuid) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut notes = self.load_notes()?;
        let before = notes.len();
        notes.retain(|note| note.id != id);
        if notes.len() == before {
            return Err(anyhow!("note not found: {id}"));
        }
        self.save_notes(&notes)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
