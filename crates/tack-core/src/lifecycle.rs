//! Task state machine: active, completed, trashed and purged.
//!
//! Completing a recurring task never advances the record in place; it marks
//! the record completed and inserts a fresh task for the next occurrence.

use std::collections::BTreeSet;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::model::{ItemKind, Priority, Status, Task, TaskChanges};
use crate::recurrence::{RecurrenceDraft, next_occurrence};
use crate::store::{ListScope, RecordQuery, RecordStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub list_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceDraft>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Edit form patch. Outer `None` keeps a field; `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub list_id: Option<Option<Uuid>>,
    pub tags: Option<Vec<String>>,
    pub recurrence: Option<Option<RecurrenceDraft>>,
}

/// Result of a completion: the completed task and, for a recurring task whose
/// series continues, the newly created next occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub task: Task,
    pub successor: Option<Task>,
}

fn normalize_tags(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn ensure_not_trashed(task: &Task) -> Result<()> {
    if task.deleted {
        return Err(EngineError::InTrash {
            kind: ItemKind::Task,
            id: task.id,
        });
    }
    Ok(())
}

impl<S: RecordStore> Engine<S> {
    /// Validates and stores a new task at the end of its list.
    #[instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    pub fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        let owner = self.owner()?;
        let recurrence = draft.recurrence.map(RecurrenceDraft::validate).transpose()?;
        let now = self.now();

        let mut task = Task::new(owner.clone(), draft.title.trim(), now);
        task.description = draft.description;
        task.priority = draft.priority.unwrap_or_default();
        task.due_date = draft.due_date;
        task.list_id = draft.list_id;
        task.tags = normalize_tags(draft.tags);
        task.set_recurrence(recurrence);
        if let Some(status) = draft.status {
            task.status = status;
            task.completed = status == Status::Completed;
            task.completed_at = task.completed.then_some(now);
        }
        task.order = self.next_order(&owner, task.list_id)?;

        let task = self.store().create_task(task)?;
        info!(task_id = %task.id, recurring = task.is_recurring, order = task.order, "task created");
        Ok(task)
    }

    #[instrument(skip(self, edit), fields(task_id = %id))]
    pub fn edit_task(&self, id: Uuid, edit: TaskEdit) -> Result<Task> {
        let recurrence = edit
            .recurrence
            .map(|draft| draft.map(RecurrenceDraft::validate).transpose())
            .transpose()?;
        let (owner, task) = self.authorize_task(id)?;
        ensure_not_trashed(&task)?;

        let mut changes = TaskChanges {
            title: edit.title.map(|title| title.trim().to_string()),
            description: edit.description,
            priority: edit.priority,
            due_date: edit.due_date,
            list_id: edit.list_id,
            tags: edit.tags.map(normalize_tags),
            recurrence,
            ..TaskChanges::default()
        };
        if let Some(list_id) = changes.list_id
            && list_id != task.list_id
        {
            changes.order = Some(self.next_order(&owner, list_id)?);
        }
        if changes.is_empty() {
            debug!("edit carries no changes");
            return Ok(task);
        }
        changes.updated_at = Some(self.now());

        let task = self.store().update_task(id, &changes)?;
        info!(task_id = %id, "task edited");
        Ok(task)
    }

    /// Flips a task between completed and its reopen status.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn toggle_complete(&self, id: Uuid) -> Result<Completion> {
        let (_, task) = self.authorize_task(id)?;
        ensure_not_trashed(&task)?;
        if task.is_completed() {
            let task = self.reopen_authorized(task, None)?;
            Ok(Completion {
                task,
                successor: None,
            })
        } else {
            self.complete_authorized(task)
        }
    }

    /// Marks a task completed; completing an already completed task is a
    /// no-op.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn complete_task(&self, id: Uuid) -> Result<Completion> {
        let (_, task) = self.authorize_task(id)?;
        ensure_not_trashed(&task)?;
        if task.is_completed() {
            debug!("task already completed");
            return Ok(Completion {
                task,
                successor: None,
            });
        }
        self.complete_authorized(task)
    }

    /// Returns a completed task to `status`, or to the configured reopen
    /// status. Any successor already generated stays.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn reopen_task(&self, id: Uuid, status: Option<Status>) -> Result<Task> {
        let (_, task) = self.authorize_task(id)?;
        ensure_not_trashed(&task)?;
        if !task.is_completed() {
            debug!("task is not completed; nothing to reopen");
            return Ok(task);
        }
        self.reopen_authorized(task, status)
    }

    /// Kanban move. Entering `completed` runs the completion transition and
    /// leaving it runs the reopen transition.
    #[instrument(skip(self), fields(task_id = %id, status = %status))]
    pub fn set_status(&self, id: Uuid, status: Status) -> Result<Completion> {
        let (_, task) = self.authorize_task(id)?;
        ensure_not_trashed(&task)?;

        match (task.is_completed(), status) {
            (false, Status::Completed) => self.complete_authorized(task),
            (true, Status::Completed) => Ok(Completion {
                task,
                successor: None,
            }),
            (true, open) => {
                let task = self.reopen_authorized(task, Some(open))?;
                Ok(Completion {
                    task,
                    successor: None,
                })
            }
            (false, open) if open == task.status => Ok(Completion {
                task,
                successor: None,
            }),
            (false, open) => {
                let changes = TaskChanges {
                    status: Some(open),
                    updated_at: Some(self.now()),
                    ..TaskChanges::default()
                };
                let task = self.store().update_task(id, &changes)?;
                Ok(Completion {
                    task,
                    successor: None,
                })
            }
        }
    }

    /// Soft delete. Status and completion fields are kept so a restore
    /// returns the task to the state it had.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn trash_task(&self, id: Uuid) -> Result<Task> {
        let (_, task) = self.authorize_task(id)?;
        if task.deleted {
            debug!("task already trashed");
            return Ok(task);
        }
        let now = self.now();
        let changes = TaskChanges {
            deleted: Some(true),
            deleted_at: Some(Some(now)),
            updated_at: Some(now),
            ..TaskChanges::default()
        };
        let task = self.store().update_task(id, &changes)?;
        info!(task_id = %id, completed = task.completed, "task moved to trash");
        Ok(task)
    }

    /// Restoring a task that is not trashed is a no-op. A restored task
    /// rejoins its list at the end.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn restore_task(&self, id: Uuid) -> Result<Task> {
        let (owner, task) = self.authorize_task(id)?;
        if !task.deleted {
            debug!("task not trashed; nothing to restore");
            return Ok(task);
        }
        let changes = TaskChanges {
            deleted: Some(false),
            deleted_at: Some(None),
            order: Some(self.next_order(&owner, task.list_id)?),
            updated_at: Some(self.now()),
            ..TaskChanges::default()
        };
        let task = self.store().update_task(id, &changes)?;
        info!(task_id = %id, status = %task.status, order = task.order, "task restored");
        Ok(task)
    }

    /// Permanent delete of a trashed task. The id stops resolving afterwards.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn purge_task(&self, id: Uuid) -> Result<()> {
        let (_, task) = self.authorize_task(id)?;
        if !task.deleted {
            warn!(task_id = %id, "refusing to purge a task outside the trash");
            return Err(EngineError::NotInTrash {
                kind: ItemKind::Task,
                id,
            });
        }
        self.store().delete_task(id)?;
        info!(task_id = %id, "task purged");
        Ok(())
    }

    fn complete_authorized(&self, task: Task) -> Result<Completion> {
        let now = self.now();
        let changes = TaskChanges {
            status: Some(Status::Completed),
            completed: Some(true),
            completed_at: Some(Some(now)),
            updated_at: Some(now),
            ..TaskChanges::default()
        };
        let completed = self.store().update_task(task.id, &changes)?;

        let successor = match self.spawn_successor(&completed, now) {
            Ok(successor) => successor,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "successor write failed; reverting completion");
                let revert = TaskChanges {
                    status: Some(task.status),
                    completed: Some(task.completed),
                    completed_at: Some(task.completed_at),
                    updated_at: Some(task.updated_at),
                    ..TaskChanges::default()
                };
                self.store()
                    .update_task(task.id, &revert)
                    .with_context(|| {
                        format!("failed to revert completion of {} after: {err}", task.id)
                    })?;
                return Err(err);
            }
        };

        info!(
            task_id = %completed.id,
            successor = ?successor.as_ref().map(|next| next.id),
            "task completed"
        );
        Ok(Completion {
            task: completed,
            successor,
        })
    }

    fn spawn_successor(&self, task: &Task, now: DateTime<Utc>) -> Result<Option<Task>> {
        let Some(config) = task.recurrence() else {
            return Ok(None);
        };

        let anchor = task.due_date.unwrap_or(now);
        let Some(next_due) = next_occurrence(anchor, config, self.config().timezone) else {
            info!(task_id = %task.id, root = %task.series_root(), "recurring series ended");
            return Ok(None);
        };

        let mut next = Task::new(task.owner_id.clone(), task.title.clone(), now);
        next.description = task.description.clone();
        next.priority = task.priority;
        next.list_id = task.list_id;
        next.tags = task.tags.clone();
        next.due_date = Some(next_due);
        next.set_recurrence(Some(config.clone()));
        next.parent_recurring_task_id = Some(task.series_root());
        next.order = self.next_order(&task.owner_id, task.list_id)?;

        let next = self.store().create_task(next)?;
        debug!(successor = %next.id, due = %next_due, "created next occurrence");
        Ok(Some(next))
    }

    fn reopen_authorized(&self, task: Task, status: Option<Status>) -> Result<Task> {
        let status = status
            .filter(|status| *status != Status::Completed)
            .unwrap_or(self.config().reopen_status);
        let changes = TaskChanges {
            status: Some(status),
            completed: Some(false),
            completed_at: Some(None),
            updated_at: Some(self.now()),
            ..TaskChanges::default()
        };
        let task = self.store().update_task(task.id, &changes)?;
        info!(task_id = %task.id, status = %status, "task reopened");
        Ok(task)
    }

    /// One past the highest position among the owner's live tasks in a list.
    pub(crate) fn next_order(&self, owner: &str, list_id: Option<Uuid>) -> Result<i64> {
        let query = RecordQuery::owned_by(owner)
            .live()
            .in_list(ListScope::of(list_id));
        let max = self
            .store()
            .query_tasks(&query)?
            .iter()
            .map(|task| task.order)
            .max();
        Ok(max.map_or(0, |max| max + 1))
    }
}
