use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OwnerId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Rank used by the priority sort: lower sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Completed => "completed",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Status::Todo),
            "in-progress" | "in_progress" | "inprogress" => Some(Status::InProgress),
            "completed" | "done" => Some(Status::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weekday token of a weekly recurrence. Compared through a fixed
/// Sunday=0..Saturday=6 index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    pub fn index(self) -> u32 {
        match self {
            DayOfWeek::Sunday => 0,
            DayOfWeek::Monday => 1,
            DayOfWeek::Tuesday => 2,
            DayOfWeek::Wednesday => 3,
            DayOfWeek::Thursday => 4,
            DayOfWeek::Friday => 5,
            DayOfWeek::Saturday => 6,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "sunday" | "sun" => Some(DayOfWeek::Sunday),
            "monday" | "mon" => Some(DayOfWeek::Monday),
            "tuesday" | "tue" | "tues" => Some(DayOfWeek::Tuesday),
            "wednesday" | "wed" => Some(DayOfWeek::Wednesday),
            "thursday" | "thu" | "thur" | "thurs" => Some(DayOfWeek::Thursday),
            "friday" | "fri" => Some(DayOfWeek::Friday),
            "saturday" | "sat" => Some(DayOfWeek::Saturday),
            _ => None,
        }
    }
}

impl From<chrono::Weekday> for DayOfWeek {
    fn from(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Sun => DayOfWeek::Sunday,
            chrono::Weekday::Mon => DayOfWeek::Monday,
            chrono::Weekday::Tue => DayOfWeek::Tuesday,
            chrono::Weekday::Wed => DayOfWeek::Wednesday,
            chrono::Weekday::Thu => DayOfWeek::Thursday,
            chrono::Weekday::Fri => DayOfWeek::Friday,
            chrono::Weekday::Sat => DayOfWeek::Saturday,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

/// Validated recurrence settings. Built through
/// [`crate::recurrence::RecurrenceDraft::validate`], so `interval >= 1` and
/// `days` is either absent or a non-empty set that only appears on weekly
/// patterns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceConfig {
    pub pattern: RecurrencePattern,
    pub interval: u32,
    #[serde(default)]
    pub days: Option<BTreeSet<DayOfWeek>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,

    pub owner_id: OwnerId,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub list_id: Option<Uuid>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_recurring: bool,

    #[serde(default)]
    pub recurrence: Option<RecurrenceConfig>,

    #[serde(default)]
    pub parent_recurring_task_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(owner_id: impl Into<OwnerId>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            title: title.into(),
            description: None,
            priority: Priority::default(),
            status: Status::Todo,
            completed: false,
            completed_at: None,
            due_date: None,
            list_id: None,
            tags: BTreeSet::new(),
            order: 0,
            deleted: false,
            deleted_at: None,
            is_recurring: false,
            recurrence: None,
            parent_recurring_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    /// Recurrence settings, only when the task is flagged recurring.
    pub fn recurrence(&self) -> Option<&RecurrenceConfig> {
        if self.is_recurring {
            self.recurrence.as_ref()
        } else {
            None
        }
    }

    /// Id every instance of this task's series points at.
    pub fn series_root(&self) -> Uuid {
        self.parent_recurring_task_id.unwrap_or(self.id)
    }

    pub fn set_recurrence(&mut self, recurrence: Option<RecurrenceConfig>) {
        self.is_recurring = recurrence.is_some();
        self.recurrence = recurrence;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: Uuid,

    pub owner_id: OwnerId,

    pub title: String,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(owner_id: impl Into<OwnerId>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            title: title.into(),
            content: None,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Task,
    Note,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Task => f.write_str("task"),
            ItemKind::Note => f.write_str("note"),
        }
    }
}

/// Partial write against a stored task. `None` leaves a field untouched;
/// `Some(None)` clears a clearable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub completed: Option<bool>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub list_id: Option<Option<Uuid>>,
    pub tags: Option<BTreeSet<String>>,
    pub order: Option<i64>,
    pub deleted: Option<bool>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
    pub recurrence: Option<Option<RecurrenceConfig>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        *self == TaskChanges::default()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(list_id) = self.list_id {
            task.list_id = list_id;
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(order) = self.order {
            task.order = order;
        }
        if let Some(deleted) = self.deleted {
            task.deleted = deleted;
        }
        if let Some(deleted_at) = self.deleted_at {
            task.deleted_at = deleted_at;
        }
        if let Some(recurrence) = &self.recurrence {
            task.set_recurrence(recurrence.clone());
        }
        if let Some(updated_at) = self.updated_at {
            task.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<Option<String>>,
    pub deleted: Option<bool>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NoteChanges {
    pub fn apply(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(deleted) = self.deleted {
            note.deleted = deleted;
        }
        if let Some(deleted_at) = self.deleted_at {
            note.deleted_at = deleted_at;
        }
        if let Some(updated_at) = self.updated_at {
            note.updated_at = updated_at;
        }
    }
}
