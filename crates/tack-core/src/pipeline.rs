//! Filter/sort pipeline deriving the displayed task list.
//!
//! Stages run in a fixed order (search, priority, status, date range, tags,
//! lists) and combine with AND; a stage whose value is unset does nothing.
//! A stable sort runs last. The whole pipeline is a pure function of the
//! items, the [`FilterSet`] and the reference instant.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{
  DateTime,
  Days,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  instrument,
  trace
};
use uuid::Uuid;

use crate::datetime::local_date;
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{
  Priority,
  Status,
  Task
};
use crate::store::{
  RecordQuery,
  RecordStore
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
  #[default]
  All,
  /// Todo or in progress.
  Open,
  Todo,
  InProgress,
  Completed
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(
  tag = "bucket",
  rename_all = "lowercase"
)]
pub enum DateRange {
  Today,
  /// Today through seven days out, inclusive.
  Week,
  Overdue,
  Custom {
    from: NaiveDate,
    to:   NaiveDate
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
  #[default]
  Newest,
  Oldest,
  DueDate,
  Priority,
  /// Drag-drop position.
  Manual
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default)]
pub struct FilterSet {
  pub search:     Option<String>,
  pub priority:   Option<Priority>,
  pub status:     StatusFilter,
  pub date_range: Option<DateRange>,
  pub tags:       BTreeSet<String>,
  pub lists:      BTreeSet<Uuid>,
  pub sort:       SortKey
}

impl FilterSet {
  /// Runs the pipeline over `items`. Trashed tasks never show.
  pub fn apply(
    &self,
    items: &[Task],
    now: DateTime<Utc>,
    tz: Tz
  ) -> Vec<Task> {
    let today = local_date(now, tz);
    let needle = self
      .search
      .as_deref()
      .map(str::trim)
      .filter(|text| !text.is_empty())
      .map(str::to_lowercase);

    let mut out: Vec<Task> = items
      .iter()
      .filter(|task| !task.deleted)
      .filter(|task| {
        needle.as_deref().is_none_or(
          |needle| {
            matches_search(task, needle)
          }
        )
      })
      .filter(|task| {
        self.priority.is_none_or(
          |priority| {
            task.priority == priority
          }
        )
      })
      .filter(|task| {
        matches_status(self.status, task)
      })
      .filter(|task| {
        self.date_range.is_none_or(
          |range| {
            matches_date_range(
              range, task, today, tz
            )
          }
        )
      })
      .filter(|task| {
        self.tags.is_empty()
          || task
            .tags
            .iter()
            .any(|tag| {
              self.tags.contains(tag)
            })
      })
      .filter(|task| {
        self.lists.is_empty()
          || task.list_id.is_some_and(
            |list| {
              self.lists.contains(&list)
            }
          )
      })
      .cloned()
      .collect();

    out.sort_by(|a, b| {
      compare(self.sort, a, b)
    });

    trace!(
      input = items.len(),
      output = out.len(),
      sort = ?self.sort,
      "filter pipeline applied"
    );
    out
  }
}

fn matches_search(
  task: &Task,
  needle: &str
) -> bool {
  task
    .title
    .to_lowercase()
    .contains(needle)
    || task
      .description
      .as_deref()
      .is_some_and(|text| {
        text
          .to_lowercase()
          .contains(needle)
      })
    || task.tags.iter().any(|tag| {
      tag.to_lowercase().contains(needle)
    })
}

fn matches_status(
  filter: StatusFilter,
  task: &Task
) -> bool {
  match filter {
    | StatusFilter::All => true,
    | StatusFilter::Open => {
      !task.is_completed()
    }
    | StatusFilter::Todo => {
      task.status == Status::Todo
    }
    | StatusFilter::InProgress => {
      task.status == Status::InProgress
    }
    | StatusFilter::Completed => {
      task.is_completed()
    }
  }
}

fn matches_date_range(
  range: DateRange,
  task: &Task,
  today: NaiveDate,
  tz: Tz
) -> bool {
  let Some(due) = task.due_date else {
    return false;
  };
  let due = local_date(due, tz);

  match range {
    | DateRange::Today => due == today,
    | DateRange::Week => {
      let end = today
        .checked_add_days(Days::new(7))
        .unwrap_or(today);
      today <= due && due <= end
    }
    | DateRange::Overdue => {
      due < today && !task.is_completed()
    }
    | DateRange::Custom {
      from,
      to
    } => from <= due && due <= to
  }
}

fn compare(
  key: SortKey,
  a: &Task,
  b: &Task
) -> Ordering {
  match key {
    | SortKey::Newest => {
      b.created_at.cmp(&a.created_at)
    }
    | SortKey::Oldest => {
      a.created_at.cmp(&b.created_at)
    }
    | SortKey::DueDate => {
      match (a.due_date, b.due_date) {
        | (Some(a), Some(b)) => a.cmp(&b),
        | (Some(_), None) => Ordering::Less,
        | (None, Some(_)) => {
          Ordering::Greater
        }
        | (None, None) => Ordering::Equal
      }
    }
    | SortKey::Priority => {
      a.priority
        .rank()
        .cmp(&b.priority.rank())
    }
    | SortKey::Manual => {
      a.order.cmp(&b.order)
    }
  }
}

impl<S: RecordStore> Engine<S> {
  /// The owner's live tasks run through `filters` at the current instant.
  #[instrument(skip(self, filters))]
  pub fn visible_tasks(
    &self,
    filters: &FilterSet
  ) -> Result<Vec<Task>> {
    let owner = self.owner()?;
    let tasks = self.store().query_tasks(
      &RecordQuery::owned_by(owner).live()
    )?;
    Ok(filters.apply(
      &tasks,
      self.now(),
      self.config().timezone
    ))
  }
}
