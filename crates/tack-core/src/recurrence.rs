//! Next-occurrence computation for recurring tasks.
//!
//! Occurrences are computed on demand when a task is completed; nothing here
//! runs on a timer. Day and month arithmetic happens on the wall clock of the
//! configured timezone, so a task due at 09:00 stays at 09:00 across DST
//! changes.

use std::collections::BTreeSet;

use chrono::{
  DateTime,
  Datelike,
  Days,
  Months,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::datetime::from_local;
use crate::error::{
  EngineError,
  Result
};
use crate::model::{
  DayOfWeek,
  RecurrenceConfig,
  RecurrencePattern
};

/// Unvalidated recurrence input as it arrives from a create or edit form.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct RecurrenceDraft {
  pub pattern:  RecurrencePattern,
  #[serde(default = "default_interval")]
  pub interval: i64,
  #[serde(default)]
  pub days:     Option<Vec<String>>,
  #[serde(default)]
  pub end_date: Option<DateTime<Utc>>
}

/// Largest accepted interval, in units of the pattern.
pub const MAX_INTERVAL: u32 = 1000;

fn default_interval() -> i64 {
  1
}

impl RecurrenceDraft {
  pub fn new(
    pattern: RecurrencePattern
  ) -> Self {
    Self {
      pattern,
      interval: 1,
      days: None,
      end_date: None
    }
  }

  #[must_use]
  pub fn every(
    mut self,
    interval: i64
  ) -> Self {
    self.interval = interval;
    self
  }

  #[must_use]
  pub fn on_days<I, S>(
    mut self,
    days: I
  ) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>
  {
    self.days = Some(
      days
        .into_iter()
        .map(Into::into)
        .collect()
    );
    self
  }

  #[must_use]
  pub fn until(
    mut self,
    end_date: DateTime<Utc>
  ) -> Self {
    self.end_date = Some(end_date);
    self
  }

  /// Checks the draft and turns it into a stored configuration. Day tokens
  /// only survive on weekly patterns.
  pub fn validate(
    self
  ) -> Result<RecurrenceConfig> {
    if self.interval <= 0 {
      return Err(
        EngineError::invalid_recurrence(
          format!(
            "interval must be at least \
             1, got {}",
            self.interval
          )
        )
      );
    }
    let interval =
      u32::try_from(self.interval)
        .ok()
        .filter(|interval| {
          *interval <= MAX_INTERVAL
        })
        .ok_or_else(|| {
          EngineError::invalid_recurrence(
            format!(
              "interval must be at most \
               {MAX_INTERVAL}, got {}",
              self.interval
            )
          )
        })?;

    let days = match (
      self.pattern,
      self.days
    ) {
      | (
        RecurrencePattern::Weekly,
        Some(tokens)
      ) => Some(parse_day_tokens(
        &tokens
      )?),
      | _ => None
    };

    Ok(RecurrenceConfig {
      pattern: self.pattern,
      interval,
      days,
      end_date: self.end_date
    })
  }
}

fn parse_day_tokens(
  tokens: &[String]
) -> Result<BTreeSet<DayOfWeek>> {
  if tokens.is_empty() {
    return Err(
      EngineError::invalid_recurrence(
        "weekly recurrence needs at \
         least one day"
      )
    );
  }

  tokens
    .iter()
    .map(|token| {
      DayOfWeek::from_token(token)
        .ok_or_else(|| {
          EngineError::invalid_recurrence(
            format!(
              "unknown weekday token: \
               {token}"
            )
          )
        })
    })
    .collect()
}

/// Computes the occurrence following `anchor`, or `None` once the series has
/// ended. A candidate that lands on or after `end_date` is suppressed rather
/// than clamped to the boundary.
pub fn next_occurrence(
  anchor: DateTime<Utc>,
  config: &RecurrenceConfig,
  tz: Tz
) -> Option<DateTime<Utc>> {
  if let Some(end) = config.end_date
    && anchor >= end
  {
    trace!(%anchor, %end, "series already ended");
    return None;
  }

  let interval = config.interval.max(1);
  let local = anchor.with_timezone(&tz);
  let naive = local.naive_local();

  let shifted = match config.pattern {
    | RecurrencePattern::Daily
    | RecurrencePattern::Custom => {
      naive.checked_add_days(Days::new(
        u64::from(interval)
      ))
    }
    | RecurrencePattern::Monthly => {
      naive.checked_add_months(
        Months::new(interval)
      )
    }
    | RecurrencePattern::Yearly => {
      naive.checked_add_months(
        Months::new(
          interval.checked_mul(12)?
        )
      )
    }
    | RecurrencePattern::Weekly => {
      let offset = match config
        .days
        .as_ref()
        .filter(|days| !days.is_empty())
      {
        | Some(days) => {
          let current =
            DayOfWeek::from(
              local.weekday()
            )
            .index();
          weekly_offset(
            current, days, interval
          )?
        }
        | None => {
          u64::from(interval) * 7
        }
      };
      naive.checked_add_days(Days::new(
        offset
      ))
    }
  }?;

  let candidate =
    from_local(shifted, tz)?;

  if let Some(end) = config.end_date
    && candidate >= end
  {
    trace!(%candidate, %end, "candidate past end date; series ends");
    return None;
  }

  trace!(%anchor, %candidate, pattern = ?config.pattern, interval, "computed next occurrence");
  Some(candidate)
}

/// Days from the anchor's weekday (`current`, Sunday=0) to the next
/// configured day. A later day in the same week wins; otherwise jump to the
/// first configured day `interval` weeks ahead. The anchor's own day never
/// counts as next.
fn weekly_offset(
  current: u32,
  days: &BTreeSet<DayOfWeek>,
  interval: u32
) -> Option<u64> {
  if let Some(target) = days
    .iter()
    .map(|day| day.index())
    .find(|day| *day > current)
  {
    return Some(u64::from(
      target - current
    ));
  }

  let first = days.iter().next()?.index();
  Some(
    u64::from(7 - current)
      + u64::from(first)
      + 7 * u64::from(interval - 1)
  )
}
