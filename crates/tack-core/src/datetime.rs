use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str =
  "UTC";

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(error) => {
      tracing::warn!(
        source,
        timezone = trimmed,
        %error,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Calendar day of `dt` as seen from `tz`.
#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

/// Resolves a wall-clock time in `tz` to an instant. Ambiguous times
/// (DST fall-back) take the earliest instant; times inside a DST gap are
/// pushed forward by the gap.
pub fn from_local(
  local_naive: NaiveDateTime,
  tz: Tz
) -> Option<DateTime<Utc>> {
  match tz.from_local_datetime(
    &local_naive
  ) {
    | LocalResult::Single(local_dt) => {
      Some(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Some(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      tracing::debug!(
        local = %local_naive,
        timezone = %tz,
        "local time falls in a gap; shifting forward"
      );
      tz.from_local_datetime(
        &(local_naive
          + Duration::hours(1))
      )
      .earliest()
      .map(|dt| dt.with_timezone(&Utc))
    }
  }
}
