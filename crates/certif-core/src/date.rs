//! Day-only registry dates resolved to instants in the registries' civil
//! timezone.
//!
//! A date that opens a validity window resolves to 00:00:00 local time; a date
//! that closes one resolves to 23:59:59 local time. Local times that a
//! daylight-saving transition makes ambiguous or skips resolve toward the
//! inside of the day, so the result is always deterministic.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

/// Civil timezone every registry date is expressed in.
pub const CIVIL_TZ: Tz = chrono_tz::Europe::Paris;

/// Which end of the day a date stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
  /// 00:00:00, used for opening/activation dates.
  Start,
  /// 23:59:59, used for closing/end dates.
  End,
}

/// Parse a registry date: `dd/mm/yyyy` as published, or ISO `yyyy-mm-dd`.
pub fn parse_day(raw: &str) -> Result<NaiveDate> {
  let raw = raw.trim();
  NaiveDate::parse_from_str(raw, "%d/%m/%Y")
    .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
    .map_err(|_| Error::InvalidDate(raw.to_owned()))
}

/// Parse an optional registry date; blank cells read as `None`.
pub fn parse_optional_day(raw: Option<&str>) -> Result<Option<NaiveDate>> {
  match raw.map(str::trim) {
    None | Some("") => Ok(None),
    Some(s) => parse_day(s).map(Some),
  }
}

/// Resolve a calendar day to the instant at the requested boundary.
pub fn day_boundary(day: NaiveDate, boundary: Boundary) -> DateTime<Utc> {
  let midnight = day.and_time(NaiveTime::MIN);
  match boundary {
    Boundary::Start => resolve_local(midnight, boundary),
    Boundary::End => {
      resolve_local(midnight + Duration::seconds(86_399), boundary)
    }
  }
}

/// Parse an optional registry date straight to its boundary instant.
pub fn parse_boundary(
  raw: Option<&str>,
  boundary: Boundary,
) -> Result<Option<DateTime<Utc>>> {
  Ok(parse_optional_day(raw)?.map(|day| day_boundary(day, boundary)))
}

fn resolve_local(local: NaiveDateTime, boundary: Boundary) -> DateTime<Utc> {
  let mut probe = local;
  // Transitions shift the clock by one hour, so two steps always land on a
  // valid local time.
  for _ in 0..3 {
    match CIVIL_TZ.from_local_datetime(&probe) {
      LocalResult::Single(dt) => return dt.with_timezone(&Utc),
      LocalResult::Ambiguous(earliest, latest) => {
        let chosen = match boundary {
          Boundary::Start => earliest,
          Boundary::End => latest,
        };
        return chosen.with_timezone(&Utc);
      }
      LocalResult::None => {
        probe = match boundary {
          Boundary::Start => probe + Duration::hours(1),
          Boundary::End => probe - Duration::hours(1),
        };
      }
    }
  }
  Utc.from_utc_datetime(&local)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(raw: &str, boundary: Boundary) -> String {
    parse_boundary(Some(raw), boundary)
      .unwrap()
      .unwrap()
      .to_rfc3339()
  }

  #[test]
  fn start_of_day_before_spring_transition() {
    assert_eq!(at("31/03/2024", Boundary::Start), "2024-03-30T23:00:00+00:00");
  }

  #[test]
  fn end_of_day_after_autumn_transition() {
    assert_eq!(at("27/10/2024", Boundary::End), "2024-10-27T22:59:59+00:00");
  }

  #[test]
  fn summer_dates_use_summer_offset() {
    assert_eq!(at("01/07/2023", Boundary::Start), "2023-06-30T22:00:00+00:00");
    assert_eq!(at("2023-07-01", Boundary::End), "2023-07-01T21:59:59+00:00");
  }

  #[test]
  fn blank_is_none_and_garbage_fails() {
    assert_eq!(parse_boundary(Some("  "), Boundary::Start).unwrap(), None);
    assert_eq!(parse_boundary(None, Boundary::End).unwrap(), None);
    assert!(matches!(
      parse_boundary(Some("31/02/2024"), Boundary::Start),
      Err(Error::InvalidDate(_))
    ));
  }

  #[test]
  fn skipped_local_time_moves_inside_the_day() {
    // 02:30 does not exist in Paris on 2024-03-31.
    let skipped = NaiveDate::from_ymd_opt(2024, 3, 31)
      .unwrap()
      .and_hms_opt(2, 30, 0)
      .unwrap();
    assert_eq!(
      resolve_local(skipped, Boundary::Start).to_rfc3339(),
      "2024-03-31T01:30:00+00:00"
    );
    assert_eq!(
      resolve_local(skipped, Boundary::End).to_rfc3339(),
      "2024-03-31T00:30:00+00:00"
    );
  }

  #[test]
  fn ambiguous_local_time_picks_by_boundary() {
    // 02:30 happens twice in Paris on 2024-10-27.
    let repeated = NaiveDate::from_ymd_opt(2024, 10, 27)
      .unwrap()
      .and_hms_opt(2, 30, 0)
      .unwrap();
    assert_eq!(
      resolve_local(repeated, Boundary::Start).to_rfc3339(),
      "2024-10-27T00:30:00+00:00"
    );
    assert_eq!(
      resolve_local(repeated, Boundary::End).to_rfc3339(),
      "2024-10-27T01:30:00+00:00"
    );
  }
}
