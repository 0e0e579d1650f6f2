//! Validity windows and their intersection.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  date::{Boundary, day_boundary, parse_boundary, parse_optional_day},
  source::{DiplomaRecord, QualificationRecord},
  Result,
};

/// A closed interval of instants. A `None` bound is unknown and treated as
/// unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

impl Window {
  pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
    Self { start, end }
  }

  /// True when both bounds are known and the window ends before it starts.
  pub fn is_empty(&self) -> bool {
    matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
  }

  pub fn contains(&self, instant: DateTime<Utc>) -> bool {
    self.start.is_none_or(|s| s <= instant) && self.end.is_none_or(|e| instant <= e)
  }

  /// Intersection of an optional diploma window with an optional
  /// qualification window, bound by bound.
  pub fn intersect(diploma: Option<&Window>, qualification: Option<&Window>) -> Window {
    let starts = [diploma.and_then(|w| w.start), qualification.and_then(|w| w.start)];
    let ends = [diploma.and_then(|w| w.end), qualification.and_then(|w| w.end)];
    Window {
      start: starts.into_iter().flatten().max(),
      end:   ends.into_iter().flatten().min(),
    }
  }
}

/// Smallest step between two distinct instants of a window.
pub fn resolution() -> Duration { Duration::seconds(1) }

/// The diploma's own window: opening day through closing day.
pub fn diploma_window(diploma: &DiplomaRecord) -> Result<Window> {
  Ok(Window {
    start: parse_boundary(diploma.opened_on.as_deref(), Boundary::Start)?,
    end:   parse_boundary(diploma.closed_on.as_deref(), Boundary::End)?,
  })
}

/// The fiche's own window: first activation day through registration end.
///
/// An activation day equal to the registry's oldest snapshot only says the
/// fiche was already active when observation began, so it reads as unknown.
pub fn qualification_window(
  qualification: &QualificationRecord,
  oldest_snapshot: Option<NaiveDate>,
) -> Result<Window> {
  let activated = parse_optional_day(qualification.first_activated_on.as_deref())?
    .filter(|day| Some(*day) != oldest_snapshot);
  Ok(Window {
    start: activated.map(|day| day_boundary(day, Boundary::Start)),
    end:   parse_boundary(qualification.registration_ends_on.as_deref(), Boundary::End)?,
  })
}
