//! Coverage gap filling.
//!
//! For a code paired at least once, the certifications sharing the code must
//! tile the code's own window. Whatever part of the window no certification
//! covers becomes a filler certification for the code alone.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::{
  aggregate::AggregatePair,
  builder::{BuildContext, assemble},
  certification::{Certification, Side},
  period::{Window, diploma_window, qualification_window, resolution},
  source::{DiplomaRecord, QualificationRecord},
  Result,
};

/// The source record a coverage computation is anchored on.
#[derive(Debug, Clone, Copy)]
pub enum Anchor<'a> {
  Diploma(&'a DiplomaRecord),
  Qualification(&'a QualificationRecord),
}

impl Anchor<'_> {
  pub fn side(&self) -> Side {
    match self {
      Self::Diploma(_) => Side::Diploma,
      Self::Qualification(_) => Side::Qualification,
    }
  }

  pub fn code(&self) -> &str {
    match self {
      Self::Diploma(d) => &d.code,
      Self::Qualification(q) => &q.code,
    }
  }

  fn window(&self, ctx: &BuildContext) -> Result<Window> {
    match self {
      Self::Diploma(d) => diploma_window(d),
      Self::Qualification(q) => qualification_window(q, ctx.oldest_qualification_snapshot),
    }
  }

  fn alone(&self) -> AggregatePair {
    match self {
      Self::Diploma(d) => AggregatePair::diploma_only((*d).clone()),
      Self::Qualification(q) => AggregatePair::qualification_only((*q).clone()),
    }
  }
}

/// Compare two window starts, an unknown start sorting first.
fn cmp_start(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(a), Some(b)) => a.cmp(&b),
  }
}

/// `start <= end`, reading `None` as unbounded on its own side.
fn ordered(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
  match (start, end) {
    (Some(s), Some(e)) => s <= e,
    _ => true,
  }
}

fn min_end(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
  match (a, b) {
    (Some(a), Some(b)) => Some(a.min(b)),
    (Some(a), None) => Some(a),
    (None, b) => b,
  }
}

/// `window` minus the union of `periods`, as sorted disjoint closed windows.
///
/// Periods may overlap one another and may reach outside `window`; empty
/// periods cover nothing.
pub fn gaps(window: &Window, periods: &[Window]) -> Vec<Window> {
  if window.is_empty() {
    return Vec::new();
  }

  let mut sorted: Vec<&Window> = periods.iter().filter(|p| !p.is_empty()).collect();
  sorted.sort_by(|a, b| cmp_start(a.start, b.start));

  let mut gaps = Vec::new();
  // First instant of `window` not yet known to be covered.
  let mut cursor = window.start;

  for period in sorted {
    if let Some(period_start) = period.start {
      let uncovered = cursor.is_none_or(|c| c < period_start);
      let gap_end = min_end(Some(period_start - resolution()), window.end);
      if uncovered && ordered(cursor, gap_end) {
        gaps.push(Window::new(cursor, gap_end));
      }
    }

    let Some(period_end) = period.end else {
      // Covered through the end of time.
      return gaps;
    };
    let next = period_end + resolution();
    cursor = Some(cursor.map_or(next, |c| c.max(next)));

    if !ordered(cursor, window.end) {
      return gaps;
    }
  }

  gaps.push(Window::new(cursor, window.end));
  gaps
}

/// Filler certifications for `anchor`, given every certification of the run
/// that shares its code.
pub fn fill_gaps(
  anchor: Anchor<'_>,
  existing: &[Certification],
  ctx: &BuildContext,
) -> Result<Vec<Certification>> {
  let window = anchor.window(ctx)?;
  let periods: Vec<Window> = existing
    .iter()
    .filter(|c| c.identity.code(anchor.side()) == Some(anchor.code()))
    .map(|c| Window::new(c.period_validity.start, c.period_validity.end))
    .collect();

  let holes = gaps(&window, &periods);
  if holes.is_empty() {
    return Ok(Vec::new());
  }

  let template = assemble(&anchor.alone(), ctx)?;
  holes
    .into_iter()
    .map(|hole| {
      let mut filler = template.clone();
      filler.period_validity.start = hole.start;
      filler.period_validity.end = hole.end;
      filler.validate()?;
      Ok(filler)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use proptest::prelude::*;

  use super::*;

  const BASE: i64 = 1_700_000_000;

  fn s(offset: i64) -> Option<DateTime<Utc>> {
    Some(Utc.timestamp_opt(BASE + offset, 0).unwrap())
  }

  fn w(start: i64, end: i64) -> Window { Window::new(s(start), s(end)) }

  #[test]
  fn fully_covered_has_no_gaps() {
    assert!(gaps(&w(0, 10), &[w(0, 4), w(5, 10)]).is_empty());
    assert!(gaps(&w(0, 10), &[w(-5, 20)]).is_empty());
  }

  #[test]
  fn gaps_before_between_and_after() {
    let found = gaps(&w(0, 20), &[w(3, 5), w(9, 12)]);
    assert_eq!(found, vec![w(0, 2), w(6, 8), w(13, 20)]);
  }

  #[test]
  fn overlapping_periods_merge() {
    let found = gaps(&w(0, 20), &[w(2, 10), w(4, 6), w(8, 15)]);
    assert_eq!(found, vec![w(0, 1), w(16, 20)]);
  }

  #[test]
  fn unbounded_window_sides() {
    let window = Window::new(None, None);
    let found = gaps(&window, &[w(0, 10)]);
    assert_eq!(found, vec![Window::new(None, s(-1)), Window::new(s(11), None)]);

    let found = gaps(&window, &[Window::new(None, s(10))]);
    assert_eq!(found, vec![Window::new(s(11), None)]);

    assert!(gaps(&window, &[Window::new(None, None)]).is_empty());
  }

  #[test]
  fn empty_periods_cover_nothing() {
    assert_eq!(gaps(&w(0, 5), &[w(4, 2)]), vec![w(0, 5)]);
    assert!(gaps(&w(5, 0), &[]).is_empty());
  }

  fn covered(periods: &[Window], t: DateTime<Utc>) -> usize {
    periods.iter().filter(|p| p.contains(t)).count()
  }

  proptest! {
    #[test]
    fn gaps_and_periods_tile_the_window(
      (ws, we) in (0i64..50, 0i64..50).prop_map(|(a, b)| (a.min(b), a.max(b))),
      raw in prop::collection::vec((-10i64..60, 0i64..20), 0..8),
    ) {
      let window = w(ws, we);
      let periods: Vec<Window> = raw.iter().map(|(a, len)| w(*a, a + len)).collect();
      let found = gaps(&window, &periods);

      for hole in &found {
        prop_assert!(!hole.is_empty());
        prop_assert!(window.start <= hole.start && hole.end <= window.end);
      }
      for t in (ws - 15)..(we + 15) {
        let instant = s(t).unwrap();
        let in_gaps = covered(&found, instant);
        if window.contains(instant) {
          let in_periods = covered(&periods, instant);
          // Exactly one of: some period covers it, or exactly one gap does.
          prop_assert_eq!(in_gaps, usize::from(in_periods == 0));
        } else {
          prop_assert_eq!(in_gaps, 0);
        }
      }
    }
  }

  #[test]
  fn fillers_keep_the_code_and_null_the_other_side() {
    let diploma = DiplomaRecord {
      code: "50022135".into(),
      opened_on: Some("01/09/2021".into()),
      closed_on: Some("31/08/2024".into()),
      ..Default::default()
    };
    let fiche = QualificationRecord {
      code: "RNCP100".into(),
      first_activated_on: Some("01/01/2022".into()),
      registration_ends_on: Some("31/12/2023".into()),
      ..Default::default()
    };
    let ctx = BuildContext::default();
    let paired = assemble(
      &AggregatePair { diploma: Some(diploma.clone()), qualification: Some(fiche) },
      &ctx,
    )
    .unwrap();

    let fillers = fill_gaps(Anchor::Diploma(&diploma), &[paired], &ctx).unwrap();
    let spans: Vec<(String, String)> = fillers
      .iter()
      .map(|f| {
        assert_eq!(f.identity.qualification_code, None);
        assert!(f.period_validity.diploma.is_some());
        (
          f.period_validity.start.unwrap().to_rfc3339(),
          f.period_validity.end.unwrap().to_rfc3339(),
        )
      })
      .collect();
    assert_eq!(
      spans,
      vec![
        ("2021-08-31T22:00:00+00:00".into(), "2021-12-31T22:59:59+00:00".into()),
        ("2023-12-31T23:00:00+00:00".into(), "2024-08-31T21:59:59+00:00".into()),
      ]
    );
  }
}
