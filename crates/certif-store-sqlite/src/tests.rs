//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration;

use certif_core::{
  aggregate::AggregatePair,
  builder::{BuildContext, assemble},
  certification::{Certification, RunStamp, Side},
  source::{DiplomaRecord, MappingRecord, QualificationRecord, SourceSnapshot},
  store::{CertificationStore, LeaseOutcome, RunRecord, SourceStore},
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(hour: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap() }

fn diploma(code: &str) -> DiplomaRecord {
  DiplomaRecord {
    code: code.into(),
    title_long: Some("CUISINE".into()),
    opened_on: Some("01/09/2021".into()),
    closed_on: Some("31/08/2024".into()),
    level_code: Some("3".into()),
    ..Default::default()
  }
}

fn fiche(code: &str) -> QualificationRecord {
  QualificationRecord {
    code: code.into(),
    title: Some("Cuisine".into()),
    active: true,
    first_activated_on: Some("01/01/2022".into()),
    registration_ends_on: Some("31/12/2023".into()),
    level_label: Some("NIV3".into()),
    access_routes: vec!["En contrat d’apprentissage".into()],
    ..Default::default()
  }
}

fn certification(pair: AggregatePair) -> Certification {
  assemble(&pair, &BuildContext::default()).unwrap()
}

fn stamp(hour: u32) -> RunStamp { RunStamp { run_id: Uuid::new_v4(), run_at: at(hour) } }

// ─── Sources ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_has_empty_snapshot() {
  let s = store().await;
  assert_eq!(s.snapshot().await.unwrap(), SourceSnapshot::default());
  assert!(s.diplomas_after(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn replace_and_page_sources() {
  let s = store().await;
  s.replace_diplomas(
    vec![diploma("50000003"), diploma("50000001"), diploma("50000002")],
    at(1),
  )
  .await
  .unwrap();

  let first = s.diplomas_after(None, 2).await.unwrap();
  let codes: Vec<_> = first.iter().map(|d| d.code.as_str()).collect();
  assert_eq!(codes, vec!["50000001", "50000002"]);

  let rest = s.diplomas_after(Some("50000002".into()), 2).await.unwrap();
  assert_eq!(rest.len(), 1);
  assert_eq!(rest[0], diploma("50000003"));

  // A second import replaces the whole set.
  s.replace_diplomas(vec![diploma("50000009")], at(2)).await.unwrap();
  let all = s.diplomas_after(None, 10).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(s.snapshot().await.unwrap().diplomas_imported_at, Some(at(2)));
}

#[tokio::test]
async fn lookup_by_code_skips_missing() {
  let s = store().await;
  s.replace_qualifications(
    vec![fiche("RNCP1"), fiche("RNCP2")],
    at(1),
    NaiveDate::from_ymd_opt(2020, 1, 1),
  )
  .await
  .unwrap();

  let found = s
    .qualifications_by_code(vec!["RNCP2".into(), "RNCP404".into()])
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].code, "RNCP2");

  let snapshot = s.snapshot().await.unwrap();
  assert_eq!(snapshot.qualifications_imported_at, Some(at(1)));
  assert_eq!(snapshot.qualification_oldest_snapshot, NaiveDate::from_ymd_opt(2020, 1, 1));
}

#[tokio::test]
async fn unmapped_qualifications_exclude_any_mention() {
  let s = store().await;
  s.replace_qualifications(
    vec![fiche("RNCP1"), fiche("RNCP2"), fiche("RNCP3")],
    at(1),
    None,
  )
  .await
  .unwrap();
  s.replace_mappings(vec![MappingRecord::from_raw("50000001", "RNCP2")], at(1))
    .await
    .unwrap();

  let unmapped = s.unmapped_qualifications_after(None, 10).await.unwrap();
  let codes: Vec<_> = unmapped.iter().map(|q| q.code.as_str()).collect();
  assert_eq!(codes, vec!["RNCP1", "RNCP3"]);

  let after = s
    .unmapped_qualifications_after(Some("RNCP1".into()), 10)
    .await
    .unwrap();
  assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn mappings_for_keeps_no_pairing_rows() {
  let s = store().await;
  s.replace_mappings(
    vec![
      MappingRecord::from_raw("50000001", "RNCP1"),
      MappingRecord::from_raw("50000001", "NR"),
      MappingRecord::from_raw("50000002", "RNCP2"),
    ],
    at(1),
  )
  .await
  .unwrap();

  let rows = s.mappings_for(vec!["50000001".into()]).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert!(rows.iter().any(|m| m.qualification_code.is_none()));
}

#[tokio::test]
async fn dangling_mappings_on_either_side() {
  let s = store().await;
  s.replace_diplomas(vec![diploma("50000001")], at(1)).await.unwrap();
  s.replace_qualifications(vec![fiche("RNCP1")], at(1), None)
    .await
    .unwrap();
  s.replace_mappings(
    vec![
      MappingRecord::from_raw("50000001", "RNCP1"),
      MappingRecord::from_raw("50000001", "NR"),
      MappingRecord::from_raw("50000001", "RNCP9"),
      MappingRecord::from_raw("59999999", "RNCP1"),
    ],
    at(1),
  )
  .await
  .unwrap();

  let dangling = s.dangling_mappings(10).await.unwrap();
  assert_eq!(dangling.len(), 2);
  assert!(dangling.contains(&MappingRecord::from_raw("50000001", "RNCP9")));
  assert!(dangling.contains(&MappingRecord::from_raw("59999999", "RNCP1")));
}

// ─── Certifications ──────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_preserves_created_at() {
  let s = store().await;
  let cert = certification(AggregatePair {
    diploma:       Some(diploma("50000001")),
    qualification: Some(fiche("RNCP1")),
  });

  let first = stamp(1);
  assert_eq!(s.upsert_certifications(first, vec![cert.clone()]).await.unwrap(), 1);

  let second = stamp(2);
  s.upsert_certifications(second, vec![cert.clone()]).await.unwrap();

  let stored = s
    .find(Some("50000001".into()), Some("RNCP1".into()))
    .await
    .unwrap();
  assert_eq!(stored.len(), 1);
  assert_eq!(stored[0].certification, cert);
  assert_eq!(stored[0].stamp, second);
  assert_eq!(stored[0].created_at, at(1));
}

#[tokio::test]
async fn find_matches_null_halves_exactly() {
  let s = store().await;
  let paired = certification(AggregatePair {
    diploma:       Some(diploma("50000001")),
    qualification: Some(fiche("RNCP1")),
  });
  let alone = certification(AggregatePair::diploma_only(diploma("50000001")));
  s.upsert_certifications(stamp(1), vec![paired, alone.clone()])
    .await
    .unwrap();

  let found = s.find(Some("50000001".into()), None).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].certification, alone);
  assert!(s.find(None, Some("RNCP1".into())).await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_removes_rows_of_other_runs() {
  let s = store().await;
  let old = stamp(1);
  let new = stamp(2);
  s.upsert_certifications(
    old,
    vec![certification(AggregatePair::diploma_only(diploma("50000001")))],
  )
  .await
  .unwrap();
  s.upsert_certifications(
    new,
    vec![certification(AggregatePair::diploma_only(diploma("50000002")))],
  )
  .await
  .unwrap();

  assert_eq!(s.sweep(new.run_id).await.unwrap(), 1);
  let remaining = s.all_certifications().await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].stamp, new);
}

#[tokio::test]
async fn run_scoped_reads() {
  let s = store().await;
  let run = stamp(1);
  let other = stamp(2);
  s.upsert_certifications(
    run,
    vec![
      certification(AggregatePair {
        diploma:       Some(diploma("50000001")),
        qualification: Some(fiche("RNCP1")),
      }),
      certification(AggregatePair {
        diploma:       Some(diploma("50000002")),
        qualification: Some(fiche("RNCP1")),
      }),
      certification(AggregatePair::qualification_only(fiche("RNCP2"))),
    ],
  )
  .await
  .unwrap();
  s.upsert_certifications(other, vec![certification(AggregatePair {
    diploma:       Some(diploma("50000003")),
    qualification: Some(fiche("RNCP3")),
  })])
  .await
  .unwrap();

  let diplomas = s
    .paired_codes_after(run.run_id, Side::Diploma, None, 10)
    .await
    .unwrap();
  assert_eq!(diplomas, vec!["50000001", "50000002"]);

  // Unpaired RNCP2 is not listed; RNCP1 is listed once.
  let fiches = s
    .paired_codes_after(run.run_id, Side::Qualification, None, 10)
    .await
    .unwrap();
  assert_eq!(fiches, vec!["RNCP1"]);

  let for_fiche = s
    .certifications_for_code(run.run_id, Side::Qualification, "RNCP1".into())
    .await
    .unwrap();
  assert_eq!(for_fiche.len(), 2);

  let page = s.run_certifications_after(run.run_id, None, 2).await.unwrap();
  assert_eq!(page.len(), 2);
  let last_key = page[1].key().encode();
  let rest = s
    .run_certifications_after(run.run_id, Some(last_key), 2)
    .await
    .unwrap();
  assert_eq!(rest.len(), 1);
  assert_eq!(rest[0].identity.qualification_code.as_deref(), Some("RNCP2"));
}

// ─── Lease ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lease_is_exclusive_until_expiry() {
  let s = store().await;
  let ttl = Duration::from_secs(3600);

  let LeaseOutcome::Acquired(lease) = s.acquire_lease("a".into(), at(1), ttl).await.unwrap()
  else {
    panic!("first acquire should succeed");
  };
  assert_eq!(lease.expires_at, at(2));

  // The holder can renew.
  let renewed = s
    .acquire_lease("a".into(), at(1) + chrono::Duration::minutes(30), ttl)
    .await
    .unwrap();
  assert!(matches!(renewed, LeaseOutcome::Acquired(_)));

  match s.acquire_lease("b".into(), at(2), ttl).await.unwrap() {
    LeaseOutcome::Held(held) => assert_eq!(held.holder, "a"),
    other => panic!("expected held lease, got {other:?}"),
  }

  // Expired leases can be taken over.
  let taken = s.acquire_lease("b".into(), at(3), ttl).await.unwrap();
  assert!(matches!(taken, LeaseOutcome::Acquired(l) if l.holder == "b"));
}

#[tokio::test]
async fn renewal_never_retakes_a_lost_lease() {
  let s = store().await;
  let ttl = Duration::from_secs(3600);
  s.acquire_lease("a".into(), at(1), ttl).await.unwrap();

  let renewed = s
    .renew_lease("a".into(), at(1) + chrono::Duration::minutes(30), ttl)
    .await
    .unwrap();
  assert_eq!(
    renewed.map(|l| l.expires_at),
    Some(at(2) + chrono::Duration::minutes(30))
  );

  // "a" lapses, "b" takes over and finishes.
  assert!(matches!(
    s.acquire_lease("b".into(), at(3), ttl).await.unwrap(),
    LeaseOutcome::Acquired(_)
  ));
  assert_eq!(s.renew_lease("a".into(), at(3), ttl).await.unwrap(), None);
  s.release_lease("b".into()).await.unwrap();

  assert_eq!(s.renew_lease("a".into(), at(4), ttl).await.unwrap(), None);
  // Nothing was recreated for "a".
  assert!(matches!(
    s.acquire_lease("c".into(), at(4), ttl).await.unwrap(),
    LeaseOutcome::Acquired(_)
  ));
}

#[tokio::test]
async fn release_only_by_holder() {
  let s = store().await;
  let ttl = Duration::from_secs(60);
  s.acquire_lease("a".into(), at(1), ttl).await.unwrap();

  s.release_lease("b".into()).await.unwrap();
  assert!(matches!(
    s.acquire_lease("b".into(), at(1), ttl).await.unwrap(),
    LeaseOutcome::Held(_)
  ));

  s.release_lease("a".into()).await.unwrap();
  assert!(matches!(
    s.acquire_lease("b".into(), at(1), ttl).await.unwrap(),
    LeaseOutcome::Acquired(_)
  ));
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn last_successful_run_is_latest_completed() {
  let s = store().await;
  assert!(s.last_successful_run().await.unwrap().is_none());

  let sources = SourceSnapshot {
    diplomas_imported_at: Some(at(0)),
    ..Default::default()
  };
  let older = RunRecord {
    run_id:       Uuid::new_v4(),
    started_at:   at(1),
    completed_at: at(2),
    sources:      sources.clone(),
  };
  let newer = RunRecord {
    run_id:       Uuid::new_v4(),
    started_at:   at(3),
    completed_at: at(4),
    sources,
  };
  s.record_run(newer.clone()).await.unwrap();
  s.record_run(older).await.unwrap();

  assert_eq!(s.last_successful_run().await.unwrap(), Some(newer));
}
