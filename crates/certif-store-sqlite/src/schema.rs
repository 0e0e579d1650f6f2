//! SQL schema for the certification SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Input record sets. Each is replaced wholesale by its importer.
CREATE TABLE IF NOT EXISTS diplomas (
    code        TEXT PRIMARY KEY,
    record_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS qualifications (
    code        TEXT PRIMARY KEY,
    record_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mappings (
    diploma_code       TEXT NOT NULL,
    qualification_code TEXT             -- NULL: explicitly no pairing
);

-- One row per source: 'diplomas' | 'qualifications' | 'mappings'.
CREATE TABLE IF NOT EXISTS source_imports (
    source          TEXT PRIMARY KEY,
    imported_at     TEXT NOT NULL,   -- RFC 3339 UTC
    oldest_snapshot TEXT             -- ISO date; qualifications only
);

-- Produced certifications. `cert_key` is CertificationKey::encode().
CREATE TABLE IF NOT EXISTS certifications (
    cert_key           TEXT PRIMARY KEY,
    diploma_code       TEXT,
    qualification_code TEXT,
    body_json          TEXT NOT NULL,
    run_id             TEXT NOT NULL,
    run_at             TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    CHECK (diploma_code IS NOT NULL OR qualification_code IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS reconcile_runs (
    run_id       TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    sources_json TEXT NOT NULL
);

-- Single-writer lease. Timestamps use a fixed-width UTC format so they
-- compare correctly as text.
CREATE TABLE IF NOT EXISTS leases (
    name       TEXT PRIMARY KEY,
    holder     TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS mappings_diploma_idx       ON mappings(diploma_code);
CREATE INDEX IF NOT EXISTS mappings_qualification_idx ON mappings(qualification_code);
CREATE INDEX IF NOT EXISTS certifications_run_idx     ON certifications(run_id);
CREATE INDEX IF NOT EXISTS certifications_diploma_idx ON certifications(diploma_code);
CREATE INDEX IF NOT EXISTS certifications_qual_idx    ON certifications(qualification_code);
CREATE INDEX IF NOT EXISTS runs_completed_idx         ON reconcile_runs(completed_at);

PRAGMA user_version = 1;
";
