#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use risk_register_core::{
    clamp_rating, format_rfc3339, now_utc, ComplianceAssessment, Questionnaire, RiskEntry,
    RiskRegister, SessionContext,
};
use rusqlite::{params, Connection};

/// Environment variable naming the backing database file.
///
/// Absence is not an error: callers run in memory against the default
/// dataset instead.
pub const ENV_DATABASE: &str = "RISK_REGISTER_DB";

const MIGRATION_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS risks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  description TEXT NOT NULL,
  probability INTEGER NOT NULL CHECK (probability BETWEEN 1 AND 5),
  impact INTEGER NOT NULL CHECK (impact BETWEEN 1 AND 5),
  score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 25),
  classification TEXT NOT NULL CHECK (classification IN ('low', 'medium', 'high'))
);

CREATE TABLE IF NOT EXISTS quality_ratings (
  characteristic TEXT PRIMARY KEY,
  rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS compliance_ratings (
  area TEXT NOT NULL,
  control TEXT NOT NULL,
  rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
  updated_at TEXT NOT NULL,
  PRIMARY KEY (area, control)
);
";

/// Typed storage failures, so callers can tell "store unreachable" apart
/// from "no data yet" (which is an `Ok` empty result).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored row invalid: {0}")]
    InvalidRow(String),
}

fn unavailable(context: &str, err: &rusqlite::Error) -> StoreError {
    StoreError::Unavailable(format!("{context}: {err}"))
}

pub struct SqliteRiskStore {
    conn: Connection,
}

impl SqliteRiskStore {
    /// Opens (or creates) the database and applies connection pragmas.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|err| {
            StoreError::Unavailable(format!(
                "failed to open sqlite database at {}: {err}",
                path.display()
            ))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|err| unavailable("failed to configure sqlite pragmas", &err))?;

        Ok(Self { conn })
    }

    /// Resolves the database path from [`ENV_DATABASE`], if set.
    #[must_use]
    pub fn env_database_path() -> Option<PathBuf> {
        std::env::var_os(ENV_DATABASE).map(PathBuf::from)
    }

    /// Idempotently creates the backing tables. Existing data is untouched.
    pub fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .map_err(|err| unavailable("failed to ensure schema_migrations exists", &err))?;

        self.conn
            .execute_batch(SCHEMA_V1)
            .map_err(|err| unavailable("failed to apply risk register schema", &err))?;

        let now = format_rfc3339(now_utc())
            .map_err(|err| StoreError::InvalidRow(err.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![MIGRATION_VERSION, now],
            )
            .map_err(|err| unavailable("failed to register schema migration", &err))?;

        Ok(())
    }

    /// Loads every persisted risk row in stored order.
    ///
    /// Derived columns are recomputed from probability and impact on the way
    /// out; stored score/classification values are never trusted. An empty
    /// result means no data yet, not a failure.
    pub fn load_risks(&self) -> Result<Vec<RiskEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT description, probability, impact
                 FROM risks
                 ORDER BY id ASC",
            )
            .map_err(|err| unavailable("failed to prepare risk query", &err))?;

        let rows = stmt
            .query_map([], |row| {
                let description: String = row.get(0)?;
                let probability: i64 = row.get(1)?;
                let impact: i64 = row.get(2)?;
                Ok((description, probability, impact))
            })
            .map_err(|err| unavailable("failed to query risks", &err))?;

        let mut entries = Vec::new();
        for row in rows {
            let (description, probability, impact) =
                row.map_err(|err| unavailable("failed to read risk row", &err))?;
            let probability = rating_from_sql("probability", probability)?;
            let impact = rating_from_sql("impact", impact)?;
            entries.push(RiskEntry::new(&description, probability, impact));
        }

        Ok(entries)
    }

    /// Replaces every persisted risk row with the given table, in one
    /// transaction: delete all, then insert each row in order.
    ///
    /// An empty table leaves the backing store empty. On failure nothing is
    /// partially applied.
    pub fn replace_risks(&mut self, entries: &[RiskEntry]) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| unavailable("failed to start replace transaction", &err))?;

        tx.execute("DELETE FROM risks", [])
            .map_err(|err| unavailable("failed to clear risks", &err))?;

        for entry in entries {
            // Persist freshly derived columns regardless of what the caller
            // holds in memory.
            let mut row = entry.clone();
            row.recompute();
            tx.execute(
                "INSERT INTO risks(description, probability, impact, score, classification)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.description,
                    i64::from(row.probability),
                    i64::from(row.impact),
                    i64::from(row.score),
                    row.classification.as_str(),
                ],
            )
            .map_err(|err| unavailable("failed to insert risk row", &err))?;
        }

        tx.commit()
            .map_err(|err| unavailable("failed to commit replace transaction", &err))
    }

    /// Loads the persisted quality snapshot, keyed by characteristic.
    pub fn load_quality(&self) -> Result<BTreeMap<String, u8>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT characteristic, rating FROM quality_ratings")
            .map_err(|err| unavailable("failed to prepare quality query", &err))?;

        let rows = stmt
            .query_map([], |row| {
                let characteristic: String = row.get(0)?;
                let rating: i64 = row.get(1)?;
                Ok((characteristic, rating))
            })
            .map_err(|err| unavailable("failed to query quality ratings", &err))?;

        let mut ratings = BTreeMap::new();
        for row in rows {
            let (characteristic, rating) =
                row.map_err(|err| unavailable("failed to read quality row", &err))?;
            ratings.insert(characteristic, rating_from_sql("rating", rating)?);
        }

        Ok(ratings)
    }

    /// Replaces the quality snapshot with the questionnaire's current state.
    pub fn replace_quality(&mut self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        let now = format_rfc3339(now_utc())
            .map_err(|err| StoreError::InvalidRow(err.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .map_err(|err| unavailable("failed to start quality transaction", &err))?;

        tx.execute("DELETE FROM quality_ratings", [])
            .map_err(|err| unavailable("failed to clear quality ratings", &err))?;

        for (characteristic, rating) in questionnaire.iter() {
            tx.execute(
                "INSERT INTO quality_ratings(characteristic, rating, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![characteristic, i64::from(rating), now],
            )
            .map_err(|err| unavailable("failed to insert quality rating", &err))?;
        }

        tx.commit()
            .map_err(|err| unavailable("failed to commit quality transaction", &err))
    }

    /// Loads the persisted compliance snapshot as (area, control, rating)
    /// rows.
    pub fn load_compliance(&self) -> Result<Vec<(String, String, u8)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT area, control, rating
                 FROM compliance_ratings
                 ORDER BY area ASC, control ASC",
            )
            .map_err(|err| unavailable("failed to prepare compliance query", &err))?;

        let rows = stmt
            .query_map([], |row| {
                let area: String = row.get(0)?;
                let control: String = row.get(1)?;
                let rating: i64 = row.get(2)?;
                Ok((area, control, rating))
            })
            .map_err(|err| unavailable("failed to query compliance ratings", &err))?;

        let mut ratings = Vec::new();
        for row in rows {
            let (area, control, rating) =
                row.map_err(|err| unavailable("failed to read compliance row", &err))?;
            ratings.push((area, control, rating_from_sql("rating", rating)?));
        }

        Ok(ratings)
    }

    /// Replaces the compliance snapshot with the assessment's current state.
    pub fn replace_compliance(
        &mut self,
        assessment: &ComplianceAssessment,
    ) -> Result<(), StoreError> {
        let now = format_rfc3339(now_utc())
            .map_err(|err| StoreError::InvalidRow(err.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .map_err(|err| unavailable("failed to start compliance transaction", &err))?;

        tx.execute("DELETE FROM compliance_ratings", [])
            .map_err(|err| unavailable("failed to clear compliance ratings", &err))?;

        for (area, questionnaire) in assessment.iter() {
            for (control, rating) in questionnaire.iter() {
                tx.execute(
                    "INSERT INTO compliance_ratings(area, control, rating, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![area, control, i64::from(rating), now],
                )
                .map_err(|err| unavailable("failed to insert compliance rating", &err))?;
            }
        }

        tx.commit()
            .map_err(|err| unavailable("failed to commit compliance transaction", &err))
    }

    /// Loads a full session: persisted risks (or the default set when none
    /// exist) plus both questionnaires seeded from their snapshots.
    pub fn load_session(&self) -> Result<SessionContext, StoreError> {
        let entries = self.load_risks()?;
        let risks = if entries.is_empty() {
            RiskRegister::default_set()
        } else {
            RiskRegister::from_entries(entries)
        };

        let mut quality = Questionnaire::quality();
        quality.seed(&self.load_quality()?);

        let mut compliance = ComplianceAssessment::new();
        compliance.seed(&self.load_compliance()?);

        Ok(SessionContext {
            risks,
            quality,
            compliance,
        })
    }

    /// Persists a full session with replace-all semantics per table.
    pub fn save_session(&mut self, session: &SessionContext) -> Result<(), StoreError> {
        self.replace_risks(session.risks.entries())?;
        self.replace_quality(&session.quality)?;
        self.replace_compliance(&session.compliance)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn rating_from_sql(column: &str, value: i64) -> Result<u8, StoreError> {
    let rating = u8::try_from(value)
        .map_err(|_| StoreError::InvalidRow(format!("invalid {column} value: {value}")))?;
    Ok(clamp_rating(rating))
}
