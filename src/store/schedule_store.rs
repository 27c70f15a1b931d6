//! ScheduleStore: SQLite persistence for series and occurrence rows.
//!
//! Series are stored as JSON documents with their state columns indexed;
//! occurrences are plain rows keyed by `(series_id, start_time)`. Every
//! check-then-act on an occurrence runs inside one `BEGIN IMMEDIATE`
//! transaction, so concurrent workers (threads or processes sharing the
//! database file) serialize on the write lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::records::{OCCURRENCE_COLUMNS, OccurrenceRow, to_millis};
use super::traits::{ClaimOutcome, OccurrenceRegistry, SeriesRepository};
use crate::domain::{MaterializedRef, RecurrenceSeries, ScheduledOccurrence, SeriesState};
use crate::error::{CadenceError, Result};
use crate::id::now_ms;

/// SQLite-backed series repository and occurrence registry
pub struct ScheduleStore {
    /// Database file, `None` for in-memory stores
    db_path: Option<PathBuf>,

    /// rusqlite::Connection is not Sync; all access goes through the mutex
    db: Mutex<Connection>,
}

impl std::fmt::Debug for ScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl ScheduleStore {
    /// Open or create a store in `base_dir`.
    ///
    /// The database lives at `<base_dir>/cadence.db`.
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)?;
        let db_path = base_dir.join("cadence.db");
        let db = Connection::open(&db_path)?;
        Self::init(db, Some(db_path))
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(db: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        db.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init_schema(&db)?;
        log::debug!("Opened schedule store at {:?}", db_path);
        Ok(Self {
            db_path,
            db: Mutex::new(db),
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS series (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                next_run_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_series_state ON series(state);

            CREATE TABLE IF NOT EXISTS occurrences (
                series_id TEXT NOT NULL REFERENCES series(id) ON DELETE CASCADE,
                start_time INTEGER NOT NULL,
                materialized_ref TEXT,
                cancelled INTEGER NOT NULL DEFAULT 0,
                claimed_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (series_id, start_time)
            );
            "#,
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| CadenceError::Storage(e.to_string()))
    }

    /// Insert a new series row from its record.
    fn write_series(db: &Connection, series: &RecurrenceSeries) -> Result<usize> {
        let json_data = serde_json::to_string(series)?;
        let changed = db.execute(
            r#"
            INSERT INTO series (id, state, next_run_at, created_at, updated_at, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                series.id,
                series.state.as_str(),
                series.next_run_at.map(to_millis),
                series.created_at,
                series.updated_at,
                json_data,
            ],
        )?;
        Ok(changed)
    }

    fn read_series(db: &Connection, id: &str) -> Result<Option<RecurrenceSeries>> {
        let json: Option<String> = db
            .query_row("SELECT json_data FROM series WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(CadenceError::from))
            .transpose()
    }

    fn read_occurrence(db: &Connection, series_id: &str, at: DateTime<Utc>) -> Result<Option<ScheduledOccurrence>> {
        let sql = format!(
            "SELECT {} FROM occurrences WHERE series_id = ?1 AND start_time = ?2",
            OCCURRENCE_COLUMNS
        );
        let row = db
            .query_row(&sql, params![series_id, to_millis(at)], OccurrenceRow::from_row)
            .optional()?;
        row.map(OccurrenceRow::into_occurrence).transpose()
    }

    fn series_exists(db: &Connection, id: &str) -> Result<bool> {
        let found: Option<i64> = db
            .query_row("SELECT 1 FROM series WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Count occurrence rows, across all series.
    pub fn count_occurrences(&self) -> Result<usize> {
        let db = self.conn()?;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM occurrences", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl SeriesRepository for ScheduleStore {
    fn insert_series(&self, series: &RecurrenceSeries) -> Result<()> {
        let db = self.conn()?;
        Self::write_series(&db, series)?;
        Ok(())
    }

    fn get_series(&self, id: &str) -> Result<Option<RecurrenceSeries>> {
        let db = self.conn()?;
        Self::read_series(&db, id)
    }

    fn update_series(&self, series: &RecurrenceSeries) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !Self::series_exists(&tx, &series.id)? {
            return Err(CadenceError::SeriesNotFound(series.id.clone()));
        }
        let json_data = serde_json::to_string(series)?;
        tx.execute(
            r#"
            UPDATE series SET state = ?2, next_run_at = ?3, updated_at = ?4, json_data = ?5
            WHERE id = ?1
            "#,
            params![
                series.id,
                series.state.as_str(),
                series.next_run_at.map(to_millis),
                series.updated_at,
                json_data,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_series(&self, id: &str) -> Result<bool> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM occurrences WHERE series_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM series WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list_series(&self) -> Result<Vec<RecurrenceSeries>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT json_data FROM series ORDER BY created_at, id")?;
        let rows = stmt.query_map([], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            let record: RecurrenceSeries = serde_json::from_str(&json)?;
            records.push(record);
        }

        Ok(records)
    }

    fn set_state(&self, id: &str, state: SeriesState, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut series = Self::read_series(&tx, id)?.ok_or_else(|| CadenceError::SeriesNotFound(id.to_string()))?;
        series.state = state;
        series.next_run_at = next_run_at;
        series.updated_at = now_ms();
        tx.execute(
            "UPDATE series SET state = ?2, next_run_at = ?3, updated_at = ?4, json_data = ?5 WHERE id = ?1",
            params![
                id,
                state.as_str(),
                next_run_at.map(to_millis),
                series.updated_at,
                serde_json::to_string(&series)?,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl OccurrenceRegistry for ScheduleStore {
    fn find_occurrence(&self, series_id: &str, at: DateTime<Utc>) -> Result<Option<ScheduledOccurrence>> {
        let db = self.conn()?;
        Self::read_occurrence(&db, series_id, at)
    }

    fn upsert_occurrence(
        &self,
        series_id: &str,
        at: DateTime<Utc>,
        materialized_ref: Option<MaterializedRef>,
        cancelled: Option<bool>,
    ) -> Result<ScheduledOccurrence> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !Self::series_exists(&tx, series_id)? {
            return Err(CadenceError::SeriesNotFound(series_id.to_string()));
        }

        let now = now_ms();
        let start = to_millis(at);
        tx.execute(
            r#"
            INSERT INTO occurrences (series_id, start_time, materialized_ref, cancelled, claimed_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, COALESCE(?4, 0), NULL, ?5, ?5)
            ON CONFLICT (series_id, start_time) DO UPDATE SET
                materialized_ref = COALESCE(?3, materialized_ref),
                cancelled = COALESCE(?4, cancelled),
                updated_at = ?5
            "#,
            params![series_id, start, materialized_ref.map(|r| r.0), cancelled, now],
        )?;
        let occurrence = Self::read_occurrence(&tx, series_id, at)?
            .ok_or_else(|| CadenceError::Storage(format!("occurrence vanished: {} {}", series_id, at)))?;
        tx.commit()?;
        Ok(occurrence)
    }

    fn claim_occurrence(
        &self,
        series_id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        claim_ttl: TimeDelta,
    ) -> Result<ClaimOutcome> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !Self::series_exists(&tx, series_id)? {
            return Err(CadenceError::SeriesNotFound(series_id.to_string()));
        }

        let outcome = match Self::read_occurrence(&tx, series_id, at)? {
            Some(occ) if occ.cancelled => ClaimOutcome::Cancelled,
            Some(ScheduledOccurrence {
                materialized_ref: Some(r),
                ..
            }) => ClaimOutcome::AlreadyMaterialized(r),
            Some(ScheduledOccurrence {
                claimed_at: Some(claimed_at),
                ..
            }) if now - claimed_at < claim_ttl => ClaimOutcome::InFlight { claimed_at },
            Some(_) => {
                tx.execute(
                    "UPDATE occurrences SET claimed_at = ?3, updated_at = ?4 WHERE series_id = ?1 AND start_time = ?2",
                    params![series_id, to_millis(at), to_millis(now), now_ms()],
                )?;
                ClaimOutcome::Claimed
            }
            None => {
                let created = now_ms();
                tx.execute(
                    r#"
                    INSERT INTO occurrences (series_id, start_time, materialized_ref, cancelled, claimed_at, created_at, updated_at)
                    VALUES (?1, ?2, NULL, 0, ?3, ?4, ?4)
                    "#,
                    params![series_id, to_millis(at), to_millis(now), created],
                )?;
                ClaimOutcome::Claimed
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn complete_occurrence(&self, series_id: &str, at: DateTime<Utc>, materialized_ref: &MaterializedRef) -> Result<()> {
        let db = self.conn()?;
        let changed = db.execute(
            r#"
            UPDATE occurrences SET materialized_ref = ?3, claimed_at = NULL, updated_at = ?4
            WHERE series_id = ?1 AND start_time = ?2
            "#,
            params![series_id, to_millis(at), materialized_ref.as_str(), now_ms()],
        )?;
        if changed == 0 {
            // Series was deleted while the materializer ran
            return Err(CadenceError::SeriesNotFound(series_id.to_string()));
        }
        Ok(())
    }

    fn release_occurrence(&self, series_id: &str, at: DateTime<Utc>) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "UPDATE occurrences SET claimed_at = NULL, updated_at = ?3 WHERE series_id = ?1 AND start_time = ?2",
            params![series_id, to_millis(at), now_ms()],
        )?;
        Ok(())
    }

    fn list_occurrences(&self, series_id: &str) -> Result<Vec<ScheduledOccurrence>> {
        let db = self.conn()?;
        let sql = format!(
            "SELECT {} FROM occurrences WHERE series_id = ?1 ORDER BY start_time",
            OCCURRENCE_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map([series_id], OccurrenceRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_occurrence()?);
        }
        Ok(records)
    }
}
