//! SQLite persistence for geohash aggregates.
//!
//! The table is append-only: one row per (year, survey, species, geohash)
//! written by a run. Rows for a survey-year are written inside one
//! transaction so an interrupted write leaves nothing behind.

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OpenFlags, params};
use serde::Serialize;

use crate::domain::{SimplifiedRecord, UnitOfWork};
use crate::error::GeobinError;

pub const TABLE_NAME: &str = "species_geohash_aggregates";

/// Idempotent DDL for the aggregate table and its lookup index.
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS species_geohash_aggregates (
        year INTEGER NOT NULL,
        survey TEXT NOT NULL,
        species TEXT NOT NULL,
        common_name TEXT NOT NULL,
        geohash TEXT NOT NULL,
        surface_temp REAL NOT NULL,
        bottom_temp REAL NOT NULL,
        weight REAL NOT NULL,
        count REAL NOT NULL,
        area_swept REAL NOT NULL,
        num_aggregated INTEGER NOT NULL CHECK (num_aggregated >= 1)
    );
    CREATE INDEX IF NOT EXISTS idx_aggregates_key
        ON species_geohash_aggregates(year, survey, species, geohash);
    "#
}

const INSERT_SQL: &str = "INSERT INTO species_geohash_aggregates
    (year, survey, species, common_name, geohash, surface_temp, bottom_temp,
     weight, count, area_swept, num_aggregated)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const DELETE_UNIT_SQL: &str =
    "DELETE FROM species_geohash_aggregates WHERE survey = ?1 AND year = ?2";

/// Destination for the finished aggregates of one unit of work.
pub trait AggregateSink {
    /// Writes every record atomically, returning the number of rows inserted.
    fn persist(
        &mut self,
        unit: &UnitOfWork,
        records: &[SimplifiedRecord],
    ) -> Result<usize, GeobinError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredUnit {
    pub year: i32,
    pub survey: String,
    pub rows: u64,
    pub observations: u64,
}

pub struct SqliteStore {
    conn: Connection,
    path: Option<Utf8PathBuf>,
    replace_existing: bool,
}

impl SqliteStore {
    pub fn open(path: &Utf8Path) -> Result<Self, GeobinError> {
        let conn = Connection::open(path.as_std_path())?;
        tracing::debug!(%path, "opened store");
        Ok(Self {
            conn,
            path: Some(path.to_owned()),
            replace_existing: false,
        })
    }

    /// Opens an existing store read-only. Never creates the file or the table.
    pub fn open_existing(path: &Utf8Path) -> Result<Self, GeobinError> {
        let conn = Connection::open_with_flags(
            path.as_std_path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| GeobinError::Store(format!("cannot open {path}: {err}")))?;
        let store = Self {
            conn,
            path: Some(path.to_owned()),
            replace_existing: false,
        };
        if !store.has_table()? {
            return Err(GeobinError::MissingTable(path.to_string()));
        }
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, GeobinError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
            replace_existing: false,
        })
    }

    /// Opens the store at `path` and applies the schema. Safe to repeat.
    pub fn create_table(path: &Utf8Path) -> Result<Self, GeobinError> {
        let store = Self::open(path)?;
        store.ensure_schema()?;
        tracing::info!(%path, table = TABLE_NAME, "table ready");
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<(), GeobinError> {
        self.conn.execute_batch(create_schema())?;
        Ok(())
    }

    pub fn has_table(&self) -> Result<bool, GeobinError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [TABLE_NAME],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// When set, each persist first deletes the unit's existing rows in the same transaction.
    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn row_count(&self) -> Result<u64, GeobinError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM species_geohash_aggregates",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn records_for(&self, unit: &UnitOfWork) -> Result<Vec<SimplifiedRecord>, GeobinError> {
        let mut stmt = self.conn.prepare(
            "SELECT year, survey, species, common_name, geohash, surface_temp, bottom_temp,
                    weight, count, area_swept, num_aggregated
             FROM species_geohash_aggregates
             WHERE survey = ?1 AND year = ?2
             ORDER BY species, geohash",
        )?;
        let rows = stmt.query_map(params![unit.survey.as_str(), unit.year], |row| {
            Ok(SimplifiedRecord {
                year: row.get(0)?,
                survey: row.get(1)?,
                species: row.get(2)?,
                common_name: row.get(3)?,
                geohash: row.get(4)?,
                surface_temperature: row.get(5)?,
                bottom_temperature: row.get(6)?,
                weight: row.get(7)?,
                count: row.get(8)?,
                area_swept: row.get(9)?,
                num_aggregated: row.get(10)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Row and folded-observation totals per survey-year, oldest first.
    pub fn summary(&self) -> Result<Vec<StoredUnit>, GeobinError> {
        let mut stmt = self.conn.prepare(
            "SELECT year, survey, COUNT(*), SUM(num_aggregated)
             FROM species_geohash_aggregates
             GROUP BY year, survey
             ORDER BY year, survey",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredUnit {
                year: row.get(0)?,
                survey: row.get(1)?,
                rows: row.get::<_, i64>(2)? as u64,
                observations: row.get::<_, i64>(3)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl AggregateSink for SqliteStore {
    fn persist(
        &mut self,
        unit: &UnitOfWork,
        records: &[SimplifiedRecord],
    ) -> Result<usize, GeobinError> {
        let tx = self.conn.transaction()?;
        if self.replace_existing {
            let removed = tx.execute(DELETE_UNIT_SQL, params![unit.survey.as_str(), unit.year])?;
            if removed > 0 {
                tracing::info!(%unit, removed, "replaced existing rows");
            }
        }
        {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            for record in records {
                stmt.execute(params![
                    record.year,
                    record.survey,
                    record.species,
                    record.common_name,
                    record.geohash,
                    record.surface_temperature,
                    record.bottom_temperature,
                    record.weight,
                    record.count,
                    record.area_swept,
                    record.num_aggregated,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }
}
