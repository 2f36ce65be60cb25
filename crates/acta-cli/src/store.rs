//! SQLite storage for tally records and the polling-table registry.

use std::collections::HashMap;
use std::path::Path;

use acta_core::error::PersistError;
use acta_core::{CapacityLookup, DocumentResult, Field, PersistenceAdapter};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use tracing::{debug, info, warn};

/// Observation stored when a sheet has no discrepancies.
pub const NO_OBSERVATIONS: &str = "No observations";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database and make sure the tables exist.
    pub fn open<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS precincts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL DEFAULT 'Inactive'
            );
            CREATE TABLE IF NOT EXISTS polling_tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                capacity INTEGER NOT NULL,
                precinct_id INTEGER REFERENCES precincts(id)
            );
            CREATE TABLE IF NOT EXISTS tally_sheets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL REFERENCES polling_tables(id),
                ballots_unused INTEGER,
                ballots_used INTEGER,
                valid_votes INTEGER,
                blank_votes INTEGER,
                null_votes INTEGER,
                mas INTEGER,
                sumate INTEGER,
                votexchi INTEGER,
                chupacoto INTEGER,
                observation TEXT NOT NULL,
                status TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                size_kb INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tally_sheets_table_id ON tally_sheets(table_id);",
        )?;

        debug!("Database initialized");
        Ok(Self { conn })
    }

    /// Every registered capacity, keyed by table code.
    pub fn capacities(&self) -> SqliteResult<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT code, capacity FROM polling_tables")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        rows.collect()
    }

    #[cfg(test)]
    fn register(&self, code: &str, capacity: i64) -> SqliteResult<i64> {
        self.conn.execute("INSERT INTO precincts (status) VALUES ('Inactive')", [])?;
        let precinct_id = self.conn.last_insert_rowid();
        self.conn.execute(
            "INSERT INTO polling_tables (code, capacity, precinct_id) VALUES (?1, ?2, ?3)",
            params![code, capacity, precinct_id],
        )?;
        Ok(precinct_id)
    }
}

impl CapacityLookup for SqliteStore {
    fn capacity(&self, table_code: &str) -> Option<i64> {
        let capacity = self
            .conn
            .query_row(
                "SELECT capacity FROM polling_tables WHERE code = ?1",
                params![table_code],
                |row| row.get(0),
            )
            .optional();

        match capacity {
            Ok(capacity) => capacity,
            Err(e) => {
                warn!("Capacity lookup for {} failed: {}", table_code, e);
                None
            }
        }
    }
}

impl PersistenceAdapter for SqliteStore {
    fn persist(&mut self, result: &DocumentResult) -> Result<(), PersistError> {
        let code = result.table_code().ok_or(PersistError::MissingTableCode)?;

        let tx = self.conn.transaction().map_err(storage)?;

        let table: Option<(i64, Option<i64>)> = tx
            .query_row(
                "SELECT id, precinct_id FROM polling_tables WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage)?;
        let Some((table_id, precinct_id)) = table else {
            return Err(PersistError::UnknownTable(code.to_string()));
        };

        let observation = if result.is_consistent() {
            NO_OBSERVATIONS.to_string()
        } else {
            result.messages().join("\n")
        };
        let status = if result.is_consistent() { "V" } else { "A" };
        let value = |field: Field| result.fields.get(field).value();

        tx.execute(
            "INSERT INTO tally_sheets (
                table_id, ballots_unused, ballots_used, valid_votes, blank_votes, null_votes,
                mas, sumate, votexchi, chupacoto, observation, status, registered_at, size_kb
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                table_id,
                value(Field::BallotsUnused),
                value(Field::BallotsUsed),
                value(Field::ValidVotes),
                value(Field::BlankVotes),
                value(Field::NullVotes),
                value(Field::Mas),
                value(Field::Sumate),
                value(Field::Votexchi),
                value(Field::Chupacoto),
                observation,
                status,
                Utc::now().to_rfc3339(),
                result.size_kb() as i64,
            ],
        )
        .map_err(storage)?;

        if let Some(precinct_id) = precinct_id {
            tx.execute(
                "UPDATE precincts SET status = 'Active' WHERE id = ?1",
                params![precinct_id],
            )
            .map_err(storage)?;
        }

        tx.commit().map_err(storage)?;
        info!("{}: stored as table {} ({})", result.source, code, status);
        Ok(())
    }
}

fn storage(e: rusqlite::Error) -> PersistError {
    PersistError::Storage(e.to_string())
}
