use crate::plate::CanonicalPlate;
use crate::sightings::{Sighting, SightingStore, StoreError};
use rusqlite::{params, Connection, OptionalExtension, NO_PARAMS};
use std::path::Path;

/// Sightings kept in sqlite. The UNIQUE constraint on `license_number`
/// holds the one-record-per-plate rule even across processes.
pub struct SqliteSightingStore {
    conn: Connection,
}

impl SqliteSightingStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sighting (license_number TEXT NOT NULL UNIQUE, timestamp TEXT NOT NULL)",
            NO_PARAMS,
        )?;
        Ok(SqliteSightingStore { conn })
    }
}

impl SightingStore for SqliteSightingStore {
    fn sightings(&mut self) -> Result<Vec<Sighting>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT license_number, timestamp FROM sighting ORDER BY rowid")?;
        let rows = stmt.query_map(NO_PARAMS, |row| {
            Ok(Sighting {
                license_number: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        let mut sightings = Vec::new();
        for row in rows {
            sightings.push(row?);
        }
        Ok(sightings)
    }

    fn contains(&mut self, plate: &CanonicalPlate) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sighting WHERE license_number = ?1",
                params![plate.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&mut self, sighting: Sighting) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO sighting(license_number, timestamp) VALUES (?1, ?2)",
            params![sighting.license_number, sighting.timestamp],
        )?;
        Ok(changed == 1)
    }
}
