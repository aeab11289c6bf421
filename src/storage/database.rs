//! SQLite-backed activity store using rusqlite.

use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeMap;
use std::path::Path;

use crate::export::types::{
    ActivityRecord, ActivitySummary, AttributeValue, Coordinate, LapBoundary, SensorKind,
    SensorReading, TimeDistancePair,
};
use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::storage::store::{ActivityStore, StoreError};

/// Activity store persisted in SQLite.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { conn };
        store.initialize()?;

        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { conn };
        store.initialize()?;

        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        let current_version = self.get_schema_version()?;

        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn get_schema_version(&self) -> Result<i32, StoreError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(StoreError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(&self, from_version: i32) -> Result<(), StoreError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    // ========== Seeding ==========

    /// Insert or replace an activity row.
    pub fn insert_activity(&self, activity: &ActivityRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO activities
                 (id, name, activity_type, start_time_ms, end_time_ms, has_position_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    activity.id,
                    activity.name,
                    activity.activity_type,
                    to_sql_time(activity.start_time_ms)?,
                    to_sql_time(activity.end_time_ms)?,
                    activity.has_position_data as i32,
                ],
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    pub fn insert_laps(&mut self, activity_id: &str, laps: &[LapBoundary]) -> Result<(), StoreError> {
        self.insert_rows(
            "INSERT OR REPLACE INTO laps (activity_id, start_time_ms) VALUES (?1, ?2)",
            laps,
            |stmt, lap| {
                stmt.execute(params![activity_id, to_sql_time(lap.start_time_ms)?])
                    .map(|_| ())
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))
            },
        )
    }

    pub fn insert_coordinates(
        &mut self,
        activity_id: &str,
        coordinates: &[Coordinate],
    ) -> Result<(), StoreError> {
        self.insert_rows(
            "INSERT OR REPLACE INTO coordinates (activity_id, time_ms, latitude, longitude, altitude)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            coordinates,
            |stmt, c| {
                stmt.execute(params![
                    activity_id,
                    to_sql_time(c.time_ms)?,
                    c.latitude,
                    c.longitude,
                    c.altitude_meters,
                ])
                .map(|_| ())
                .map_err(|e| StoreError::QueryFailed(e.to_string()))
            },
        )
    }

    pub fn insert_distances(
        &mut self,
        activity_id: &str,
        distances: &[TimeDistancePair],
    ) -> Result<(), StoreError> {
        self.insert_rows(
            "INSERT OR REPLACE INTO distances (activity_id, time_ms, distance_meters)
             VALUES (?1, ?2, ?3)",
            distances,
            |stmt, d| {
                stmt.execute(params![activity_id, to_sql_time(d.time_ms)?, d.distance_meters])
                    .map(|_| ())
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))
            },
        )
    }

    pub fn insert_sensor_readings(
        &mut self,
        activity_id: &str,
        kind: SensorKind,
        readings: &[SensorReading],
    ) -> Result<(), StoreError> {
        self.insert_rows(
            "INSERT INTO sensor_readings (activity_id, sensor_type, time_ms, values_json)
             VALUES (?1, ?2, ?3, ?4)",
            readings,
            |stmt, r| {
                let values_json = serde_json::to_string(&r.values)
                    .map_err(|e| StoreError::SerializationError(e.to_string()))?;
                stmt.execute(params![
                    activity_id,
                    kind.as_str(),
                    to_sql_time(r.time_ms)?,
                    values_json,
                ])
                .map(|_| ())
                .map_err(|e| StoreError::QueryFailed(e.to_string()))
            },
        )
    }

    /// Store a computed attribute, replacing any previous value.
    pub fn set_attribute(
        &self,
        activity_id: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<(), StoreError> {
        let value_json = serde_json::to_string(&value)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO activity_attributes (activity_id, name, value_json)
                 VALUES (?1, ?2, ?3)",
                params![activity_id, name, value_json],
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Run one prepared insert per row inside a single transaction.
    fn insert_rows<T, F>(&mut self, sql: &str, rows: &[T], mut insert: F) -> Result<(), StoreError>
    where
        F: FnMut(&mut rusqlite::Statement<'_>, &T) -> Result<(), StoreError>,
    {
        if rows.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(sql)
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

            for row in rows {
                insert(&mut stmt, row)?;
            }
        }

        tx.commit()
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    fn activity_attributes(
        &self,
        activity_id: &str,
    ) -> Result<BTreeMap<String, AttributeValue>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value_json FROM activity_attributes WHERE activity_id = ?1")
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![activity_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut attributes = BTreeMap::new();
        for row in rows {
            let (name, value_json) = row.map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            attributes.insert(name, parse_attribute(&value_json)?);
        }

        Ok(attributes)
    }
}

impl ActivityStore for SqliteStore {
    fn retrieve_activity(&self, activity_id: &str) -> Result<Option<ActivityRecord>, StoreError> {
        let result = self.conn.query_row(
            "SELECT id, name, activity_type, start_time_ms, end_time_ms, has_position_data
             FROM activities WHERE id = ?1",
            params![activity_id],
            |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    activity_type: row.get(2)?,
                    start_time_ms: row.get(3)?,
                    end_time_ms: row.get(4)?,
                    has_position_data: row.get(5)?,
                })
            },
        );

        match result {
            Ok(row) => Ok(Some(row.into_record()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::QueryFailed(e.to_string())),
        }
    }

    fn retrieve_laps(&self, activity_id: &str) -> Result<Vec<LapBoundary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT start_time_ms FROM laps WHERE activity_id = ?1 ORDER BY start_time_ms")
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![activity_id], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut laps = Vec::new();
        for row in rows {
            let start = row.map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            laps.push(LapBoundary::new(from_sql_time(start)?));
        }

        Ok(laps)
    }

    fn retrieve_sensor_readings_of_type(
        &self,
        activity_id: &str,
        kind: SensorKind,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT time_ms, values_json FROM sensor_readings
                 WHERE activity_id = ?1 AND sensor_type = ?2 ORDER BY time_ms, id",
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![activity_id, kind.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut readings = Vec::new();
        for row in rows {
            let (time_ms, values_json) = row.map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            let values: BTreeMap<String, f64> = serde_json::from_str(&values_json)
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            readings.push(SensorReading {
                time_ms: from_sql_time(time_ms)?,
                values,
            });
        }

        Ok(readings)
    }

    fn retrieve_activity_coordinates(
        &self,
        activity_id: &str,
    ) -> Result<Vec<Coordinate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT time_ms, latitude, longitude, altitude FROM coordinates
                 WHERE activity_id = ?1 ORDER BY time_ms",
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![activity_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut coordinates = Vec::new();
        for row in rows {
            let (time_ms, lat, lon, alt) = row.map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            coordinates.push(Coordinate::new(lat, lon, alt, from_sql_time(time_ms)?));
        }

        Ok(coordinates)
    }

    fn retrieve_activity_distances(
        &self,
        activity_id: &str,
    ) -> Result<Vec<TimeDistancePair>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT time_ms, distance_meters FROM distances
                 WHERE activity_id = ?1 ORDER BY time_ms",
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![activity_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut distances = Vec::new();
        for row in rows {
            let (time_ms, meters) = row.map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            distances.push(TimeDistancePair::new(from_sql_time(time_ms)?, meters));
        }

        Ok(distances)
    }

    fn retrieve_activity_attribute(
        &self,
        activity_id: &str,
        name: &str,
    ) -> Result<Option<AttributeValue>, StoreError> {
        let result: SqliteResult<String> = self.conn.query_row(
            "SELECT value_json FROM activity_attributes WHERE activity_id = ?1 AND name = ?2",
            params![activity_id, name],
            |row| row.get(0),
        );

        match result {
            Ok(value_json) => Ok(Some(parse_attribute(&value_json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::QueryFailed(e.to_string())),
        }
    }

    fn retrieve_activity_summaries(&self) -> Result<Vec<ActivitySummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, activity_type, start_time_ms, end_time_ms, has_position_data
                 FROM activities ORDER BY start_time_ms, id",
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    activity_type: row.get(2)?,
                    start_time_ms: row.get(3)?,
                    end_time_ms: row.get(4)?,
                    has_position_data: row.get(5)?,
                })
            })
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let mut summaries = Vec::new();
        for row in rows {
            let record = row
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?
                .into_record()?;
            let attributes = self.activity_attributes(&record.id)?;
            summaries.push(ActivitySummary {
                start_time: (record.start_time_ms / 1000) as i64,
                id: record.id,
                name: record.name,
                activity_type: record.activity_type,
                attributes,
            });
        }

        Ok(summaries)
    }
}

/// Intermediate struct for reading activity rows from database.
struct ActivityRow {
    id: String,
    name: String,
    activity_type: String,
    start_time_ms: i64,
    end_time_ms: i64,
    has_position_data: i32,
}

impl ActivityRow {
    fn into_record(self) -> Result<ActivityRecord, StoreError> {
        Ok(ActivityRecord {
            id: self.id,
            name: self.name,
            activity_type: self.activity_type,
            start_time_ms: from_sql_time(self.start_time_ms)?,
            end_time_ms: from_sql_time(self.end_time_ms)?,
            has_position_data: self.has_position_data != 0,
        })
    }
}

fn parse_attribute(value_json: &str) -> Result<AttributeValue, StoreError> {
    serde_json::from_str(value_json).map_err(|e| StoreError::DeserializationError(e.to_string()))
}

fn to_sql_time(time_ms: u64) -> Result<i64, StoreError> {
    i64::try_from(time_ms)
        .map_err(|_| StoreError::SerializationError(format!("timestamp out of range: {}", time_ms)))
}

fn from_sql_time(time_ms: i64) -> Result<u64, StoreError> {
    u64::try_from(time_ms)
        .map_err(|_| StoreError::DeserializationError(format!("negative timestamp: {}", time_ms)))
}
