//! Store collaborator consumed by the export engine.
//!
//! [`ActivityStore`] is the read-side contract; every list it returns is
//! sorted ascending by timestamp. [`MemoryStore`] backs live exports and
//! tests, [`crate::storage::SqliteStore`] the command-line tool.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::export::types::{
    ActivityRecord, ActivitySummary, AttributeValue, Coordinate, LapBoundary, SensorKind,
    SensorReading, TimeDistancePair,
};

/// Read access to stored activities.
pub trait ActivityStore {
    /// Activity metadata, `None` when the id is unknown.
    fn retrieve_activity(&self, activity_id: &str) -> Result<Option<ActivityRecord>, StoreError>;

    /// Lap boundaries after the first lap, ascending.
    fn retrieve_laps(&self, activity_id: &str) -> Result<Vec<LapBoundary>, StoreError>;

    fn retrieve_sensor_readings_of_type(
        &self,
        activity_id: &str,
        kind: SensorKind,
    ) -> Result<Vec<SensorReading>, StoreError>;

    fn retrieve_activity_coordinates(&self, activity_id: &str)
        -> Result<Vec<Coordinate>, StoreError>;

    fn retrieve_activity_distances(
        &self,
        activity_id: &str,
    ) -> Result<Vec<TimeDistancePair>, StoreError>;

    /// A single computed attribute. Absence is not an error.
    fn retrieve_activity_attribute(
        &self,
        activity_id: &str,
        name: &str,
    ) -> Result<Option<AttributeValue>, StoreError>;

    /// Every activity with its attributes, oldest first.
    fn retrieve_activity_summaries(&self) -> Result<Vec<ActivitySummary>, StoreError>;

    /// Start and end of an activity in unix milliseconds.
    fn retrieve_activity_start_and_end_time(
        &self,
        activity_id: &str,
    ) -> Result<Option<(u64, u64)>, StoreError> {
        Ok(self
            .retrieve_activity(activity_id)?
            .map(|a| (a.start_time_ms, a.end_time_ms)))
    }
}

/// Everything stored for one activity.
#[derive(Debug, Clone)]
struct StoredActivity {
    record: ActivityRecord,
    laps: Vec<LapBoundary>,
    coordinates: Vec<Coordinate>,
    distances: Vec<TimeDistancePair>,
    readings: BTreeMap<SensorKind, Vec<SensorReading>>,
    attributes: BTreeMap<String, AttributeValue>,
}

/// In-memory activity store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    activities: HashMap<String, StoredActivity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an activity, dropping any previous data for its id.
    pub fn insert_activity(&mut self, record: ActivityRecord) {
        self.activities.insert(
            record.id.clone(),
            StoredActivity {
                record,
                laps: Vec::new(),
                coordinates: Vec::new(),
                distances: Vec::new(),
                readings: BTreeMap::new(),
                attributes: BTreeMap::new(),
            },
        );
    }

    fn activity_mut(&mut self, activity_id: &str) -> Result<&mut StoredActivity, StoreError> {
        self.activities
            .get_mut(activity_id)
            .ok_or_else(|| StoreError::NotFound(activity_id.to_string()))
    }

    pub fn set_laps(&mut self, activity_id: &str, mut laps: Vec<LapBoundary>) -> Result<(), StoreError> {
        laps.sort_by_key(|l| l.start_time_ms);
        self.activity_mut(activity_id)?.laps = laps;
        Ok(())
    }

    pub fn set_coordinates(
        &mut self,
        activity_id: &str,
        mut coordinates: Vec<Coordinate>,
    ) -> Result<(), StoreError> {
        coordinates.sort_by_key(|c| c.time_ms);
        self.activity_mut(activity_id)?.coordinates = coordinates;
        Ok(())
    }

    pub fn set_distances(
        &mut self,
        activity_id: &str,
        mut distances: Vec<TimeDistancePair>,
    ) -> Result<(), StoreError> {
        distances.sort_by_key(|d| d.time_ms);
        self.activity_mut(activity_id)?.distances = distances;
        Ok(())
    }

    pub fn set_readings(
        &mut self,
        activity_id: &str,
        kind: SensorKind,
        mut readings: Vec<SensorReading>,
    ) -> Result<(), StoreError> {
        readings.sort_by_key(|r| r.time_ms);
        self.activity_mut(activity_id)?.readings.insert(kind, readings);
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        activity_id: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<(), StoreError> {
        self.activity_mut(activity_id)?
            .attributes
            .insert(name.to_string(), value);
        Ok(())
    }
}

impl ActivityStore for MemoryStore {
    fn retrieve_activity(&self, activity_id: &str) -> Result<Option<ActivityRecord>, StoreError> {
        Ok(self.activities.get(activity_id).map(|a| a.record.clone()))
    }

    fn retrieve_laps(&self, activity_id: &str) -> Result<Vec<LapBoundary>, StoreError> {
        Ok(self
            .activities
            .get(activity_id)
            .map(|a| a.laps.clone())
            .unwrap_or_default())
    }

    fn retrieve_sensor_readings_of_type(
        &self,
        activity_id: &str,
        kind: SensorKind,
    ) -> Result<Vec<SensorReading>, StoreError> {
        Ok(self
            .activities
            .get(activity_id)
            .and_then(|a| a.readings.get(&kind).cloned())
            .unwrap_or_default())
    }

    fn retrieve_activity_coordinates(
        &self,
        activity_id: &str,
    ) -> Result<Vec<Coordinate>, StoreError> {
        Ok(self
            .activities
            .get(activity_id)
            .map(|a| a.coordinates.clone())
            .unwrap_or_default())
    }

    fn retrieve_activity_distances(
        &self,
        activity_id: &str,
    ) -> Result<Vec<TimeDistancePair>, StoreError> {
        Ok(self
            .activities
            .get(activity_id)
            .map(|a| a.distances.clone())
            .unwrap_or_default())
    }

    fn retrieve_activity_attribute(
        &self,
        activity_id: &str,
        name: &str,
    ) -> Result<Option<AttributeValue>, StoreError> {
        Ok(self
            .activities
            .get(activity_id)
            .and_then(|a| a.attributes.get(name).copied()))
    }

    fn retrieve_activity_summaries(&self) -> Result<Vec<ActivitySummary>, StoreError> {
        let mut summaries: Vec<ActivitySummary> = self
            .activities
            .values()
            .map(|a| ActivitySummary {
                id: a.record.id.clone(),
                name: a.record.name.clone(),
                activity_type: a.record.activity_type.clone(),
                start_time: (a.record.start_time_ms / 1000) as i64,
                attributes: a.attributes.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
