//! Database schema definitions for the activity store.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Activities table
CREATE TABLE IF NOT EXISTS activities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    activity_type TEXT NOT NULL,
    start_time_ms INTEGER NOT NULL,
    end_time_ms INTEGER NOT NULL,
    has_position_data INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_activities_type ON activities(activity_type);

-- Lap boundaries (starts of laps after the first)
CREATE TABLE IF NOT EXISTS laps (
    activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    start_time_ms INTEGER NOT NULL,
    PRIMARY KEY (activity_id, start_time_ms)
);

-- Position samples
CREATE TABLE IF NOT EXISTS coordinates (
    activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    time_ms INTEGER NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    altitude REAL NOT NULL,
    PRIMARY KEY (activity_id, time_ms)
);

-- Cumulative distance, one row per position sample after the first
CREATE TABLE IF NOT EXISTS distances (
    activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    time_ms INTEGER NOT NULL,
    distance_meters REAL NOT NULL,
    PRIMARY KEY (activity_id, time_ms)
);

-- Auxiliary sensor readings, named values stored as JSON
CREATE TABLE IF NOT EXISTS sensor_readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    sensor_type TEXT NOT NULL,
    time_ms INTEGER NOT NULL,
    values_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sensor_readings_activity_type
    ON sensor_readings(activity_id, sensor_type, time_ms);

-- Computed activity attributes (summary values, lap aggregates)
CREATE TABLE IF NOT EXISTS activity_attributes (
    activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY (activity_id, name)
);
"#;

/// Schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;
