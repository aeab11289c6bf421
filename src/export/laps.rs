//! Lap segmentation and per-lap aggregates.

use crate::export::types::{
    attribute, AttributeValue, Coordinate, ExportError, LapBoundary, TimeDistancePair,
};

/// A closed-open `[start_ms, end_ms)` window of an activity.
///
/// The final window also accepts samples stamped exactly at the activity end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapWindow {
    /// 1-based lap number
    pub number: u16,
    pub start_ms: u64,
    pub end_ms: u64,
    pub is_last: bool,
}

impl LapWindow {
    /// Whether a timestamp belongs to this lap.
    pub fn contains(&self, time_ms: u64) -> bool {
        time_ms >= self.start_ms
            && (time_ms < self.end_ms || (self.is_last && time_ms == self.end_ms))
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Partition `[start_ms, end_ms)` into lap windows.
///
/// Each boundary starts a new lap, so `n` boundaries produce `n + 1`
/// windows. Boundaries must be strictly ascending and lie within the
/// activity interval.
pub fn segment_laps(
    start_ms: u64,
    end_ms: u64,
    boundaries: &[LapBoundary],
) -> Result<Vec<LapWindow>, ExportError> {
    if end_ms < start_ms {
        return Err(ExportError::MalformedSource(format!(
            "activity ends ({}) before it starts ({})",
            end_ms, start_ms
        )));
    }

    let mut windows = Vec::with_capacity(boundaries.len() + 1);
    let mut lap_start = start_ms;

    for boundary in boundaries {
        let t = boundary.start_time_ms;
        if t < start_ms || t > end_ms {
            return Err(ExportError::MalformedSource(format!(
                "lap boundary {} outside activity [{}, {}]",
                t, start_ms, end_ms
            )));
        }
        if !windows.is_empty() && t <= lap_start {
            return Err(ExportError::MalformedSource(format!(
                "lap boundaries not ascending at {}",
                t
            )));
        }
        windows.push(LapWindow {
            number: lap_number(windows.len())?,
            start_ms: lap_start,
            end_ms: t,
            is_last: false,
        });
        lap_start = t;
    }

    windows.push(LapWindow {
        number: lap_number(windows.len())?,
        start_ms: lap_start,
        end_ms,
        is_last: true,
    });

    Ok(windows)
}

fn lap_number(index: usize) -> Result<u16, ExportError> {
    u16::try_from(index + 1)
        .map_err(|_| ExportError::MalformedSource(format!("too many laps: {}", index + 1)))
}

/// Aggregate metrics written ahead of a lap's trackpoints.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LapAggregates {
    pub total_time_seconds: f64,
    pub distance_meters: f64,
    /// `None` when no calorie figure was computed for the lap
    pub calories: Option<u16>,
}

impl LapAggregates {
    /// Resolve a lap's aggregates.
    ///
    /// Stored attributes win; time and distance fall back to values derived
    /// from the window and the cumulative distance sequence.
    pub fn resolve<F>(
        window: &LapWindow,
        coordinates: &[Coordinate],
        distances: &[TimeDistancePair],
        mut lookup: F,
    ) -> Result<Self, ExportError>
    where
        F: FnMut(&str) -> Result<Option<AttributeValue>, ExportError>,
    {
        let stored = |value: Option<AttributeValue>| value.and_then(|v| v.as_f64());

        let total_time_seconds = stored(lookup(&lap_attribute(attribute::LAP_TIME, window))?)
            .unwrap_or(window.duration_ms() as f64 / 1000.0);
        let distance_meters = match stored(lookup(&lap_attribute(attribute::LAP_DISTANCE, window))?)
        {
            Some(d) => d,
            None => derived_distance(window, coordinates, distances),
        };
        let calories = stored(lookup(&lap_attribute(attribute::LAP_CALORIES, window))?)
            .map(|c| c.round().clamp(0.0, u16::MAX as f64) as u16);

        Ok(Self {
            total_time_seconds,
            distance_meters,
            calories,
        })
    }

    /// Aggregates for a buffered live lap: duration from the first to the
    /// last fix, distance from great-circle segment sums.
    pub fn from_coordinates(coordinates: &[Coordinate]) -> Self {
        let total_time_seconds = match (coordinates.first(), coordinates.last()) {
            (Some(first), Some(last)) => (last.time_ms - first.time_ms) as f64 / 1000.0,
            _ => 0.0,
        };
        let distance_meters = coordinates
            .windows(2)
            .map(|pair| haversine_distance(&pair[0], &pair[1]))
            .sum();

        Self {
            total_time_seconds,
            distance_meters,
            calories: None,
        }
    }
}

fn lap_attribute(prefix: &str, window: &LapWindow) -> String {
    format!("{}{}", prefix, window.number)
}

/// Cumulative distance gained inside the window.
///
/// `distances[i]` belongs to `coordinates[i + 1]`; the first coordinate sits
/// at distance zero.
fn derived_distance(
    window: &LapWindow,
    coordinates: &[Coordinate],
    distances: &[TimeDistancePair],
) -> f64 {
    let cumulative_at = |index: usize| -> f64 {
        if index == 0 {
            0.0
        } else {
            distances
                .get(index - 1)
                .map(|d| d.distance_meters)
                .unwrap_or(0.0)
        }
    };

    let first = coordinates.iter().position(|c| window.contains(c.time_ms));
    let last = coordinates.iter().rposition(|c| window.contains(c.time_ms));

    match (first, last) {
        // Distance covered since the previous lap's last fix counts towards this lap.
        (Some(first), Some(last)) => cumulative_at(last) - cumulative_at(first.saturating_sub(1)),
        _ => 0.0,
    }
}

/// Great-circle distance between two fixes in meters.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    const EARTH_RADIUS: f64 = 6_371_000.0; // meters

    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS * c
}
