//! Nearest-timestamp alignment of auxiliary sensor streams.
//!
//! Each auxiliary stream gets its own [`SensorCursor`] for the duration of
//! one export. Primary timestamps must be queried in ascending order; the
//! cursor only ever moves forward, so aligning `n` primary samples against
//! `m` readings costs O(n + m) in total.

use crate::export::types::SensorReading;

/// Readings further than this from the primary timestamp are not used.
pub const ALIGNMENT_TOLERANCE_MS: u64 = 3000;

/// The reading nearest to a primary timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestReading<'a> {
    pub reading: &'a SensorReading,
    /// Absolute difference between the reading and the primary timestamp
    pub offset_ms: u64,
}

impl NearestReading<'_> {
    /// Whether the reading is close enough to stand in for the primary sample.
    pub fn within_tolerance(&self) -> bool {
        self.offset_ms < ALIGNMENT_TOLERANCE_MS
    }
}

/// Forward-only cursor over one ascending sensor stream.
#[derive(Debug, Clone)]
pub struct SensorCursor<'a> {
    readings: &'a [SensorReading],
    /// Index of the first reading not earlier than the last queried time
    position: usize,
}

impl<'a> SensorCursor<'a> {
    pub fn new(readings: &'a [SensorReading]) -> Self {
        Self {
            readings,
            position: 0,
        }
    }

    /// Current cursor index into the stream.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Find the reading nearest to `time_ms`.
    ///
    /// Advances past every reading earlier than `time_ms`, then compares the
    /// first reading at or after `time_ms` with the one just before it. The
    /// earlier reading wins only when it is strictly closer.
    ///
    /// A timestamp outside the stream has no match: past the last reading,
    /// or before the first one unless it lands on it exactly.
    pub fn nearest(&mut self, time_ms: u64) -> Option<NearestReading<'a>> {
        while self.position < self.readings.len() && self.readings[self.position].time_ms < time_ms
        {
            self.position += 1;
        }

        let after = self.readings.get(self.position).map(|r| NearestReading {
            reading: r,
            offset_ms: r.time_ms - time_ms,
        })?;
        let before = self
            .position
            .checked_sub(1)
            .and_then(|i| self.readings.get(i))
            .map(|r| NearestReading {
                reading: r,
                offset_ms: time_ms - r.time_ms,
            });

        match before {
            Some(b) if b.offset_ms < after.offset_ms => Some(b),
            Some(_) => Some(after),
            None if after.offset_ms == 0 => Some(after),
            None => None,
        }
    }

    /// Nearest reading, only if it lies within [`ALIGNMENT_TOLERANCE_MS`].
    pub fn aligned(&mut self, time_ms: u64) -> Option<&'a SensorReading> {
        self.nearest(time_ms)
            .filter(NearestReading::within_tolerance)
            .map(|n| n.reading)
    }

    /// Aligned value stored under `key`, if both the reading and the key exist.
    pub fn aligned_value(&mut self, time_ms: u64, key: &str) -> Option<f64> {
        self.aligned(time_ms).and_then(|r| r.value(key))
    }
}
