//! Activity Export - fitness activity file export engine
//!
//! Aligns independently sampled sensor streams (position, heart rate,
//! cadence, power, accelerometer) against lap boundaries and writes TCX,
//! GPX, FIT or CSV files, either from a stored activity or from a live
//! coordinate stream.

pub mod export;
pub mod storage;

// Re-export commonly used types
pub use export::engine::{ExportEngine, LiveActivity, LiveExporter};
pub use export::types::{ExportError, ExportFormat};
pub use storage::config::ExportSettings;
pub use storage::{ActivityStore, MemoryStore, SqliteStore};
