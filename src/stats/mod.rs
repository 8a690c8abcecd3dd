//! Timing accumulation and the CSV tables built from it.

mod csv;
mod reporter;
mod summary;
mod times;

pub use csv::CsvWriter;
pub use reporter::{DetailedRow, StatsReporter, utilization_pct};
pub use summary::RunSummary;
pub use times::{LayerTimes, PhaseTimes};
