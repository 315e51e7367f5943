// Measurement timeline
// Sorted timestamps, the sample series and local-time day/night bucketing

pub mod clock;
pub mod index;
pub mod series;

pub use clock::{DayPeriod, DayWindow, LocalZone};
pub use index::TimeIndex;
pub use series::{BandLevels, MeasurementSeries, Sample, SeriesError};
