// Measurement files module
// Logger export loading, project folders and operator zone notes

pub mod annotation;
pub mod loader;
pub mod project;

pub use annotation::{
    annotate_zone, delete_marker, format_note, markers, relabel_marker, AnnotationError,
    ZoneMarker, DEFAULT_ZONE_SECS,
};
pub use loader::{
    default_band_labels, parse_decimal, ColumnMap, LoadError, MeasurementFile,
    DEFAULT_BAND_LABELS,
};
pub use project::{discover, ProjectFiles, WORKING_COPY_SUFFIX};
