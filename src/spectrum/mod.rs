// Spectral statistics module

pub mod window;

pub use window::{SpectralWindowAggregator, SpectralWindowResult, DEFAULT_WINDOW_SECS};
