// Classifier model abstraction
// The spectral classifier delegates to a SpectralModel so the retrain-on-insert
// nearest-neighbour default can be swapped for an incremental strategy

use thiserror::Error;

use crate::classifier::types::{ClassifierExample, Prediction, SpectralFeatures};

/// Errors that can occur during classification and learning
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier has no examples yet")]
    Untrained,

    #[error("Malformed example: {0}")]
    MalformedExample(String),

    #[error("Knowledge store error: {0}")]
    Store(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A model trained on the full example list
pub trait SpectralModel: Send {
    /// Rebuild the model from every known example, oldest first
    fn fit(&mut self, examples: &[ClassifierExample]);

    /// Label for `features`, or `Untrained` when fitted on nothing
    fn predict(&self, features: &SpectralFeatures) -> Result<Prediction, ClassifierError>;

    /// Whether `fit` has seen at least one example
    fn is_trained(&self) -> bool;
}
