// Spectral source classifier
// Learns operator-labelled spectra and labels new ones by nearest neighbour

pub mod backend;
pub mod features;
pub mod knn;
pub mod store;
pub mod types;

pub use backend::{ClassifierError, SpectralModel};
pub use features::{energetic_sum, extract_features, parse_band_frequency, BandLimits};
pub use knn::KnnModel;
pub use store::{KnowledgeStore, StoreReport};
pub use types::{BandRegion, ClassifierExample, Prediction, SourceCategory, SpectralFeatures};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::{LogSink, TraceBuilder, TraceSink};
use crate::timeline::BandLevels;

/// Classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub low_limit_hz: f64,
    pub high_limit_hz: f64,

    /// Neighbours consulted per prediction
    pub neighbors: usize,

    /// Knowledge file; `None` uses the application data directory
    pub knowledge_file: Option<PathBuf>,
}

impl ClassifierConfig {
    pub fn limits(&self) -> BandLimits {
        BandLimits {
            low_limit_hz: self.low_limit_hz,
            high_limit_hz: self.high_limit_hz,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let limits = BandLimits::default();
        ClassifierConfig {
            low_limit_hz: limits.low_limit_hz,
            high_limit_hz: limits.high_limit_hz,
            neighbors: 1,
            knowledge_file: None,
        }
    }
}

/// Result of `SpectralClassifier::analyze`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumAnalysis {
    pub features: SpectralFeatures,
    pub dominant: BandRegion,

    /// `None` while no example has been learned
    pub prediction: Option<Prediction>,

    /// One-line summary for the operator
    pub description: String,
}

pub struct SpectralClassifier {
    limits: BandLimits,
    store: Option<KnowledgeStore>,
    examples: Vec<ClassifierExample>,
    model: Box<dyn SpectralModel>,
    sink: Arc<dyn TraceSink>,
}

impl SpectralClassifier {
    /// Classifier with no backing file; learned examples live in memory only
    pub fn in_memory(config: &ClassifierConfig) -> Self {
        SpectralClassifier {
            limits: config.limits(),
            store: None,
            examples: Vec::new(),
            model: Box::new(KnnModel::new(config.neighbors)),
            sink: Arc::new(LogSink),
        }
    }

    /// Load the examples of `store` and train on them
    pub fn open(config: &ClassifierConfig, store: KnowledgeStore) -> Result<(Self, StoreReport), ClassifierError> {
        let (examples, report) = store.load()?;

        if report.skipped > 0 {
            log::warn!(
                "Knowledge store {}: {} malformed rows skipped",
                store.path().display(),
                report.skipped
            );
        }
        log::info!(
            "Knowledge store {}: {} examples",
            store.path().display(),
            report.loaded
        );

        let mut classifier = Self::in_memory(config);
        classifier.store = Some(store);
        classifier.examples = examples;
        classifier.model.fit(&classifier.examples);

        Ok((classifier, report))
    }

    /// Replace the model and fit it on the current examples
    pub fn with_model(mut self, mut model: Box<dyn SpectralModel>) -> Self {
        model.fit(&self.examples);
        self.model = model;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn limits(&self) -> &BandLimits {
        &self.limits
    }

    pub fn examples(&self) -> &[ClassifierExample] {
        &self.examples
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_trained()
    }

    pub fn store(&self) -> Option<&KnowledgeStore> {
        self.store.as_ref()
    }

    pub fn features(&self, bands: &BandLevels) -> Result<SpectralFeatures, ClassifierError> {
        extract_features(bands, &self.limits)
    }

    pub fn predict(&self, bands: &BandLevels) -> Result<Prediction, ClassifierError> {
        let features = self.features(bands)?;
        self.model.predict(&features)
    }

    /// Record an operator-confirmed label.
    ///
    /// The example is persisted before it joins the model; on any error the
    /// classifier is left unchanged.
    pub fn learn(&mut self, bands: &BandLevels, label: &str) -> Result<ClassifierExample, ClassifierError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ClassifierError::MalformedExample("empty label".to_string()));
        }

        let example = ClassifierExample::new(label, self.features(bands)?);

        if let Some(store) = &self.store {
            store.append(&example)?;
        }

        self.examples.push(example.clone());
        self.model.fit(&self.examples);

        self.sink.emit(TraceBuilder::stage("classifier").with_data(
            1.0,
            format!("Learned '{}'", example.label),
            serde_json::json!({
                "label": example.label,
                "low": example.features.low,
                "mid": example.features.mid,
                "high": example.features.high,
                "examples": self.examples.len(),
            }),
        ));

        Ok(example)
    }

    /// Features, dominant region and (when trained) the predicted label
    pub fn analyze(&self, bands: &BandLevels) -> Result<SpectrumAnalysis, ClassifierError> {
        let features = self.features(bands)?;
        let dominant = features.dominant_region();

        let prediction = match self.model.predict(&features) {
            Ok(prediction) => Some(prediction),
            Err(ClassifierError::Untrained) => None,
            Err(e) => return Err(e),
        };

        let mut description = format!(
            "[B:{:.1}|M:{:.1}|A:{:.1}] ({})",
            features.low,
            features.mid,
            features.high,
            dominant.display_name()
        );
        if let Some(prediction) = &prediction {
            description.push_str(&format!(" -> {}", prediction.label));
        }

        Ok(SpectrumAnalysis {
            features,
            dominant,
            prediction,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MemorySink;
    use std::fs;
    use tempfile::TempDir;

    fn low_heavy() -> BandLevels {
        [("50Hz", 60.0), ("100Hz", 58.0), ("1000Hz", 40.0), ("4000Hz", 30.0)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn high_heavy() -> BandLevels {
        [("50Hz", 30.0), ("1000Hz", 40.0), ("4000Hz", 62.0), ("8000Hz", 60.0)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_predict_untrained() {
        let classifier = SpectralClassifier::in_memory(&ClassifierConfig::default());
        assert!(matches!(classifier.predict(&low_heavy()), Err(ClassifierError::Untrained)));
    }

    #[test]
    fn test_learn_then_predict() {
        let mut classifier = SpectralClassifier::in_memory(&ClassifierConfig::default());
        classifier.learn(&low_heavy(), "Source + (PAC)").unwrap();
        classifier.learn(&high_heavy(), "Autre (Exclusion)").unwrap();

        assert_eq!(classifier.predict(&low_heavy()).unwrap().label, "Source + (PAC)");
        assert_eq!(classifier.predict(&high_heavy()).unwrap().label, "Autre (Exclusion)");
    }

    #[test]
    fn test_learned_examples_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.csv");
        let config = ClassifierConfig::default();

        {
            let (mut classifier, report) = SpectralClassifier::open(&config, KnowledgeStore::new(path.clone())).unwrap();
            assert_eq!(report.loaded, 0);
            classifier.learn(&low_heavy(), "Source Std").unwrap();
        }

        let (classifier, report) = SpectralClassifier::open(&config, KnowledgeStore::new(path)).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(classifier.is_trained());
        assert_eq!(classifier.predict(&high_heavy()).unwrap().label, "Source Std");
    }

    #[test]
    fn test_malformed_example_leaves_store_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.csv");
        let (mut classifier, _) =
            SpectralClassifier::open(&ClassifierConfig::default(), KnowledgeStore::new(path.clone())).unwrap();

        let bogus: BandLevels = [("dBA".to_string(), 50.0)].into_iter().collect();
        assert!(matches!(
            classifier.learn(&bogus, "A"),
            Err(ClassifierError::MalformedExample(_))
        ));
        assert!(matches!(
            classifier.learn(&low_heavy(), "  "),
            Err(ClassifierError::MalformedExample(_))
        ));

        assert!(classifier.examples().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_failure_rejects_example() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.csv");
        let (mut classifier, _) =
            SpectralClassifier::open(&ClassifierConfig::default(), KnowledgeStore::new(path.clone())).unwrap();

        // Make the store path unwritable by turning it into a directory
        fs::create_dir(&path).unwrap();

        assert!(classifier.learn(&low_heavy(), "A").is_err());
        assert!(classifier.examples().is_empty());
        assert!(!classifier.is_trained());
    }

    #[test]
    fn test_analyze_description() {
        let mut classifier = SpectralClassifier::in_memory(&ClassifierConfig::default());

        let analysis = classifier.analyze(&low_heavy()).unwrap();
        assert_eq!(analysis.dominant, BandRegion::Low);
        assert!(analysis.prediction.is_none());
        assert!(analysis.description.starts_with("[B:"));
        assert!(analysis.description.ends_with("(low)"));

        classifier.learn(&low_heavy(), "Source Std").unwrap();
        let analysis = classifier.analyze(&low_heavy()).unwrap();
        assert!(analysis.description.ends_with("(low) -> Source Std"));
    }

    #[test]
    fn test_learn_reports_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let mut classifier = SpectralClassifier::in_memory(&ClassifierConfig::default()).with_sink(sink.clone());

        classifier.learn(&low_heavy(), "Source Std").unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stage, "classifier");
        assert_eq!(entries[0].data.as_ref().unwrap()["examples"], 1);
    }

    #[test]
    fn test_custom_model() {
        let mut classifier = SpectralClassifier::in_memory(&ClassifierConfig::default())
            .with_model(Box::new(KnnModel::new(3)));
        classifier.learn(&low_heavy(), "A").unwrap();
        assert_eq!(classifier.predict(&high_heavy()).unwrap().label, "A");
    }
}
