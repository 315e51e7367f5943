// K-nearest-neighbour spectral model
// Majority vote among the k closest examples in (low, mid, high) space

use std::collections::HashMap;

use crate::classifier::backend::{ClassifierError, SpectralModel};
use crate::classifier::types::{ClassifierExample, Prediction, SpectralFeatures};

/// Nearest-neighbour model. `k = 1` reproduces plain nearest-example lookup.
#[derive(Debug, Clone)]
pub struct KnnModel {
    k: usize,
    examples: Vec<ClassifierExample>,
}

impl KnnModel {
    /// k is clamped to at least 1
    pub fn new(k: usize) -> Self {
        KnnModel {
            k: k.max(1),
            examples: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Default for KnnModel {
    fn default() -> Self {
        KnnModel::new(1)
    }
}

impl SpectralModel for KnnModel {
    fn fit(&mut self, examples: &[ClassifierExample]) {
        self.examples = examples.to_vec();
    }

    fn predict(&self, features: &SpectralFeatures) -> Result<Prediction, ClassifierError> {
        if self.examples.is_empty() {
            return Err(ClassifierError::Untrained);
        }

        // Stable sort keeps insertion order among equal distances
        let mut distances: Vec<(usize, f64)> = self
            .examples
            .iter()
            .enumerate()
            .map(|(i, example)| (i, features.distance_to(&example.features)))
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));

        let nearest = &distances[..self.k.min(distances.len())];

        // Votes per label: (count, closest distance, rank of first appearance)
        let mut votes: HashMap<&str, (usize, f64, usize)> = HashMap::new();
        for (rank, &(i, distance)) in nearest.iter().enumerate() {
            let entry = votes
                .entry(self.examples[i].label.as_str())
                .or_insert((0, distance, rank));
            entry.0 += 1;
        }

        // Most votes; ties go to the label whose best neighbour ranked first
        let (label, (_, distance, _)) = votes
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .2.cmp(&a.1 .2)))
            .ok_or(ClassifierError::Untrained)?;

        Ok(Prediction {
            label: label.to_string(),
            distance,
        })
    }

    fn is_trained(&self) -> bool {
        !self.examples.is_empty()
    }
}
