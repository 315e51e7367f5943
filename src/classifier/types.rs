// Classifier types
// Spectral feature triple, labelled examples, predictions and the source
// categories offered to the operator

use serde::{Deserialize, Serialize};

/// Operator-facing source categories.
///
/// Labels are free text for the classifier; these are the ones the
/// annotation tools propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceCategory {
    /// Source under investigation at full load (heat pump running)
    SourcePlus,

    /// Source under investigation, normal operation
    SourceStd,

    /// Source under investigation, reduced operation
    SourceMinus,

    /// Quiet background, no identifiable source
    Residual,

    /// Anything to exclude from the assessment (traffic, voices, animals)
    Other,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 5] = [
        SourceCategory::SourcePlus,
        SourceCategory::SourceStd,
        SourceCategory::SourceMinus,
        SourceCategory::Residual,
        SourceCategory::Other,
    ];

    /// Parse a stored label. Accepts the display labels and snake_case names.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "Source + (PAC)" | "source_plus" => Some(SourceCategory::SourcePlus),
            "Source Std" | "source_std" => Some(SourceCategory::SourceStd),
            "Source -" | "source_minus" => Some(SourceCategory::SourceMinus),
            "Résiduel (Calme)" | "Residual" | "residual" => Some(SourceCategory::Residual),
            "Autre (Exclusion)" | "Other" | "other" => Some(SourceCategory::Other),
            _ => None,
        }
    }

    /// Label written into notes and the knowledge store
    pub fn label(&self) -> &'static str {
        match self {
            SourceCategory::SourcePlus => "Source + (PAC)",
            SourceCategory::SourceStd => "Source Std",
            SourceCategory::SourceMinus => "Source -",
            SourceCategory::Residual => "Résiduel (Calme)",
            SourceCategory::Other => "Autre (Exclusion)",
        }
    }

    /// Whether zones of this category belong to the source being assessed
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            SourceCategory::SourcePlus | SourceCategory::SourceStd | SourceCategory::SourceMinus
        )
    }
}

/// Energetic sums of the low, mid and high partitions of a spectrum (dB)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpectralFeatures {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl SpectralFeatures {
    pub fn new(low: f64, mid: f64, high: f64) -> Self {
        SpectralFeatures { low, mid, high }
    }

    /// Euclidean distance in (low, mid, high) space
    pub fn distance_to(&self, other: &SpectralFeatures) -> f64 {
        let d_low = self.low - other.low;
        let d_mid = self.mid - other.mid;
        let d_high = self.high - other.high;
        (d_low * d_low + d_mid * d_mid + d_high * d_high).sqrt()
    }

    /// Partition carrying the most energy. Ties go to low, then high.
    pub fn dominant_region(&self) -> BandRegion {
        let max = self.low.max(self.mid).max(self.high);
        if self.low == max {
            BandRegion::Low
        } else if self.high == max {
            BandRegion::High
        } else {
            BandRegion::Mid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandRegion {
    Low,
    Mid,
    High,
}

impl BandRegion {
    pub fn display_name(&self) -> &'static str {
        match self {
            BandRegion::Low => "low",
            BandRegion::Mid => "mid",
            BandRegion::High => "high",
        }
    }
}

/// One operator-confirmed example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierExample {
    pub label: String,
    pub features: SpectralFeatures,
}

impl ClassifierExample {
    pub fn new(label: impl Into<String>, features: SpectralFeatures) -> Self {
        ClassifierExample {
            label: label.into(),
            features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,

    /// Distance to the closest example backing the label
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_label_round_trip() {
        for category in SourceCategory::ALL {
            assert_eq!(SourceCategory::from_label(category.label()), Some(category));
        }
        assert_eq!(SourceCategory::from_label("source_std"), Some(SourceCategory::SourceStd));
        assert_eq!(SourceCategory::from_label("Tractor"), None);
    }

    #[test]
    fn test_source_categories() {
        assert!(SourceCategory::SourcePlus.is_source());
        assert!(!SourceCategory::Residual.is_source());
        assert!(!SourceCategory::Other.is_source());
    }

    #[test]
    fn test_feature_distance() {
        let a = SpectralFeatures::new(0.0, 0.0, 0.0);
        let b = SpectralFeatures::new(3.0, 4.0, 0.0);

        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.distance_to(&b), 0.0);
    }

    #[test]
    fn test_dominant_region_ties() {
        assert_eq!(SpectralFeatures::new(50.0, 50.0, 50.0).dominant_region(), BandRegion::Low);
        assert_eq!(SpectralFeatures::new(40.0, 50.0, 50.0).dominant_region(), BandRegion::High);
        assert_eq!(SpectralFeatures::new(40.0, 55.0, 50.0).dominant_region(), BandRegion::Mid);
    }
}
