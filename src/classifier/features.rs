// Spectral feature extraction
// Collapses a third-octave spectrum into low/mid/high energetic sums

use serde::{Deserialize, Serialize};

use crate::classifier::backend::ClassifierError;
use crate::classifier::types::SpectralFeatures;
use crate::timeline::BandLevels;

/// Partition limits in Hz: `< low_limit_hz` is low, `> high_limit_hz` is high
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandLimits {
    pub low_limit_hz: f64,
    pub high_limit_hz: f64,
}

impl Default for BandLimits {
    fn default() -> Self {
        BandLimits {
            low_limit_hz: 200.0,
            high_limit_hz: 2000.0,
        }
    }
}

/// Parse a band label into its centre frequency.
///
/// "31.5Hz" -> 31.5, "1kHz" -> 1000. Case and surrounding blanks are ignored.
pub fn parse_band_frequency(label: &str) -> Option<f64> {
    let lower = label.trim().to_lowercase();
    let body = lower.strip_suffix("hz").unwrap_or(&lower).trim();

    let (digits, scale) = match body.strip_suffix('k') {
        Some(rest) => (rest.trim(), 1000.0),
        None => (body, 1.0),
    };

    let value: f64 = digits.replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value * scale)
}

/// Energetic (power) sum in dB: `10*log10(sum(10^(v/10)))`.
/// Empty input or zero total power gives 0.
pub fn energetic_sum(levels_db: &[f64]) -> f64 {
    let power: f64 = levels_db.iter().map(|v| 10f64.powf(v / 10.0)).sum();
    if power > 0.0 && power.is_finite() {
        10.0 * power.log10()
    } else {
        0.0
    }
}

/// Extract the (low, mid, high) feature triple.
///
/// Labels that are not frequencies and non-finite values are skipped. A
/// spectrum with no usable band is rejected as malformed.
pub fn extract_features(bands: &BandLevels, limits: &BandLimits) -> Result<SpectralFeatures, ClassifierError> {
    let mut low = Vec::new();
    let mut mid = Vec::new();
    let mut high = Vec::new();

    for (label, &value) in bands {
        if !value.is_finite() {
            continue;
        }
        let Some(freq) = parse_band_frequency(label) else {
            continue;
        };

        if freq < limits.low_limit_hz {
            low.push(value);
        } else if freq > limits.high_limit_hz {
            high.push(value);
        } else {
            mid.push(value);
        }
    }

    if low.is_empty() && mid.is_empty() && high.is_empty() {
        return Err(ClassifierError::MalformedExample(format!(
            "no usable frequency band among {} entries",
            bands.len()
        )));
    }

    Ok(SpectralFeatures {
        low: energetic_sum(&low),
        mid: energetic_sum(&mid),
        high: energetic_sum(&high),
    })
}
