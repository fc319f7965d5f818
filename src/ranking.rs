//! Classifier output post-processing.
//!
//! Turns a probability vector into a ranked, human readable, confidence
//! bucketed prediction list. Everything here is a pure function of its
//! inputs.
//!
//! ```
//! use std::collections::BTreeMap;
//! use wildlife_detector::ranking::{rank, ConfidenceBucket, ConfidenceThresholds};
//!
//! let species = BTreeMap::from([
//!     (0, "Fox".to_string()),
//!     (1, "Bear".to_string()),
//!     (2, "Deer".to_string()),
//! ]);
//! let thresholds = ConfidenceThresholds::new(0.85, 0.65, 0.45)?;
//!
//! let ranking = rank(&[0.1, 0.7, 0.2], &species, &thresholds, 2)?;
//! assert_eq!(ranking.top.species, "Bear");
//! assert_eq!(ranking.top.bucket, ConfidenceBucket::Medium);
//! # Ok::<(), wildlife_detector::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Class index to display name. Indices missing from the map are still
/// rankable; they get a placeholder name.
pub type SpeciesMapping = BTreeMap<usize, String>;

/// Name used when the mapping has no entry for `index`.
pub fn placeholder_name(index: usize) -> String {
    format!("Species {}", index)
}

/// Resolves a class index, falling back to [`placeholder_name`].
pub fn species_name(species: &SpeciesMapping, index: usize) -> String {
    species
        .get(&index)
        .cloned()
        .unwrap_or_else(|| placeholder_name(index))
}

/// Qualitative confidence tier. Ordered from least to most confident, so
/// `ConfidenceBucket::High > ConfidenceBucket::Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    Unclassified,
    Low,
    Medium,
    High,
}

impl ConfidenceBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBucket::Unclassified => "unclassified",
            ConfidenceBucket::Low => "low",
            ConfidenceBucket::Medium => "medium",
            ConfidenceBucket::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket cut points, `high >= medium >= low`, all in `[0, 1]`.
///
/// Serialized with the key names used by the model metadata artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    #[serde(rename = "high_confidence")]
    pub high: f32,
    #[serde(rename = "medium_confidence")]
    pub medium: f32,
    #[serde(rename = "low_confidence")]
    pub low: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.85,
            medium: 0.65,
            low: 0.45,
        }
    }
}

impl ConfidenceThresholds {
    pub fn new(high: f32, medium: f32, low: f32) -> Result<Self> {
        let thresholds = Self { high, medium, low };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !(in_range(self.high) && in_range(self.medium) && in_range(self.low)) {
            return Err(Error::invalid_input(format!(
                "confidence thresholds must lie in [0, 1], got {:?}",
                self
            )));
        }
        if !(self.high >= self.medium && self.medium >= self.low) {
            return Err(Error::invalid_input(format!(
                "confidence thresholds must satisfy high >= medium >= low, got {:?}",
                self
            )));
        }
        Ok(())
    }

    pub fn bucket(&self, probability: f32) -> ConfidenceBucket {
        if probability >= self.high {
            ConfidenceBucket::High
        } else if probability >= self.medium {
            ConfidenceBucket::Medium
        } else if probability >= self.low {
            ConfidenceBucket::Low
        } else {
            ConfidenceBucket::Unclassified
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub index: usize,
    pub probability: f32,
    pub species: String,
    pub bucket: ConfidenceBucket,
}

impl Prediction {
    /// Probability as a whole percentage, for display.
    pub fn percent(&self) -> u32 {
        (self.probability * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// Top-K predictions, most probable first. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub predictions: Vec<Prediction>,
    #[serde(rename = "top_prediction")]
    pub top: Prediction,
}

/// Ranks `probabilities` and keeps the `top_k` most probable classes.
///
/// Equal probabilities keep ascending index order. Fails with
/// [`Error::InvalidInput`] when the vector length differs from the mapping
/// size, when `top_k` is outside `1..=probabilities.len()`, or when a
/// probability is NaN.
pub fn rank(
    probabilities: &[f32],
    species: &SpeciesMapping,
    thresholds: &ConfidenceThresholds,
    top_k: usize,
) -> Result<Ranking> {
    if probabilities.len() != species.len() {
        return Err(Error::invalid_input(format!(
            "probability vector has {} entries but the species mapping has {}",
            probabilities.len(),
            species.len()
        )));
    }
    if top_k == 0 || top_k > probabilities.len() {
        return Err(Error::invalid_input(format!(
            "top_k must be in 1..={}, got {}",
            probabilities.len(),
            top_k
        )));
    }
    if let Some(idx) = probabilities.iter().position(|p| p.is_nan()) {
        return Err(Error::invalid_input(format!("probability {} is NaN", idx)));
    }

    let mut order: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    // sort_by is stable: ties stay in index order
    order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let predictions: Vec<Prediction> = order
        .into_iter()
        .take(top_k)
        .map(|(index, probability)| Prediction {
            index,
            probability,
            species: species_name(species, index),
            bucket: thresholds.bucket(probability),
        })
        .collect();

    let top = predictions
        .first()
        .cloned()
        .ok_or_else(|| Error::invalid_input("empty ranking"))?;
    log::debug!(
        "Ranked {} classes, top: {} ({:.3}, {})",
        probabilities.len(),
        top.species,
        top.probability,
        top.bucket
    );

    Ok(Ranking { predictions, top })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fox_bear_deer() -> SpeciesMapping {
        BTreeMap::from([
            (0, "Fox".to_string()),
            (1, "Bear".to_string()),
            (2, "Deer".to_string()),
        ])
    }

    #[test]
    fn test_bucket_boundaries_are_inclusive() {
        let t = ConfidenceThresholds::default();
        assert_eq!(t.bucket(0.85), ConfidenceBucket::High);
        assert_eq!(t.bucket(0.65), ConfidenceBucket::Medium);
        assert_eq!(t.bucket(0.45), ConfidenceBucket::Low);
        assert_eq!(t.bucket(0.449), ConfidenceBucket::Unclassified);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(ConfidenceThresholds::new(0.9, 0.75, 0.6).is_ok());
        assert!(ConfidenceThresholds::new(0.5, 0.75, 0.6).is_err());
        assert!(ConfidenceThresholds::new(1.5, 0.75, 0.6).is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let result = rank(&[0.5, f32::NAN, 0.1], &fox_bear_deer(), &ConfidenceThresholds::default(), 1);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_percent_rounds() {
        let ranking = rank(&[0.1, 0.876, 0.024], &fox_bear_deer(), &ConfidenceThresholds::default(), 1).unwrap();
        assert_eq!(ranking.top.percent(), 88);
    }

    #[test]
    fn test_serializes_bucket_lowercase() {
        let ranking = rank(&[0.1, 0.7, 0.2], &fox_bear_deer(), &ConfidenceThresholds::default(), 1).unwrap();
        let json = serde_json::to_value(&ranking).unwrap();
        assert_eq!(json["top_prediction"]["bucket"], "medium");
        assert_eq!(json["predictions"][0]["species"], "Bear");
    }
}
