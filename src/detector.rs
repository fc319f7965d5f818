//! End-to-end detection: image in, ranked species out.

use chrono::{SecondsFormat, Utc};
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::metadata::ModelMetadata;
use crate::model::Classifier;
use crate::preprocess::{load_image, preprocess_image};
use crate::ranking::{rank, Prediction};
use crate::{Error, Result};

pub const DEFAULT_TOP_K: usize = 5;

pub const MODEL_FILE: &str = "model.keras";
pub const METADATA_FILE: &str = "metadata.json";

/// Result of one `predict` call.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub predictions: Vec<Prediction>,
    pub top_prediction: Prediction,
    /// Preprocessing plus forward pass, in milliseconds.
    pub processing_time_ms: u64,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesInfo {
    pub index: usize,
    pub name: String,
    pub category: String,
}

#[derive(Debug)]
pub struct WildlifeDetector {
    classifier: Classifier,
    metadata: ModelMetadata,
}

impl WildlifeDetector {
    /// Pairs a classifier with its metadata, checking that the classifier
    /// emits one score per mapped species when that can be determined.
    pub fn new(classifier: Classifier, metadata: ModelMetadata) -> Result<Self> {
        metadata.validate()?;

        if let Some(classes) = classifier.num_classes() {
            if classes != metadata.num_classes() {
                return Err(Error::Metadata(format!(
                    "model '{}' outputs {} classes but the species mapping has {}",
                    classifier.name(),
                    classes,
                    metadata.num_classes()
                )));
            }
        }

        if let Some(shape) = classifier.input_shape() {
            let [h, w] = metadata.preprocessing.image_size;
            if shape.len() >= 2 && (shape[0], shape[1]) != (h as usize, w as usize) {
                log::warn!(
                    "Preprocessing size {}x{} differs from model input {:?}",
                    h,
                    w,
                    shape
                );
            }
        }

        Ok(Self {
            classifier,
            metadata,
        })
    }

    /// Loads `model.keras` and `metadata.json` from `dir`.
    #[cfg(feature = "keras")]
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        log::info!("Loading wildlife detection model from {}", dir.display());

        let classifier = Classifier::load(dir.join(MODEL_FILE))?;
        let metadata = ModelMetadata::load(dir.join(METADATA_FILE))?;
        let detector = Self::new(classifier, metadata)?;

        log::info!(
            "Wildlife detector ready: {} species",
            detector.metadata.num_classes()
        );
        Ok(detector)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Raw class probabilities for one image.
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let input = preprocess_image(image, &self.metadata.preprocessing)?;
        self.classifier.predict_probabilities(&input)
    }

    pub fn predict(&self, image: &DynamicImage, top_k: usize) -> Result<Detection> {
        let start = Instant::now();
        let probabilities = self.probabilities(image)?;
        let elapsed = start.elapsed();

        let ranking = rank(
            &probabilities,
            &self.metadata.species_mapping,
            &self.metadata.confidence_thresholds,
            top_k,
        )?;

        log::debug!(
            "Predicted {} ({:.1}%) in {:?}",
            ranking.top.species,
            ranking.top.probability * 100.0,
            elapsed
        );

        Ok(Detection {
            predictions: ranking.predictions,
            top_prediction: ranking.top,
            processing_time_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub fn predict_path(&self, path: impl AsRef<Path>, top_k: usize) -> Result<Detection> {
        let image = load_image(path)?;
        self.predict(&image, top_k)
    }

    /// Looks a species up by exact display name.
    pub fn species_info(&self, name: &str) -> Option<SpeciesInfo> {
        let index = self.metadata.species_index(name)?;
        let category = self.metadata.category_of(index).unwrap_or("unknown");
        Some(SpeciesInfo {
            index,
            name: name.to_string(),
            category: category.to_string(),
        })
    }
}
