//! # Wildlife Detector
//!
//! Species detection for wildlife photos using a Keras CNN classifier.
//! Loads a Sequential `.keras` model and its `metadata.json`, runs the
//! forward pass on the CPU and turns the softmax output into a ranked,
//! confidence-bucketed prediction list.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wildlife_detector::WildlifeDetector;
//!
//! let detector = WildlifeDetector::load("models/web_optimized/current_model")?;
//! let detection = detector.predict_path("fox.jpg", 5)?;
//! println!("{} ({})", detection.top_prediction.species, detection.top_prediction.bucket);
//! ```
//!
//! The ranking step is usable on its own with any probability vector, see
//! [`ranking::rank`].

pub mod activations;
pub mod detector;
pub mod error;
pub mod layers;
pub mod metadata;
pub mod model;
pub mod preprocess;
pub mod ranking;
pub mod tensor;

#[cfg(feature = "python")]
pub mod python;

pub use detector::{Detection, SpeciesInfo, WildlifeDetector, DEFAULT_TOP_K};
pub use error::{Error, Result};
pub use metadata::ModelMetadata;
pub use model::Classifier;
pub use ranking::{rank, ConfidenceBucket, ConfidenceThresholds, Prediction, Ranking, SpeciesMapping};
pub use tensor::Tensor;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn wildlife_detector(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register_module(m)?;
    Ok(())
}
