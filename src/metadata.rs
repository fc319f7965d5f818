//! The `metadata.json` artifact shipped next to a trained model.
//!
//! It carries the species mapping, the confidence thresholds, the
//! preprocessing settings the model was trained with, and optional
//! detection categories (mammals, birds, ...). Only `species_mapping` is
//! required; every other section has defaults matching what the training
//! scripts emit.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::ranking::{self, ConfidenceThresholds, SpeciesMapping};
use crate::{Error, Result};

pub const DEFAULT_IMAGE_SIZE: [u32; 2] = [224, 224];

/// Descriptive model information. Unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `[height, width, channels]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ResizeMethod {
    #[default]
    Bilinear,
    Nearest,
}

impl From<String> for ResizeMethod {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "bilinear" => ResizeMethod::Bilinear,
            "nearest" | "nearest_neighbor" => ResizeMethod::Nearest,
            other => {
                log::warn!("Unknown resize method '{}', using bilinear", other);
                ResizeMethod::Bilinear
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// `[height, width]` the image is resized to.
    #[serde(default = "default_image_size", deserialize_with = "de_image_size")]
    pub image_size: [u32; 2],
    #[serde(default = "default_normalization")]
    pub normalization: String,
    #[serde(default)]
    pub resize_method: ResizeMethod,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            normalization: default_normalization(),
            resize_method: ResizeMethod::default(),
        }
    }
}

fn default_image_size() -> [u32; 2] {
    DEFAULT_IMAGE_SIZE
}

fn default_normalization() -> String {
    "0-1 scaling".to_string()
}

// Accepts `[h, w]` as well as a full `[h, w, channels]` input shape.
fn de_image_size<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<[u32; 2], D::Error> {
    let dims = Vec::<u32>::deserialize(deserializer)?;
    match dims.as_slice() {
        [h, w] | [h, w, _] => Ok([*h, *w]),
        _ => Err(serde::de::Error::custom(format!(
            "image_size must have 2 or 3 entries, got {:?}",
            dims
        ))),
    }
}

/// Class indices are written both as integers and as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassIndex {
    Number(usize),
    Text(String),
}

/// Category name to class indices, in document order.
pub type DetectionCategories = Vec<(String, Vec<usize>)>;

struct CategoriesVisitor;

impl<'de> Visitor<'de> for CategoriesVisitor {
    type Value = DetectionCategories;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of category name to class indices")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut categories = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((category, indices)) = map.next_entry::<String, Vec<ClassIndex>>()? {
            let parsed = indices
                .into_iter()
                .map(|idx| match idx {
                    ClassIndex::Number(n) => Ok(n),
                    ClassIndex::Text(s) => s.trim().parse::<usize>().map_err(|_| {
                        serde::de::Error::custom(format!(
                            "category '{}' has non-numeric class index '{}'",
                            category, s
                        ))
                    }),
                })
                .collect::<std::result::Result<Vec<_>, A::Error>>()?;
            categories.push((category, parsed));
        }
        Ok(categories)
    }
}

fn de_categories<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DetectionCategories, D::Error> {
    deserializer.deserialize_map(CategoriesVisitor)
}

fn ser_categories<S: Serializer>(categories: &DetectionCategories, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(categories.iter().map(|(name, indices)| (name, indices)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub model_info: ModelInfo,
    pub species_mapping: SpeciesMapping,
    #[serde(default)]
    pub confidence_thresholds: ConfidenceThresholds,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    #[serde(default, deserialize_with = "de_categories", serialize_with = "ser_categories")]
    pub detection_categories: DetectionCategories,
}

impl ModelMetadata {
    pub fn new(species_mapping: SpeciesMapping) -> Self {
        Self {
            model_info: ModelInfo::default(),
            species_mapping,
            confidence_thresholds: ConfidenceThresholds::default(),
            preprocessing: PreprocessingConfig::default(),
            detection_categories: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let metadata: Self = serde_json::from_str(json)
            .map_err(|e| Error::Metadata(format!("Failed to parse metadata: {}", e)))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let metadata = Self::from_json_str(&text)?;
        log::info!(
            "Loaded metadata from {}: {} species, thresholds {:?}",
            path.display(),
            metadata.species_mapping.len(),
            metadata.confidence_thresholds
        );
        Ok(metadata)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.confidence_thresholds
            .validate()
            .map_err(|e| Error::Metadata(e.to_string()))?;

        let [h, w] = self.preprocessing.image_size;
        if h == 0 || w == 0 {
            return Err(Error::Metadata(format!(
                "preprocessing.image_size must be non-zero, got [{}, {}]",
                h, w
            )));
        }

        if let Some(n) = self.model_info.num_classes {
            if n != self.species_mapping.len() {
                log::warn!(
                    "model_info.num_classes is {} but species_mapping has {} entries",
                    n,
                    self.species_mapping.len()
                );
            }
        }
        Ok(())
    }

    /// Class count the model is expected to emit.
    pub fn num_classes(&self) -> usize {
        self.species_mapping.len()
    }

    /// Display name for `index`, or the `"Species {index}"` placeholder.
    pub fn species_name(&self, index: usize) -> String {
        ranking::species_name(&self.species_mapping, index)
    }

    /// First class index whose name is exactly `name`.
    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species_mapping
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(idx, _)| *idx)
    }

    /// First category containing `index`, in the order the metadata lists them.
    pub fn category_of(&self, index: usize) -> Option<&str> {
        self.detection_categories
            .iter()
            .find(|(_, indices)| indices.contains(&index))
            .map(|(name, _)| name.as_str())
    }
}
