use numpy::{PyArray1, PyArrayDyn, PyArrayMethods, PyReadonlyArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::BTreeMap;

use crate::detector::{Detection, WildlifeDetector as RustDetector, DEFAULT_TOP_K};
use crate::ranking::{self, ConfidenceThresholds, Prediction};
use crate::{Error, Tensor};

fn to_py_err(e: Error) -> PyErr {
    match e {
        Error::InvalidInput(msg) => PyValueError::new_err(msg),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn prediction_dict<'py>(py: Python<'py>, p: &Prediction) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("index", p.index)?;
    dict.set_item("probability", p.probability)?;
    dict.set_item("species", &p.species)?;
    dict.set_item("confidence", p.percent())?;
    dict.set_item("confidence_level", p.bucket.as_str())?;
    Ok(dict)
}

fn detection_dict<'py>(py: Python<'py>, d: &Detection) -> PyResult<Bound<'py, PyDict>> {
    let predictions = d
        .predictions
        .iter()
        .map(|p| prediction_dict(py, p))
        .collect::<PyResult<Vec<_>>>()?;

    let dict = PyDict::new_bound(py);
    dict.set_item("predictions", predictions)?;
    dict.set_item("top_prediction", prediction_dict(py, &d.top_prediction)?)?;
    dict.set_item("processing_time", d.processing_time_ms)?;
    dict.set_item("timestamp", &d.timestamp)?;
    Ok(dict)
}

#[pyclass(name = "WildlifeDetector")]
pub struct PyWildlifeDetector {
    inner: RustDetector,
}

#[pymethods]
impl PyWildlifeDetector {
    /// Loads `model.keras` and `metadata.json` from a model directory.
    #[staticmethod]
    #[pyo3(signature = (model_dir))]
    fn load(model_dir: &str) -> PyResult<Self> {
        let inner = RustDetector::load(model_dir).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[pyo3(signature = (image_path, top_k = DEFAULT_TOP_K))]
    fn predict<'py>(&self, py: Python<'py>, image_path: &str, top_k: usize) -> PyResult<Bound<'py, PyDict>> {
        let detection = py
            .allow_threads(|| self.inner.predict_path(image_path, top_k))
            .map_err(to_py_err)?;
        detection_dict(py, &detection)
    }

    /// Softmax output for one image file, as a 1-D float32 array.
    #[pyo3(signature = (image_path))]
    fn probabilities<'py>(&self, py: Python<'py>, image_path: &str) -> PyResult<Bound<'py, PyArray1<f32>>> {
        let probs = py
            .allow_threads(|| {
                let image = crate::preprocess::load_image(image_path)?;
                self.inner.probabilities(&image)
            })
            .map_err(to_py_err)?;
        Ok(PyArray1::from_vec_bound(py, probs))
    }

    /// Runs the classifier on an already preprocessed NHWC batch.
    fn forward<'py>(&self, py: Python<'py>, input: &Bound<'py, PyArrayDyn<f32>>) -> PyResult<Bound<'py, PyArrayDyn<f32>>> {
        let tensor = Tensor::new(input.readonly().as_array().to_owned());
        let output = self.inner.classifier().predict(&tensor).map_err(to_py_err)?;
        Ok(PyArrayDyn::from_owned_array_bound(py, output.into_data()))
    }

    #[pyo3(signature = (name))]
    fn species_info<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Option<Bound<'py, PyDict>>> {
        let Some(info) = self.inner.species_info(name) else {
            return Ok(None);
        };
        let dict = PyDict::new_bound(py);
        dict.set_item("index", info.index)?;
        dict.set_item("name", info.name)?;
        dict.set_item("category", info.category)?;
        Ok(Some(dict))
    }

    fn num_species(&self) -> usize {
        self.inner.metadata().num_classes()
    }

    fn summary(&self) -> String {
        self.inner.classifier().summary()
    }

    fn __repr__(&self) -> String {
        format!(
            "<WildlifeDetector {} species, {} layers>",
            self.inner.metadata().num_classes(),
            self.inner.classifier().num_layers()
        )
    }
}

/// `rank(probabilities, species_mapping, thresholds, top_k)` where
/// `thresholds` is `(high, medium, low)`.
#[pyfunction]
#[pyo3(name = "rank", signature = (probabilities, species_mapping, thresholds, top_k))]
fn py_rank<'py>(
    py: Python<'py>,
    probabilities: PyReadonlyArray1<'py, f32>,
    species_mapping: BTreeMap<usize, String>,
    thresholds: (f32, f32, f32),
    top_k: usize,
) -> PyResult<Vec<Bound<'py, PyDict>>> {
    let (high, medium, low) = thresholds;
    let thresholds = ConfidenceThresholds::new(high, medium, low).map_err(to_py_err)?;
    let probabilities = probabilities.as_array().to_vec();
    let ranking = ranking::rank(&probabilities, &species_mapping, &thresholds, top_k).map_err(to_py_err)?;
    ranking
        .predictions
        .iter()
        .map(|p| prediction_dict(py, p))
        .collect()
}

pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyWildlifeDetector>()?;
    m.add_function(wrap_pyfunction!(py_rank, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
