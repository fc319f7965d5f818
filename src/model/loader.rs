use crate::{
    activations::Activation,
    layers::{
        AveragePooling2D, BatchNormalization, Conv2D, Dense, Dropout, Flatten,
        GlobalAveragePooling2D, Layer, MaxPooling2D, Padding,
    },
    Error, Result,
};
use hdf5::{File as H5File, Group};
use ndarray::{Array1, Array2, Array4};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use zip::ZipArchive;

use super::Classifier;

type Archive = ZipArchive<BufReader<File>>;

pub fn load_from_keras(path: &Path) -> Result<Classifier> {
    log::debug!("Opening Keras archive {}", path.display());

    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::ModelLoad(format!("Failed to open .keras file as ZIP: {}", e)))?;

    let config = read_config(&mut archive)?;
    let model_name = config["config"]["name"].as_str().unwrap_or("model");
    let mut model = Classifier::new(model_name);

    let layer_configs = config["config"]["layers"]
        .as_array()
        .ok_or_else(|| Error::ModelLoad("No layers found in config".to_string()))?;

    // Keeps the extracted weights file alive until every layer is read.
    let weights_file = extract_weights_h5(&mut archive)?;
    let h5 = H5File::open(weights_file.path())?;
    let mut weights = WeightStore::new(&h5);

    for layer_config in layer_configs {
        let class_name = layer_config["class_name"]
            .as_str()
            .ok_or_else(|| Error::ModelLoad("Layer missing class_name".to_string()))?;
        let cfg = &layer_config["config"];
        let name = cfg["name"]
            .as_str()
            .ok_or_else(|| Error::ModelLoad("Layer missing name".to_string()))?
            .to_string();

        let layer: Box<dyn Layer> = match class_name {
            "InputLayer" => {
                if let Some(shape) = input_shape(cfg) {
                    model.set_input_shape(shape);
                }
                continue;
            }
            "Conv2D" => Box::new(load_conv2d(&mut weights, name, cfg)?),
            "Dense" => Box::new(load_dense(&mut weights, name, cfg)?),
            "BatchNormalization" => Box::new(load_batch_normalization(&mut weights, name, cfg)?),
            "MaxPooling2D" => {
                let (size, strides, padding) = pool_params(cfg)?;
                Box::new(MaxPooling2D::new(name, size, strides, padding)?)
            }
            "AveragePooling2D" => {
                let (size, strides, padding) = pool_params(cfg)?;
                Box::new(AveragePooling2D::new(name, size, strides, padding)?)
            }
            "GlobalAveragePooling2D" => Box::new(GlobalAveragePooling2D::new(name)),
            "Flatten" => Box::new(Flatten::new(name)),
            "Dropout" => {
                let rate = cfg["rate"].as_f64().unwrap_or(0.5) as f32;
                Box::new(Dropout::new(name, rate))
            }
            other => return Err(Error::UnsupportedLayer(other.to_string())),
        };

        log::debug!("Loaded {} layer '{}'", class_name, layer.name());
        model.add(layer);
    }

    log::info!(
        "Loaded model '{}' with {} layers from {}",
        model.name(),
        model.num_layers(),
        path.display()
    );
    Ok(model)
}

fn read_config(archive: &mut Archive) -> Result<Value> {
    let mut entry = archive
        .by_name("config.json")
        .map_err(|e| Error::ModelLoad(format!("config.json not found in .keras file: {}", e)))?;

    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| Error::ModelLoad(format!("Failed to read config.json: {}", e)))?;

    Ok(serde_json::from_str(&text)?)
}

// The hdf5 crate only opens files by path, so the archived weights are
// copied out to a temporary file first.
fn extract_weights_h5(archive: &mut Archive) -> Result<tempfile::NamedTempFile> {
    let mut entry = archive
        .by_name("model.weights.h5")
        .map_err(|e| Error::ModelLoad(format!("model.weights.h5 not found in .keras file: {}", e)))?;

    let mut buffer = Vec::new();
    entry.read_to_end(&mut buffer)?;

    let mut temp = tempfile::NamedTempFile::new()?;
    temp.write_all(&buffer)?;
    temp.flush()?;
    Ok(temp)
}

/// Resolves weight groups in the order Keras writes them: the first layer of
/// a kind is `<kind>`, later ones `<kind>_1`, `<kind>_2`, ...
struct WeightStore<'a> {
    h5: &'a H5File,
    seen: HashMap<&'static str, usize>,
}

impl<'a> WeightStore<'a> {
    fn new(h5: &'a H5File) -> Self {
        Self {
            h5,
            seen: HashMap::new(),
        }
    }

    fn next_vars(&mut self, kind: &'static str, layer_name: &str) -> Result<Group> {
        let idx = self.seen.entry(kind).or_insert(0);
        let h5_name = if *idx == 0 {
            kind.to_string()
        } else {
            format!("{}_{}", kind, idx)
        };
        *idx += 1;

        let group = self
            .h5
            .group(&format!("layers/{}", h5_name))
            .or_else(|_| self.h5.group(&h5_name))
            .map_err(|_| {
                Error::ModelLoad(format!(
                    "Layer weights not found: {} (tried layers/{})",
                    layer_name, h5_name
                ))
            })?;

        group
            .group("vars")
            .map_err(|_| Error::ModelLoad(format!("vars group not found for layer: {}", layer_name)))
    }
}

fn read_var(vars: &Group, idx: usize, what: &str, layer_name: &str) -> Result<(Vec<usize>, Vec<f32>)> {
    let dataset = vars
        .dataset(&idx.to_string())
        .map_err(|_| Error::ModelLoad(format!("{} not found for layer: {}", what, layer_name)))?;
    let data = dataset
        .read_raw::<f32>()
        .map_err(|e| Error::ModelLoad(format!("Failed to read {} of {}: {}", what, layer_name, e)))?;
    Ok((dataset.shape(), data))
}

fn shape_error(what: &str, layer_name: &str, e: impl std::fmt::Display) -> Error {
    Error::ModelLoad(format!("Bad {} shape for layer {}: {}", what, layer_name, e))
}

fn activation(cfg: &Value) -> Result<Activation> {
    Activation::from_str(cfg["activation"].as_str().unwrap_or("linear"))
}

fn use_bias(cfg: &Value) -> bool {
    cfg["use_bias"].as_bool().unwrap_or(true)
}

fn pair(cfg: &Value, key: &str) -> Result<Option<(usize, usize)>> {
    let Some(arr) = cfg[key].as_array() else {
        return match cfg[key].as_u64() {
            Some(n) => Ok(Some((n as usize, n as usize))),
            None => Ok(None),
        };
    };

    let at = |i: usize| {
        arr.get(i)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| Error::ModelLoad(format!("Invalid {}[{}] in config", key, i)))
    };
    Ok(Some((at(0)?, at(1)?)))
}

fn padding(cfg: &Value) -> Result<Padding> {
    Padding::from_str(cfg["padding"].as_str().unwrap_or("valid"))
}

/// Per-sample input shape from `batch_shape` (Keras 3) or
/// `batch_input_shape` (Keras 2).
fn input_shape(cfg: &Value) -> Option<Vec<usize>> {
    let batch_shape = cfg["batch_shape"]
        .as_array()
        .or_else(|| cfg["batch_input_shape"].as_array())?;
    let shape: Vec<usize> = batch_shape
        .iter()
        .skip(1)
        .filter_map(|v| v.as_u64().map(|n| n as usize))
        .collect();
    (!shape.is_empty()).then_some(shape)
}

fn pool_params(cfg: &Value) -> Result<((usize, usize), Option<(usize, usize)>, Padding)> {
    let size = pair(cfg, "pool_size")?.unwrap_or((2, 2));
    Ok((size, pair(cfg, "strides")?, padding(cfg)?))
}

fn load_dense(weights: &mut WeightStore, name: String, cfg: &Value) -> Result<Dense> {
    let vars = weights.next_vars("dense", &name)?;

    let (shape, data) = read_var(&vars, 0, "kernel", &name)?;
    let &[rows, cols] = shape.as_slice() else {
        return Err(shape_error("kernel", &name, format!("{:?}", shape)));
    };
    let kernel = Array2::from_shape_vec((rows, cols), data).map_err(|e| shape_error("kernel", &name, e))?;

    let bias = if use_bias(cfg) {
        let (_, data) = read_var(&vars, 1, "bias", &name)?;
        Some(Array1::from_vec(data))
    } else {
        None
    };

    Dense::new(name, kernel, bias, activation(cfg)?)
}

fn load_conv2d(weights: &mut WeightStore, name: String, cfg: &Value) -> Result<Conv2D> {
    let filters = cfg["filters"]
        .as_u64()
        .ok_or_else(|| Error::ModelLoad("Conv2D layer missing filters".to_string()))? as usize;
    let kernel_size = pair(cfg, "kernel_size")?
        .ok_or_else(|| Error::ModelLoad("Conv2D layer missing kernel_size".to_string()))?;
    let strides = pair(cfg, "strides")?.unwrap_or((1, 1));

    let vars = weights.next_vars("conv2d", &name)?;

    let (shape, data) = read_var(&vars, 0, "kernel", &name)?;
    let &[kh, kw, cin, cout] = shape.as_slice() else {
        return Err(shape_error("kernel", &name, format!("{:?}", shape)));
    };
    let kernel = Array4::from_shape_vec((kh, kw, cin, cout), data).map_err(|e| shape_error("kernel", &name, e))?;

    let bias = if use_bias(cfg) {
        Some(read_var(&vars, 1, "bias", &name)?.1)
    } else {
        None
    };

    Conv2D::new(
        name,
        filters,
        kernel_size,
        strides,
        padding(cfg)?,
        kernel,
        bias,
        activation(cfg)?,
    )
}

// Keras stores only the enabled parameters, in the order
// gamma (if scale), beta (if center), moving_mean, moving_variance.
fn load_batch_normalization(
    weights: &mut WeightStore,
    name: String,
    cfg: &Value,
) -> Result<BatchNormalization> {
    let epsilon = cfg["epsilon"].as_f64().unwrap_or(0.001) as f32;
    let scale = cfg["scale"].as_bool().unwrap_or(true);
    let center = cfg["center"].as_bool().unwrap_or(true);

    let vars = weights.next_vars("batch_normalization", &name)?;
    let mut idx = 0;
    let mut next = |what: &str| -> Result<Array1<f32>> {
        let (_, data) = read_var(&vars, idx, what, &name)?;
        idx += 1;
        Ok(Array1::from_vec(data))
    };

    let gamma = if scale { Some(next("gamma")?) } else { None };
    let beta = if center { Some(next("beta")?) } else { None };
    let moving_mean = next("moving_mean")?;
    let moving_variance = next("moving_variance")?;

    let features = moving_mean.len();
    BatchNormalization::new(
        name,
        gamma.unwrap_or_else(|| Array1::ones(features)),
        beta.unwrap_or_else(|| Array1::zeros(features)),
        moving_mean,
        moving_variance,
        epsilon,
    )
}
