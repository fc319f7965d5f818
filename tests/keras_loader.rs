#![cfg(feature = "keras")]

use approx::assert_abs_diff_eq;
use image::{DynamicImage, Rgb, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use wildlife_detector::{Classifier, Tensor, WildlifeDetector};

const CONFIG: &str = r#"{
    "module": "keras",
    "class_name": "Sequential",
    "config": {
        "name": "wildlife_classifier",
        "layers": [
            {"class_name": "InputLayer", "config": {"name": "input_layer", "batch_shape": [null, 4, 4, 3]}},
            {"class_name": "Conv2D", "config": {"name": "conv2d", "filters": 2, "kernel_size": [1, 1],
                "strides": [1, 1], "padding": "valid", "activation": "linear", "use_bias": true}},
            {"class_name": "MaxPooling2D", "config": {"name": "max_pooling2d", "pool_size": [2, 2], "padding": "valid"}},
            {"class_name": "BatchNormalization", "config": {"name": "batch_normalization", "epsilon": 0.0,
                "center": true, "scale": false}},
            {"class_name": "GlobalAveragePooling2D", "config": {"name": "global_average_pooling2d"}},
            {"class_name": "Dropout", "config": {"name": "dropout", "rate": 0.2}},
            {"class_name": "Dense", "config": {"name": "dense", "units": 2, "activation": "linear", "use_bias": true}},
            {"class_name": "Dense", "config": {"name": "dense_1", "units": 3, "activation": "softmax", "use_bias": false}}
        ]
    }
}"#;

const METADATA: &str = r#"{
    "species_mapping": {"0": "Red Fox", "1": "Green Heron", "2": "Blue Jay"},
    "preprocessing": {"image_size": [4, 4]},
    "detection_categories": {"mammals": [0], "birds": [1, 2]}
}"#;

fn write_vars(layers: &hdf5::Group, layer: &str, vars: &[(Vec<usize>, Vec<f32>)]) -> hdf5::Result<()> {
    let group = layers.create_group(layer)?.create_group("vars")?;
    for (i, (shape, data)) in vars.iter().enumerate() {
        let dataset = group
            .new_dataset::<f32>()
            .shape(shape.clone())
            .create(i.to_string().as_str())?;
        dataset.write_raw(data.as_slice())?;
    }
    Ok(())
}

/// Weights in the `layers/<kind>[_n]/vars/<i>` layout Keras 3 writes.
fn write_weights(path: &Path) -> hdf5::Result<()> {
    let file = hdf5::File::create(path)?;
    let layers = file.create_group("layers")?;

    // 1x1 conv passing red to filter 0 and green to filter 1
    write_vars(
        &layers,
        "conv2d",
        &[(vec![1, 1, 3, 2], vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]), (vec![2], vec![0.0, 0.0])],
    )?;
    // scale=false: only beta, moving_mean, moving_variance are stored
    write_vars(
        &layers,
        "batch_normalization",
        &[(vec![2], vec![1.0, 2.0]), (vec![2], vec![0.0, 0.0]), (vec![2], vec![4.0, 4.0])],
    )?;
    write_vars(
        &layers,
        "dense",
        &[(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]), (vec![2], vec![0.0, 0.0])],
    )?;
    write_vars(&layers, "dense_1", &[(vec![2, 3], vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])])?;
    Ok(())
}

fn write_keras_archive(dir: &Path) -> std::path::PathBuf {
    let h5_path = dir.join("weights.h5");
    write_weights(&h5_path).unwrap();
    let weights = std::fs::read(&h5_path).unwrap();

    let archive_path = dir.join("model.keras");
    let mut zip = zip::ZipWriter::new(File::create(&archive_path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("config.json", options).unwrap();
    zip.write_all(CONFIG.as_bytes()).unwrap();
    zip.start_file("model.weights.h5", options).unwrap();
    zip.write_all(&weights).unwrap();
    zip.finish().unwrap();

    archive_path
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let exps: Vec<f32> = logits.iter().map(|v| v.exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[test]
fn test_load_sequential_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_keras_archive(dir.path());

    let model = Classifier::load(&path).unwrap();

    assert_eq!(model.name(), "wildlife_classifier");
    assert_eq!(model.num_layers(), 7);
    assert_eq!(model.input_shape(), Some(&[4, 4, 3][..]));
    assert_eq!(model.num_classes(), Some(3));
    assert_eq!(
        model.layer_names(),
        vec![
            "conv2d",
            "max_pooling2d",
            "batch_normalization",
            "global_average_pooling2d",
            "dropout",
            "dense",
            "dense_1"
        ]
    );
}

#[test]
fn test_loaded_weights_drive_forward_pass() {
    let dir = tempfile::tempdir().unwrap();
    let model = Classifier::load(write_keras_archive(dir.path())).unwrap();

    let mut pixels = Vec::with_capacity(48);
    for _ in 0..16 {
        pixels.extend_from_slice(&[2.0, 4.0, 9.0]);
    }
    let input = Tensor::from_vec(pixels, &[1, 4, 4, 3]).unwrap();

    let probs = model.predict_probabilities(&input).unwrap();

    // conv keeps (2, 4), batch norm maps x to x / 2 + beta giving (2, 4)
    let expected = softmax(&[2.0, 4.0, 0.0]);
    assert_eq!(probs.len(), 3);
    for (got, want) in probs.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-5);
    }
}

#[test]
fn test_missing_weights_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.keras");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("config.json", zip::write::SimpleFileOptions::default()).unwrap();
    zip.write_all(CONFIG.as_bytes()).unwrap();
    zip.finish().unwrap();

    assert!(Classifier::load(&path).is_err());
}

#[test]
fn test_detector_loads_model_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_keras_archive(dir.path());
    std::fs::write(dir.path().join("metadata.json"), METADATA).unwrap();

    let detector = WildlifeDetector::load(dir.path()).unwrap();

    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 255, 0])));
    let detection = detector.predict(&image, 2).unwrap();

    assert_eq!(detection.top_prediction.species, "Green Heron");
    assert_eq!(detection.predictions.len(), 2);
    assert_eq!(detector.species_info("Green Heron").unwrap().category, "birds");
}

#[test]
fn test_detector_rejects_mismatched_metadata() {
    let dir = tempfile::tempdir().unwrap();
    write_keras_archive(dir.path());
    std::fs::write(
        dir.path().join("metadata.json"),
        r#"{"species_mapping": {"0": "Red Fox", "1": "Green Heron"}}"#,
    )
    .unwrap();

    assert!(WildlifeDetector::load(dir.path()).is_err());
}
