use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array2, Array4};
use std::collections::BTreeMap;
use wildlife_detector::activations::Activation;
use wildlife_detector::layers::{Conv2D, Dense, GlobalAveragePooling2D, Padding};
use wildlife_detector::{Classifier, ConfidenceBucket, Error, ModelMetadata, WildlifeDetector};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Colour classifier standing in for a trained model: channel means feed a
/// softmax head over red, green and blue "species".
fn colour_classifier(classes: usize) -> Classifier {
    let mut kernel = Array4::<f32>::zeros((1, 1, 3, 3));
    for c in 0..3 {
        kernel[[0, 0, c, c]] = 1.0;
    }
    let mut head = Array2::<f32>::zeros((3, classes));
    for c in 0..3.min(classes) {
        head[[c, c]] = 8.0;
    }

    let mut model = Classifier::new("colour").with_input_shape(vec![4, 4, 3]);
    model.add(Box::new(
        Conv2D::new(
            "conv2d".to_string(),
            3,
            (1, 1),
            (1, 1),
            Padding::Valid,
            kernel,
            None,
            Activation::Linear,
        )
        .unwrap(),
    ));
    model.add(Box::new(GlobalAveragePooling2D::new("global_average_pooling2d".to_string())));
    model.add(Box::new(
        Dense::new("predictions".to_string(), head, None, Activation::Softmax).unwrap(),
    ));
    model
}

fn metadata() -> ModelMetadata {
    let species = BTreeMap::from([
        (0, "Red Fox".to_string()),
        (1, "Green Heron".to_string()),
        (2, "Blue Jay".to_string()),
    ]);
    let mut meta = ModelMetadata::new(species);
    meta.preprocessing.image_size = [4, 4];
    meta.detection_categories = vec![
        ("birds".to_string(), vec![1, 2]),
        ("mammals".to_string(), vec![0]),
    ];
    meta
}

fn solid(colour: [u8; 3], size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb(colour)))
}

#[test]
fn test_predict_ranks_dominant_colour_first() {
    init_logging();
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();

    let detection = detector.predict(&solid([255, 0, 0], 16), 3).unwrap();

    assert_eq!(detection.predictions.len(), 3);
    assert_eq!(detection.top_prediction.species, "Red Fox");
    assert_eq!(detection.top_prediction.bucket, ConfidenceBucket::High);
    assert_eq!(detection.top_prediction, detection.predictions[0]);
    assert!(chrono::DateTime::parse_from_rfc3339(&detection.timestamp).is_ok());
}

#[test]
fn test_predict_default_top_k_exceeds_class_count() {
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();

    let result = detector.predict(&solid([0, 0, 255], 4), wildlife_detector::DEFAULT_TOP_K);

    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn test_probabilities_sum_to_one() {
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();

    let probs = detector.probabilities(&solid([10, 200, 30], 9)).unwrap();

    assert_eq!(probs.len(), 3);
    assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    assert!(probs[1] > probs[0] && probs[1] > probs[2]);
}

#[test]
fn test_predict_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jay.png");
    RgbImage::from_pixel(6, 6, Rgb([0, 0, 255])).save(&path).unwrap();
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();

    let detection = detector.predict_path(&path, 1).unwrap();

    assert_eq!(detection.predictions.len(), 1);
    assert_eq!(detection.top_prediction.species, "Blue Jay");
}

#[test]
fn test_predict_path_missing_image() {
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();
    assert!(detector.predict_path("/nonexistent/owl.jpg", 1).is_err());
}

#[test]
fn test_class_count_mismatch_rejected() {
    let result = WildlifeDetector::new(colour_classifier(4), metadata());
    assert!(matches!(result, Err(Error::Metadata(_))));
}

#[test]
fn test_species_info() {
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();

    let heron = detector.species_info("Green Heron").unwrap();
    assert_eq!((heron.index, heron.category.as_str()), (1, "birds"));

    let fox = detector.species_info("Red Fox").unwrap();
    assert_eq!(fox.category, "mammals");

    assert!(detector.species_info("Snow Leopard").is_none());
}

#[test]
fn test_species_info_without_category() {
    let mut meta = metadata();
    meta.detection_categories.clear();
    let detector = WildlifeDetector::new(colour_classifier(3), meta).unwrap();

    assert_eq!(detector.species_info("Blue Jay").unwrap().category, "unknown");
}

#[test]
fn test_detection_serializes() {
    let detector = WildlifeDetector::new(colour_classifier(3), metadata()).unwrap();
    let detection = detector.predict(&solid([255, 0, 0], 4), 2).unwrap();

    let json = serde_json::to_value(&detection).unwrap();

    assert_eq!(json["top_prediction"]["species"], "Red Fox");
    assert!(json["processing_time_ms"].is_u64());
}

#[cfg(feature = "python")]
#[test]
fn test_python_build_can_load_model_directories() {
    let load: fn(&str) -> wildlife_detector::Result<WildlifeDetector> = |dir| WildlifeDetector::load(dir);
    assert!(load("/nonexistent/model_dir").is_err());
}
