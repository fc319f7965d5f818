//! Image to model-input conversion.

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use std::path::Path;

use crate::metadata::{PreprocessingConfig, ResizeMethod};
use crate::{Error, Result, Tensor};

const CHANNELS: usize = 3;

impl ResizeMethod {
    fn filter(self) -> FilterType {
        match self {
            ResizeMethod::Bilinear => FilterType::Triangle,
            ResizeMethod::Nearest => FilterType::Nearest,
        }
    }
}

pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let path = path.as_ref();
    let image = image::open(path)?;
    log::debug!(
        "Decoded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Resizes to the configured size, scales RGB to `[0, 1]` and adds the batch
/// axis. The result is NHWC: `[1, height, width, 3]`. Alpha is dropped.
pub fn preprocess_image(image: &DynamicImage, config: &PreprocessingConfig) -> Result<Tensor> {
    let [height, width] = config.image_size;
    if height == 0 || width == 0 {
        return Err(Error::invalid_input(format!(
            "target image size must be non-zero, got {}x{}",
            height, width
        )));
    }

    let rgb = image.to_rgb8();
    let resized = if rgb.dimensions() == (width, height) {
        rgb
    } else {
        image::imageops::resize(&rgb, width, height, config.resize_method.filter())
    };

    let (h, w) = (height as usize, width as usize);
    let pixels: Vec<f32> = resized.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    let batch = Array4::from_shape_vec((1, h, w, CHANNELS), pixels)
        .map_err(|e| Error::Layer(format!("Image tensor construction failed: {}", e)))?;

    Ok(Tensor::new(batch.into_dyn()))
}
