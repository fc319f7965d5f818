pub mod conv;
pub mod dense;
pub mod normalization;
pub mod pooling;
pub mod reshape;

use crate::{Error, Result, Tensor};
use ndarray::{Array4, IxDyn};

pub trait Layer: std::fmt::Debug + Send + Sync {
    fn forward(&self, input: &Tensor) -> Result<Tensor>;
    fn name(&self) -> &str;
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>>;
}

pub use conv::Conv2D;
pub use dense::Dense;
pub use normalization::BatchNormalization;
pub use pooling::{AveragePooling2D, GlobalAveragePooling2D, MaxPooling2D, Padding};
pub use reshape::{Dropout, Flatten};

/// Spatial dimensions of an image tensor, with or without the batch axis.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ImageDims {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub batched: bool,
}

impl ImageDims {
    pub fn of(layer: &str, shape: &[usize]) -> Result<Self> {
        match *shape {
            [batch, height, width, channels] => Ok(Self {
                batch,
                height,
                width,
                channels,
                batched: true,
            }),
            [height, width, channels] => Ok(Self {
                batch: 1,
                height,
                width,
                channels,
                batched: false,
            }),
            _ => Err(Error::Layer(format!(
                "{} expects 3D or 4D input, got {:?}",
                layer, shape
            ))),
        }
    }

    /// Output shape with the same batching as the input.
    pub fn shape_with(&self, height: usize, width: usize, channels: usize) -> Vec<usize> {
        if self.batched {
            vec![self.batch, height, width, channels]
        } else {
            vec![height, width, channels]
        }
    }
}

pub(crate) fn to_nhwc(input: &Tensor, dims: &ImageDims) -> Result<Array4<f32>> {
    input
        .data()
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((dims.batch, dims.height, dims.width, dims.channels))
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))
}

pub(crate) fn from_nhwc(output: Array4<f32>, shape: &[usize]) -> Result<Tensor> {
    output
        .into_shape_with_order(IxDyn(shape))
        .map(Tensor::new)
        .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))
}

/// Spatial output size for a window sliding over `size` pixels.
pub(crate) fn window_output(
    size: usize,
    window: usize,
    stride: usize,
    padding: Padding,
) -> Result<usize> {
    if window == 0 || stride == 0 {
        return Err(Error::Layer(format!(
            "Window {} and stride {} must be positive",
            window, stride
        )));
    }
    match padding {
        Padding::Valid => {
            if size < window {
                return Err(Error::Layer(format!(
                    "Window {} larger than input {} with valid padding",
                    window, size
                )));
            }
            Ok((size - window) / stride + 1)
        }
        Padding::Same => Ok(size.div_ceil(stride)),
    }
}
