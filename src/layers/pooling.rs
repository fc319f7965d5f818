use crate::{Error, Result, Tensor};
use ndarray::{Array2, Array4, Axis};

use super::{from_nhwc, to_nhwc, window_output, ImageDims};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Padding {
    Valid,
    Same,
}

impl Padding {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "valid" => Ok(Padding::Valid),
            "same" => Ok(Padding::Same),
            _ => Err(Error::Layer(format!("Unknown padding type: {}", s))),
        }
    }
}

/// Pooling window geometry shared by the max and average variants.
#[derive(Debug, Clone)]
struct Window {
    size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
}

impl Window {
    fn new(
        layer: &str,
        size: (usize, usize),
        strides: Option<(usize, usize)>,
        padding: Padding,
    ) -> Result<Self> {
        let strides = strides.unwrap_or(size);
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::Layer(format!("{}: pool_size must be positive, got {:?}", layer, size)));
        }
        if strides.0 == 0 || strides.1 == 0 {
            return Err(Error::Layer(format!("{}: strides must be positive, got {:?}", layer, strides)));
        }
        Ok(Self {
            size,
            strides,
            padding,
        })
    }

    fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        Ok((
            window_output(height, self.size.0, self.strides.0, self.padding)?,
            window_output(width, self.size.1, self.strides.1, self.padding)?,
        ))
    }

    fn leading_padding(&self, height: usize, width: usize, out: (usize, usize)) -> (usize, usize) {
        match self.padding {
            Padding::Valid => (0, 0),
            Padding::Same => {
                let pad_h = (out.0.saturating_sub(1) * self.strides.0 + self.size.0).saturating_sub(height);
                let pad_w = (out.1.saturating_sub(1) * self.strides.1 + self.size.1).saturating_sub(width);
                (pad_h / 2, pad_w / 2)
            }
        }
    }

    /// Reduces every in-bounds window with `reduce`, which receives the
    /// covered values of one channel. Padding never contributes values.
    fn pool<F>(&self, layer: &str, input: &Tensor, reduce: F) -> Result<Tensor>
    where
        F: Fn(&mut dyn Iterator<Item = f32>) -> f32,
    {
        let dims = ImageDims::of(layer, input.shape())?;
        let images = to_nhwc(input, &dims)?;
        let (out_h, out_w) = self.output_size(dims.height, dims.width)?;
        let (pad_top, pad_left) = self.leading_padding(dims.height, dims.width, (out_h, out_w));

        let mut output = Array4::zeros((dims.batch, out_h, out_w, dims.channels));

        for b in 0..dims.batch {
            for oh in 0..out_h {
                let h_start = (oh * self.strides.0).saturating_sub(pad_top);
                let h_end = (oh * self.strides.0 + self.size.0).saturating_sub(pad_top).min(dims.height);
                for ow in 0..out_w {
                    let w_start = (ow * self.strides.1).saturating_sub(pad_left);
                    let w_end = (ow * self.strides.1 + self.size.1).saturating_sub(pad_left).min(dims.width);
                    for c in 0..dims.channels {
                        let mut values = (h_start..h_end)
                            .flat_map(|h| (w_start..w_end).map(move |w| (h, w)))
                            .map(|(h, w)| images[[b, h, w, c]]);
                        output[[b, oh, ow, c]] = reduce(&mut values);
                    }
                }
            }
        }

        from_nhwc(output, &dims.shape_with(out_h, out_w, dims.channels))
    }

    fn output_shape(&self, layer: &str, input_shape: &[usize]) -> Result<Vec<usize>> {
        let dims = ImageDims::of(layer, input_shape)?;
        let (out_h, out_w) = self.output_size(dims.height, dims.width)?;
        Ok(dims.shape_with(out_h, out_w, dims.channels))
    }
}

#[derive(Debug, Clone)]
pub struct MaxPooling2D {
    name: String,
    window: Window,
}

impl MaxPooling2D {
    /// `strides` defaults to `pool_size`, as in Keras.
    pub fn new(
        name: String,
        pool_size: (usize, usize),
        strides: Option<(usize, usize)>,
        padding: Padding,
    ) -> Result<Self> {
        let window = Window::new(&name, pool_size, strides, padding)?;
        Ok(Self { name, window })
    }
}

impl super::Layer for MaxPooling2D {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.window.pool("MaxPooling2D", input, |values| {
            values.fold(f32::NEG_INFINITY, f32::max)
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.window.output_shape("MaxPooling2D", input_shape)
    }
}

#[derive(Debug, Clone)]
pub struct AveragePooling2D {
    name: String,
    window: Window,
}

impl AveragePooling2D {
    pub fn new(
        name: String,
        pool_size: (usize, usize),
        strides: Option<(usize, usize)>,
        padding: Padding,
    ) -> Result<Self> {
        let window = Window::new(&name, pool_size, strides, padding)?;
        Ok(Self { name, window })
    }
}

impl super::Layer for AveragePooling2D {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.window.pool("AveragePooling2D", input, |values| {
            let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f32
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.window.output_shape("AveragePooling2D", input_shape)
    }
}

/// Averages each channel over the full spatial extent, producing
/// `[batch, channels]` (or `[channels]` for an unbatched image). This is the
/// usual bridge between the convolutional stack and the classification head.
#[derive(Debug, Clone)]
pub struct GlobalAveragePooling2D {
    name: String,
}

impl GlobalAveragePooling2D {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

impl super::Layer for GlobalAveragePooling2D {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let dims = ImageDims::of("GlobalAveragePooling2D", input.shape())?;
        if dims.height == 0 || dims.width == 0 {
            return Err(Error::Layer(
                "GlobalAveragePooling2D: empty spatial extent".to_string(),
            ));
        }

        let images = to_nhwc(input, &dims)?;
        let pooled: Array2<f32> = images
            .into_shape_with_order((dims.batch, dims.height * dims.width, dims.channels))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?
            .mean_axis(Axis(1))
            .ok_or_else(|| Error::Layer("GlobalAveragePooling2D: empty input".to_string()))?;

        let tensor = Tensor::new(pooled.into_dyn());
        if dims.batched {
            Ok(tensor)
        } else {
            tensor.into_reshape(&[dims.channels])
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let dims = ImageDims::of("GlobalAveragePooling2D", input_shape)?;
        if dims.batched {
            Ok(vec![dims.batch, dims.channels])
        } else {
            Ok(vec![dims.channels])
        }
    }
}
