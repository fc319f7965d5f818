use crate::{activations::Activation, Error, Result, Tensor};
use ndarray::{Array2, Array4};

use super::{from_nhwc, to_nhwc, window_output, ImageDims, Padding};

#[derive(Debug, Clone)]
pub struct Conv2D {
    name: String,
    filters: usize,
    kernel_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    /// Kernel flattened to `[kh * kw * in_channels, filters]`, matching the
    /// column order produced by `im2col`.
    kernel: Array2<f32>,
    in_channels: usize,
    bias: Option<Vec<f32>>,
    activation: Activation,
}

impl Conv2D {
    /// `weights` uses the Keras layout `[kh, kw, in_channels, filters]`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        filters: usize,
        kernel_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        weights: Array4<f32>,
        bias: Option<Vec<f32>>,
        activation: Activation,
    ) -> Result<Self> {
        let (kh, kw, in_channels, out) = weights.dim();
        if (kh, kw) != kernel_size || out != filters {
            return Err(Error::ShapeMismatch {
                expected: vec![kernel_size.0, kernel_size.1, in_channels, filters],
                actual: vec![kh, kw, in_channels, out],
            });
        }
        if strides.0 == 0 || strides.1 == 0 {
            return Err(Error::Layer(format!("{}: strides must be positive", name)));
        }
        if let Some(ref b) = bias {
            if b.len() != filters {
                return Err(Error::Layer(format!(
                    "Bias size {} doesn't match filters {}",
                    b.len(),
                    filters
                )));
            }
        }

        let kernel = weights
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((kh * kw * in_channels, filters))
            .map_err(|e| Error::Layer(format!("Kernel reshape failed: {}", e)))?;

        Ok(Self {
            name,
            filters,
            kernel_size,
            strides,
            padding,
            kernel,
            in_channels,
            bias,
            activation,
        })
    }

    fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        Ok((
            window_output(height, self.kernel_size.0, self.strides.0, self.padding)?,
            window_output(width, self.kernel_size.1, self.strides.1, self.padding)?,
        ))
    }

    /// Leading (top, left) padding; Keras puts the odd pixel at the end.
    fn leading_padding(&self, height: usize, width: usize, out: (usize, usize)) -> (usize, usize) {
        match self.padding {
            Padding::Valid => (0, 0),
            Padding::Same => {
                let pad_h = (out.0.saturating_sub(1) * self.strides.0 + self.kernel_size.0).saturating_sub(height);
                let pad_w = (out.1.saturating_sub(1) * self.strides.1 + self.kernel_size.1).saturating_sub(width);
                (pad_h / 2, pad_w / 2)
            }
        }
    }
}

impl super::Layer for Conv2D {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let dims = ImageDims::of("Conv2D", input.shape())?;
        if dims.channels != self.in_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![self.in_channels],
                actual: vec![dims.channels],
            });
        }

        let images = to_nhwc(input, &dims)?;
        let (out_h, out_w) = self.output_size(dims.height, dims.width)?;
        let (pad_top, pad_left) = self.leading_padding(dims.height, dims.width, (out_h, out_w));

        let columns = im2col(
            &images,
            self.kernel_size,
            self.strides,
            (pad_top, pad_left),
            (out_h, out_w),
        );
        let mut product = columns.dot(&self.kernel);

        if let Some(ref bias) = self.bias {
            for mut row in product.rows_mut() {
                row.iter_mut().zip(bias).for_each(|(v, b)| *v += b);
            }
        }

        let output = product
            .into_shape_with_order((dims.batch, out_h, out_w, self.filters))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let mut tensor = from_nhwc(output, &dims.shape_with(out_h, out_w, self.filters))?;
        self.activation.apply(&mut tensor);
        Ok(tensor)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let dims = ImageDims::of("Conv2D", input_shape)?;
        let (out_h, out_w) = self.output_size(dims.height, dims.width)?;
        Ok(dims.shape_with(out_h, out_w, self.filters))
    }
}

/// Unfolds every receptive field into one row so the convolution becomes a
/// single matrix product. Rows are ordered `(batch, oh, ow)`, columns
/// `(kh, kw, channel)`. Out-of-bounds taps stay zero.
fn im2col(
    input: &Array4<f32>,
    kernel: (usize, usize),
    strides: (usize, usize),
    pad: (usize, usize),
    out: (usize, usize),
) -> Array2<f32> {
    let (batch, height, width, channels) = input.dim();
    let mut columns = Array2::zeros((batch * out.0 * out.1, kernel.0 * kernel.1 * channels));

    for b in 0..batch {
        for oh in 0..out.0 {
            for ow in 0..out.1 {
                let row = (b * out.0 + oh) * out.1 + ow;
                for kh in 0..kernel.0 {
                    let ih = (oh * strides.0 + kh).wrapping_sub(pad.0);
                    if ih >= height {
                        continue;
                    }
                    for kw in 0..kernel.1 {
                        let iw = (ow * strides.1 + kw).wrapping_sub(pad.1);
                        if iw >= width {
                            continue;
                        }
                        let col = (kh * kernel.1 + kw) * channels;
                        for c in 0..channels {
                            columns[[row, col + c]] = input[[b, ih, iw, c]];
                        }
                    }
                }
            }
        }
    }

    columns
}
