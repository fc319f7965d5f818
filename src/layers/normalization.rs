use crate::{Error, Result, Tensor};
use ndarray::{Array1, Axis, Zip};

/// Inference-mode batch normalization over the last (channel) axis.
///
/// The moving statistics are folded into a per-channel affine transform at
/// construction: `y = x * scale + shift`.
#[derive(Debug, Clone)]
pub struct BatchNormalization {
    name: String,
    scale: Array1<f32>,
    shift: Array1<f32>,
}

impl BatchNormalization {
    pub fn new(
        name: String,
        gamma: Array1<f32>,
        beta: Array1<f32>,
        moving_mean: Array1<f32>,
        moving_variance: Array1<f32>,
        epsilon: f32,
    ) -> Result<Self> {
        let features = gamma.len();
        for (label, len) in [
            ("beta", beta.len()),
            ("moving_mean", moving_mean.len()),
            ("moving_variance", moving_variance.len()),
        ] {
            if len != features {
                return Err(Error::Layer(format!(
                    "BatchNormalization: {} length {} doesn't match gamma length {}",
                    label, len, features
                )));
            }
        }

        let scale = Zip::from(&gamma)
            .and(&moving_variance)
            .map_collect(|&g, &var| g / (var + epsilon).sqrt());
        let shift = Zip::from(&beta)
            .and(&moving_mean)
            .and(&scale)
            .map_collect(|&b, &mean, &s| b - mean * s);

        Ok(Self { name, scale, shift })
    }
}

impl super::Layer for BatchNormalization {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = input.shape();
        let features = shape.last().copied().unwrap_or(0);
        if features != self.scale.len() {
            return Err(Error::Layer(format!(
                "BatchNormalization: input features {} doesn't match layer features {}",
                features,
                self.scale.len()
            )));
        }

        let mut output = input.clone();
        let last = Axis(shape.len() - 1);
        for mut lane in output.data_mut().lanes_mut(last) {
            Zip::from(&mut lane)
                .and(&self.scale)
                .and(&self.shift)
                .for_each(|x, &s, &t| *x = *x * s + t);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }
}
