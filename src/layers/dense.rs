use crate::{activations::Activation, Error, Result, Tensor};
use ndarray::{Array1, Array2, Ix2};

/// Fully connected layer. Accepts `[features]` or `[batch, features]`.
#[derive(Debug, Clone)]
pub struct Dense {
    name: String,
    weights: Array2<f32>,
    bias: Option<Array1<f32>>,
    activation: Activation,
}

impl Dense {
    /// `weights` is `[in_features, units]`, the Keras kernel layout.
    pub fn new(
        name: String,
        weights: Array2<f32>,
        bias: Option<Array1<f32>>,
        activation: Activation,
    ) -> Result<Self> {
        if let Some(ref b) = bias {
            if b.len() != weights.ncols() {
                return Err(Error::Layer(format!(
                    "Bias size {} doesn't match units {}",
                    b.len(),
                    weights.ncols()
                )));
            }
        }

        Ok(Self {
            name,
            weights,
            bias,
            activation,
        })
    }

    pub fn units(&self) -> usize {
        self.weights.ncols()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl super::Layer for Dense {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (batch, features, batched) = match *input.shape() {
            [features] => (1, features, false),
            [batch, features] => (batch, features, true),
            ref other => {
                return Err(Error::Layer(format!(
                    "Dense layer expects 1D or 2D input, got {:?}",
                    other
                )))
            }
        };

        if features != self.weights.nrows() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.weights.nrows()],
                actual: vec![features],
            });
        }

        let rows = input
            .reshape(&[batch, features])?
            .into_data()
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let mut output = rows.dot(&self.weights);
        if let Some(ref bias) = self.bias {
            output += bias;
        }

        let mut tensor = Tensor::new(output.into_dyn());
        if !batched {
            tensor = tensor.into_reshape(&[self.units()])?;
        }
        self.activation.apply(&mut tensor);

        Ok(tensor)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match *input_shape {
            [_] => Ok(vec![self.units()]),
            [batch, _] => Ok(vec![batch, self.units()]),
            _ => Err(Error::Layer(format!(
                "Dense layer expects 1D or 2D input, got {:?}",
                input_shape
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Layer;
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_head_outputs_distribution() {
        let weights = array![[1.0, 0.0, -1.0], [0.0, 2.0, 0.0]];
        let layer = Dense::new("predictions".to_string(), weights, None, Activation::Softmax).unwrap();

        let input = Tensor::from_vec(vec![1.0, 1.0], &[1, 2]).unwrap();
        let output = layer.forward(&input).unwrap();

        assert_eq!(output.shape(), &[1, 3]);
        let probs = output.to_vec();
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn test_bias_length_checked() {
        let weights = array![[1.0, 2.0]];
        let result = Dense::new("d".to_string(), weights, Some(array![0.0]), Activation::Linear);
        assert!(result.is_err());
    }
}
