use crate::{Error, Result, Tensor};
use ndarray::{ArrayD, Axis};

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Linear,
    ReLU,
    Sigmoid,
    Tanh,
    Softmax,
    ELU,
    SELU,
    LeakyReLU { alpha: f32 },
}

impl Activation {
    /// Parses the activation name Keras writes into `config.json`.
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" | "none" => Ok(Activation::Linear),
            "relu" => Ok(Activation::ReLU),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "softmax" => Ok(Activation::Softmax),
            "elu" => Ok(Activation::ELU),
            "selu" => Ok(Activation::SELU),
            "leaky_relu" => Ok(Activation::LeakyReLU { alpha: 0.3 }),
            _ => Err(Error::UnsupportedActivation(s.to_string())),
        }
    }

    pub fn apply(&self, tensor: &mut Tensor) {
        let data = tensor.data_mut();
        match *self {
            Activation::Linear => {}
            Activation::ReLU => data.mapv_inplace(|x| x.max(0.0)),
            Activation::Sigmoid => data.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            Activation::Tanh => data.mapv_inplace(f32::tanh),
            Activation::ELU => data.mapv_inplace(|x| if x < 0.0 { x.exp() - 1.0 } else { x }),
            Activation::SELU => data.mapv_inplace(|x| {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * (x.exp() - 1.0)
                }
            }),
            Activation::LeakyReLU { alpha } => {
                data.mapv_inplace(|x| if x < 0.0 { alpha * x } else { x })
            }
            Activation::Softmax => softmax_last_axis(data),
        }
    }
}

// Max-shifted so large logits do not overflow `exp`.
fn softmax_last_axis(data: &mut ArrayD<f32>) {
    if data.ndim() == 0 || data.is_empty() {
        return;
    }

    let last = Axis(data.ndim() - 1);
    for mut lane in data.lanes_mut(last) {
        let max = lane.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        lane.mapv_inplace(|x| (x - max).exp());
        let sum = lane.sum();
        if sum > 0.0 {
            lane.mapv_inplace(|x| x / sum);
        }
    }
}
