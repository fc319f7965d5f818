//! Layers that only move data around at inference time.

use crate::{Result, Tensor};

/// Collapses everything after the batch axis.
#[derive(Debug, Clone)]
pub struct Flatten {
    name: String,
}

impl Flatten {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

impl super::Layer for Flatten {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if input.shape().is_empty() {
            return Ok(input.clone());
        }
        input.reshape(&self.output_shape(input.shape())?)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(match input_shape {
            [] => vec![1],
            [n] => vec![*n],
            [batch, rest @ ..] => vec![*batch, rest.iter().product()],
        })
    }
}

/// Identity at inference.
#[derive(Debug, Clone)]
pub struct Dropout {
    name: String,
    rate: f32,
}

impl Dropout {
    pub fn new(name: String, rate: f32) -> Self {
        Self { name, rate }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl super::Layer for Dropout {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(input.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }
}
