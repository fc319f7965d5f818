use ndarray::{Array, ArrayD, IxDyn};

use crate::{Error, Result};

/// Dynamic-rank `f32` array flowing between layers.
///
/// Image batches use NHWC layout: `[batch, height, width, channels]`.
#[derive(Clone, Debug)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn from_vec(vec: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != vec.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![vec.len()],
            });
        }

        let data = Array::from_shape_vec(IxDyn(shape), vec)
            .map_err(|e| Error::Layer(format!("Tensor construction failed: {}", e)))?;
        Ok(Self { data })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn into_data(self) -> ArrayD<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self> {
        self.clone().into_reshape(new_shape)
    }

    /// Consuming reshape, avoids the copy when the layout is already standard.
    pub fn into_reshape(self, new_shape: &[usize]) -> Result<Self> {
        let total: usize = new_shape.iter().product();
        if total != self.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![total],
                actual: vec![self.len()],
            });
        }

        let data = self
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(new_shape))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;
        Ok(Self { data })
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Class scores of a single-sample classifier output.
    ///
    /// Accepts `[classes]` or `[1, classes]`; anything else is a shape error
    /// since a batch of several images has no single probability vector.
    pub fn class_scores(&self) -> Result<Vec<f32>> {
        match self.shape() {
            [_] | [1, _] => Ok(self.to_vec()),
            other => Err(Error::ShapeMismatch {
                expected: vec![1, other.last().copied().unwrap_or(0)],
                actual: other.to_vec(),
            }),
        }
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::new(data)
    }
}

impl AsRef<ArrayD<f32>> for Tensor {
    fn as_ref(&self) -> &ArrayD<f32> {
        &self.data
    }
}
