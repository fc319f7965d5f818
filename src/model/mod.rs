#[cfg(feature = "keras")]
mod loader;

use crate::{layers::Layer, Error, Result, Tensor};

/// A Keras-style Sequential image classifier.
#[derive(Debug)]
pub struct Classifier {
    name: String,
    layers: Vec<Box<dyn Layer>>,
    input_shape: Option<Vec<usize>>,
}

impl Classifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            input_shape: None,
        }
    }

    /// Loads a `.keras` archive (`config.json` + `model.weights.h5`).
    #[cfg(feature = "keras")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        loader::load_from_keras(path.as_ref())
    }

    pub fn add(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn with_input_shape(mut self, shape: Vec<usize>) -> Self {
        self.set_input_shape(shape);
        self
    }

    pub fn set_input_shape(&mut self, shape: Vec<usize>) {
        self.input_shape = Some(shape);
    }

    /// Per-sample input shape (`[height, width, channels]`), when known.
    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    pub fn predict(&self, input: &Tensor) -> Result<Tensor> {
        let (first, rest) = self
            .layers
            .split_first()
            .ok_or_else(|| Error::ModelLoad("Cannot predict with empty model".to_string()))?;

        let mut current = first
            .forward(input)
            .map_err(|e| Error::Layer(format!("Layer 0 ({}): {}", first.name(), e)))?;

        for (idx, layer) in rest.iter().enumerate() {
            current = layer
                .forward(&current)
                .map_err(|e| Error::Layer(format!("Layer {} ({}): {}", idx + 1, layer.name(), e)))?;
        }

        Ok(current)
    }

    /// Runs one preprocessed image (`[1, H, W, C]`) and returns its class
    /// scores, one per class.
    pub fn predict_probabilities(&self, image: &Tensor) -> Result<Vec<f32>> {
        self.predict(image)?.class_scores()
    }

    /// Number of classes the model emits, derived from the input shape.
    pub fn num_classes(&self) -> Option<usize> {
        let input = self.input_shape.as_ref()?;
        let mut batched = Vec::with_capacity(input.len() + 1);
        batched.push(1);
        batched.extend_from_slice(input);
        self.output_shape(&batched).ok()?.last().copied()
    }

    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.layers
            .iter()
            .try_fold(input_shape.to_vec(), |shape, layer| layer.output_shape(&shape))
    }

    pub fn summary(&self) -> String {
        let rule = "_".repeat(65);
        let double = "=".repeat(65);
        let mut lines = vec![
            format!("Model: {}", self.name),
            rule,
            format!("{:28} {}", "Layer", "Output Shape"),
            double.clone(),
        ];

        let mut shape = self.input_shape.clone().map(|s| {
            let mut batched = vec![1];
            batched.extend(s);
            batched
        });
        for layer in &self.layers {
            shape = shape.and_then(|s| layer.output_shape(&s).ok());
            let shown = shape
                .as_ref()
                .map(|s| format!("{:?}", s))
                .unwrap_or_else(|| "?".to_string());
            lines.push(format!("{:28} {}", layer.name(), shown));
        }

        lines.push(double);
        lines.push(format!("Total layers: {}", self.layers.len()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{activations::Activation, layers::Dense};
    use ndarray::array;

    fn two_layer_model() -> Classifier {
        let mut model = Classifier::new("test_model").with_input_shape(vec![2]);
        model.add(Box::new(
            Dense::new("hidden".to_string(), array![[1.0, 0.5], [0.5, 1.0]], None, Activation::ReLU)
                .unwrap(),
        ));
        model.add(Box::new(
            Dense::new(
                "predictions".to_string(),
                array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                None,
                Activation::Softmax,
            )
            .unwrap(),
        ));
        model
    }

    #[test]
    fn test_predict_probabilities() {
        let model = two_layer_model();
        let input = Tensor::from_vec(vec![1.0, 2.0], &[1, 2]).unwrap();

        let probs = model.predict_probabilities(&input).unwrap();

        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_num_classes_from_input_shape() {
        assert_eq!(two_layer_model().num_classes(), Some(3));
        assert_eq!(Classifier::new("no_shape").num_classes(), None);
    }

    #[test]
    fn test_empty_model_cannot_predict() {
        let model = Classifier::new("empty");
        assert!(model.predict(&Tensor::zeros(&[1, 2])).is_err());
    }

    #[test]
    fn test_summary_lists_layers() {
        let summary = two_layer_model().summary();
        assert!(summary.contains("hidden"));
        assert!(summary.contains("[1, 3]"));
        assert!(summary.contains("Total layers: 2"));
    }

    #[test]
    fn test_batch_of_two_has_no_single_score_vector() {
        let model = two_layer_model();
        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        assert!(model.predict_probabilities(&input).is_err());
    }
}
