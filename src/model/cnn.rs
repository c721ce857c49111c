//! CNN architecture for tomato leaf disease classification
//!
//! The topology is fixed and must match the training run that produced the
//! weight container exactly, because the weight loader matches layers by
//! name and shape, not by semantic role:
//!
//! - 3 stages of (conv 3x3 "same" + ReLU -> batch norm -> max pool 2x2)
//!   at 32, 64, and 128 channels
//! - flatten, dropout, dense(128, ReLU), dropout, dense(10, softmax)
//!
//! Dropout layers are inference no-ops; they appear only as named,
//! weightless entries in the layer table so the loader can walk the network
//! in declaration order.

use ndarray::{Array1, Array3, ArrayD};

use crate::classes::NUM_CLASSES;
use crate::model::layers::{
    check_shapes, flatten, softmax, BatchNorm, Conv2d, Dense, LoadError, MaxPool2d,
};
use crate::IMAGE_SIZE;

/// One entry of the network's layer table: the layer's container name and
/// the exact shapes of its parameter tensors in declaration order (empty
/// for weightless layers).
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub name: &'static str,
    pub param_shapes: Vec<Vec<usize>>,
}

/// Tomato leaf disease classifier
///
/// Input is a `[128, 128, 3]` channels-last image scaled to `[0, 1]`;
/// output is a softmax probability vector over the 10 classes.
pub struct TomatoClassifier {
    // Fields are public for the weight loader and tests
    pub conv1: Conv2d,
    pub bn1: BatchNorm,
    pub pool1: MaxPool2d,

    pub conv2: Conv2d,
    pub bn2: BatchNorm,
    pub pool2: MaxPool2d,

    pub conv3: Conv2d,
    pub bn3: BatchNorm,
    pub pool3: MaxPool2d,

    pub fc1: Dense,
    pub fc2: Dense,
}

impl TomatoClassifier {
    /// Build the network with initialization-time parameters
    pub fn new() -> Self {
        // Three pooling stages: 128 -> 64 -> 32 -> 16
        let flat_features = (IMAGE_SIZE / 8) * (IMAGE_SIZE / 8) * 128;

        Self {
            conv1: Conv2d::new(3, 32, 3, true),
            bn1: BatchNorm::new(32),
            pool1: MaxPool2d::new(2),

            conv2: Conv2d::new(32, 64, 3, true),
            bn2: BatchNorm::new(64),
            pool2: MaxPool2d::new(2),

            conv3: Conv2d::new(64, 128, 3, true),
            bn3: BatchNorm::new(128),
            pool3: MaxPool2d::new(2),

            fc1: Dense::new(flat_features, 128, true),
            fc2: Dense::new(128, NUM_CLASSES, false),
        }
    }

    /// Forward pass: `[128, 128, 3]` -> softmax probabilities `[10]`
    ///
    /// ReLU runs before batch norm because the original training graph
    /// fused the activation into each convolution.
    pub fn forward(&self, input: &Array3<f32>) -> Array1<f32> {
        let x = self.pool1.forward(&self.bn1.forward(&self.conv1.forward(input)));
        let x = self.pool2.forward(&self.bn2.forward(&self.conv2.forward(&x)));
        let x = self.pool3.forward(&self.bn3.forward(&self.conv3.forward(&x)));

        let x = flatten(&x);
        let x = self.fc1.forward(&x);
        let logits = self.fc2.forward(&x);

        softmax(&logits)
    }

    /// The network's layer table in Keras declaration order.
    ///
    /// Names follow the Keras auto-naming scheme of the training run; the
    /// weight loader walks this table against the container's recorded
    /// layer names.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        vec![
            LayerSpec { name: "conv2d", param_shapes: self.conv1.param_shapes() },
            LayerSpec { name: "batch_normalization", param_shapes: self.bn1.param_shapes() },
            LayerSpec { name: "max_pooling2d", param_shapes: Vec::new() },
            LayerSpec { name: "conv2d_1", param_shapes: self.conv2.param_shapes() },
            LayerSpec { name: "batch_normalization_1", param_shapes: self.bn2.param_shapes() },
            LayerSpec { name: "max_pooling2d_1", param_shapes: Vec::new() },
            LayerSpec { name: "conv2d_2", param_shapes: self.conv3.param_shapes() },
            LayerSpec { name: "batch_normalization_2", param_shapes: self.bn3.param_shapes() },
            LayerSpec { name: "max_pooling2d_2", param_shapes: Vec::new() },
            LayerSpec { name: "flatten", param_shapes: Vec::new() },
            LayerSpec { name: "dropout", param_shapes: Vec::new() },
            LayerSpec { name: "dense", param_shapes: self.fc1.param_shapes() },
            LayerSpec { name: "dropout_1", param_shapes: Vec::new() },
            LayerSpec { name: "dense_1", param_shapes: self.fc2.param_shapes() },
        ]
    }

    /// Assign an ordered list of stored tensors to one layer by name.
    ///
    /// The count and every shape must match the layer's declared parameter
    /// slots exactly, or nothing is assigned.
    pub fn apply_weights(
        &mut self,
        layer: &str,
        arrays: Vec<ArrayD<f32>>,
    ) -> Result<(), LoadError> {
        match layer {
            "conv2d" => self.conv1.load(arrays),
            "batch_normalization" => self.bn1.load(arrays),
            "conv2d_1" => self.conv2.load(arrays),
            "batch_normalization_1" => self.bn2.load(arrays),
            "conv2d_2" => self.conv3.load(arrays),
            "batch_normalization_2" => self.bn3.load(arrays),
            "dense" => self.fc1.load(arrays),
            "dense_1" => self.fc2.load(arrays),
            "max_pooling2d" | "max_pooling2d_1" | "max_pooling2d_2" | "flatten" | "dropout"
            | "dropout_1" => check_shapes(&arrays, &[]),
            other => Err(LoadError::UnknownLayer(other.to_string())),
        }
    }

    /// Total parameter count across all layers (trainable and not)
    pub fn num_params(&self) -> usize {
        self.conv1.num_params()
            + self.bn1.num_params()
            + self.conv2.num_params()
            + self.bn2.num_params()
            + self.conv3.num_params()
            + self.bn3.num_params()
            + self.fc1.num_params()
            + self.fc2.num_params()
    }

    /// Keras-style input shape string
    pub fn input_shape(&self) -> String {
        format!("(None, {}, {}, 3)", IMAGE_SIZE, IMAGE_SIZE)
    }

    /// Keras-style output shape string
    pub fn output_shape(&self) -> String {
        format!("(None, {})", NUM_CLASSES)
    }
}

impl Default for TomatoClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_forward_output_shape_and_sum() {
        let model = TomatoClassifier::new();
        let input = Array3::from_elem((IMAGE_SIZE, IMAGE_SIZE, 3), 0.5);

        let probs = model.forward(&input);

        assert_eq!(probs.len(), NUM_CLASSES);
        assert!((probs.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fresh_model_is_uniform() {
        // Zero-initialized kernels produce all-zero logits
        let model = TomatoClassifier::new();
        let input = Array3::from_elem((IMAGE_SIZE, IMAGE_SIZE, 3), 1.0);

        let probs = model.forward(&input);

        for &p in probs.iter() {
            assert!((p - 1.0 / NUM_CLASSES as f32).abs() < 1e-6);
        }
    }

    #[test]
    fn test_num_params_matches_training_run() {
        let model = TomatoClassifier::new();
        assert_eq!(model.num_params(), 4_289_866);
    }

    #[test]
    fn test_layer_specs_order() {
        let model = TomatoClassifier::new();
        let specs = model.layer_specs();

        assert_eq!(specs.len(), 14);
        assert_eq!(specs[0].name, "conv2d");
        assert_eq!(specs[0].param_shapes, vec![vec![3, 3, 3, 32], vec![32]]);
        assert_eq!(specs[1].param_shapes.len(), 4);
        assert_eq!(specs[11].name, "dense");
        assert_eq!(specs[11].param_shapes[0], vec![32768, 128]);
        assert_eq!(specs[13].name, "dense_1");
        assert_eq!(specs[13].param_shapes, vec![vec![128, 10], vec![10]]);
    }

    #[test]
    fn test_apply_weights_unknown_layer() {
        let mut model = TomatoClassifier::new();
        let err = model.apply_weights("conv2d_9", Vec::new()).unwrap_err();
        assert_eq!(err, LoadError::UnknownLayer("conv2d_9".to_string()));
    }

    #[test]
    fn test_apply_weights_stateless_rejects_tensors() {
        let mut model = TomatoClassifier::new();
        let err = model
            .apply_weights("flatten", vec![ndarray::ArrayD::zeros(vec![1])])
            .unwrap_err();
        assert_eq!(err, LoadError::ParamCount { expected: 0, found: 1 });
    }
}
