//! Model module: layer primitives, network topology, and weight loading
//!
//! The network is inference-only. All feature maps use channels-last (HWC)
//! layout so that weight arrays from a Keras-trained container apply without
//! axis permutation.

pub mod cnn;
pub mod layers;
pub mod weights;

pub use cnn::{LayerSpec, TomatoClassifier};
pub use layers::{BatchNorm, Conv2d, Dense, LoadError, MaxPool2d};
pub use weights::{load_weights_best_effort, LayerOutcome, WeightLoadReport};
