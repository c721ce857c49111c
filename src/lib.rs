//! # Tomato Disease Classifier
//!
//! A Rust service for classifying tomato leaf diseases from photographs.
//! A fixed convolutional network is built at startup, populated from a
//! Keras-style HDF5 weight container, and served behind an HTTP API.
//!
//! ## Features
//!
//! - **Best-effort weight load**: the service always comes up, even when the
//!   weight container is missing or partially mismatched; the degraded state
//!   is reported through `/health`
//! - **Forward-only CNN** over `ndarray` in channels-last layout, so Keras
//!   weight arrays are consumed without axis permutation
//! - **Single shared model instance**, immutable after startup
//!
//! ## Modules
//!
//! - `classes`: the 10 fixed tomato disease class labels
//! - `model`: layer primitives, the network topology, and the weight loader
//! - `inference`: image preprocessing and prediction
//! - `server`: HTTP routes and shared application state
//! - `utils`: logging and error types

pub mod classes;
pub mod inference;
pub mod model;
pub mod server;
pub mod utils;

// Re-export commonly used items for convenience
pub use classes::{class_name, class_index, is_healthy_class, CLASS_NAMES, NUM_CLASSES};
pub use inference::predictor::{Prediction, Predictor};
pub use model::cnn::TomatoClassifier;
pub use model::weights::{load_weights_best_effort, LayerOutcome, WeightLoadReport};
pub use utils::error::{ClassifierError, Result};

/// Spatial input size of the network (square images)
pub const IMAGE_SIZE: usize = 128;

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
