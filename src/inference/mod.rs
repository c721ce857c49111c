//! Inference module for image preprocessing and prediction

pub mod predictor;

pub use predictor::{Prediction, Predictor};
