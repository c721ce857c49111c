//! Image preprocessing and single-image prediction
//!
//! Preprocessing mirrors what the training pipeline did: force to RGB,
//! resize to the network's fixed spatial input size, and scale pixel values
//! to the unit interval. Whatever the source image's dimensions or color
//! mode, the network always sees a `[128, 128, 3]` array in `[0, 1]`.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array1, Array3};
use serde::Serialize;

use crate::classes::{class_name, is_healthy_class, CLASS_NAMES};
use crate::model::cnn::TomatoClassifier;
use crate::utils::error::{ClassifierError, Result};
use crate::IMAGE_SIZE;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Predicted class index (argmax)
    pub predicted_class: usize,
    /// Predicted class name
    pub class_name: String,
    /// Probability of the predicted class, in `[0, 1]`
    pub confidence: f32,
    /// Whether the predicted class is the healthy one
    pub is_healthy: bool,
    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,
}

impl Prediction {
    fn from_probabilities(probabilities: Array1<f32>) -> Self {
        let (predicted_class, confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, &p)| (i, p))
            .unwrap_or((0, 0.0));

        Self {
            predicted_class,
            class_name: class_name(predicted_class).unwrap_or("Unknown").to_string(),
            confidence,
            is_healthy: is_healthy_class(predicted_class),
            probabilities: probabilities.to_vec(),
        }
    }

    /// Confidence as a percentage, rounded to two decimals
    pub fn confidence_percent(&self) -> f64 {
        round_percent(self.confidence)
    }

    /// Class name -> rounded percentage probability, for every class
    pub fn probability_percentages(&self) -> BTreeMap<String, f64> {
        CLASS_NAMES
            .iter()
            .zip(self.probabilities.iter())
            .map(|(name, &p)| (name.to_string(), round_percent(p)))
            .collect()
    }
}

fn round_percent(p: f32) -> f64 {
    (f64::from(p) * 10_000.0).round() / 100.0
}

/// Predictor for running inference with the shared model instance
pub struct Predictor {
    model: Arc<TomatoClassifier>,
    image_size: u32,
}

impl Predictor {
    pub fn new(model: Arc<TomatoClassifier>) -> Self {
        Self {
            model,
            image_size: IMAGE_SIZE as u32,
        }
    }

    /// Decode, force RGB, resize, and scale to `[0, 1]`
    pub fn preprocess(&self, image: &DynamicImage) -> Array3<f32> {
        let resized = image.resize_exact(self.image_size, self.image_size, FilterType::Lanczos3);
        let rgb = resized.to_rgb8();

        let size = self.image_size as usize;
        let mut array = Array3::zeros((size, size, 3));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                array[[y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
            }
        }
        array
    }

    /// Run one forward pass on a decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Prediction {
        let input = self.preprocess(image);
        Prediction::from_probabilities(self.model.forward(&input))
    }

    /// Decode raw upload bytes and predict
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = image::load_from_memory(bytes)
            .map_err(|err| ClassifierError::ImageDecode(err.to_string()))?;
        Ok(self.predict_image(&image))
    }
}
