//! Shared application state
//!
//! The model is built and weight-loaded once at startup, then shared
//! read-only across all requests. Nothing here is mutated after
//! construction, so handlers need no locking.

use std::sync::Arc;

use crate::inference::predictor::Predictor;
use crate::model::cnn::TomatoClassifier;
use crate::model::weights::WeightLoadReport;

/// Immutable-after-init service context passed to request handlers
pub struct AppState {
    /// The shared network instance
    pub model: Arc<TomatoClassifier>,
    /// Predictor bound to the shared model
    pub predictor: Predictor,
    /// Outcome of the startup weight load
    pub report: WeightLoadReport,
    /// Label describing where the weights came from (container file name)
    pub model_source: String,
}

impl AppState {
    pub fn new(
        model: Arc<TomatoClassifier>,
        report: WeightLoadReport,
        model_source: impl Into<String>,
    ) -> Self {
        Self {
            predictor: Predictor::new(model.clone()),
            model,
            report,
            model_source: model_source.into(),
        }
    }
}

pub type SharedState = Arc<AppState>;
