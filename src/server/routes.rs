//! HTTP request handlers

use std::collections::BTreeMap;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::server::state::SharedState;

/// Error response carrying a status code and a `detail` message body
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Serialize)]
pub struct EndpointList {
    pub analyze: String,
    pub health: String,
}

#[derive(Serialize)]
pub struct ModelInfo {
    pub input_shape: String,
    pub output_shape: String,
    pub parameters: usize,
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub model_source: String,
    pub endpoints: EndpointList,
    pub model_info: ModelInfo,
}

/// GET / - Service banner
pub async fn root(State(state): State<SharedState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Tomato Disease Classifier API".to_string(),
        version: crate::VERSION.to_string(),
        model_source: state.model_source.clone(),
        endpoints: EndpointList {
            analyze: "/api/analyze (POST with image file)".to_string(),
            health: "/health (GET)".to_string(),
        },
        model_info: ModelInfo {
            input_shape: state.model.input_shape(),
            output_shape: state.model.output_shape(),
            parameters: state.model.num_params(),
        },
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Always true: the architecture is built unconditionally at startup.
    /// Kept for wire compatibility with existing clients; `weights_loaded`
    /// is the honest signal.
    pub model_loaded: bool,
    /// True only when every parameterized layer came from the container
    pub weights_loaded: bool,
    /// How many parameterized layers were assigned from the container
    pub layers_loaded: usize,
    pub model_params: usize,
    pub model_source: String,
}

/// GET /health - Health check with degraded-mode reporting
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: true,
        weights_loaded: state.report.fully_loaded(),
        layers_loaded: state.report.layers_loaded(),
        model_params: state.model.num_params(),
        model_source: "h5_weights".to_string(),
    })
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub disease: String,
    pub confidence: f64,
    pub is_healthy: bool,
    pub predicted_class_index: usize,
    pub all_probabilities: BTreeMap<String, f64>,
    pub message: String,
    pub model_source: String,
}

/// POST /api/analyze - Classify one uploaded leaf image
///
/// Expects a multipart upload with a `file` field whose content type
/// starts with `image/`. Decode or inference failures surface as 500 with
/// the error text; anything wrong with the upload itself is a 400.
pub async fn analyze(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(ApiError::bad_request("Missing 'file' upload field")),
            Err(err) => {
                return Err(ApiError::bad_request(format!("Invalid multipart body: {err}")))
            }
        }
    };

    let content_type = field.content_type().unwrap_or_default().to_string();
    if !content_type.starts_with("image/") {
        return Err(ApiError::bad_request("File must be an image"));
    }

    let bytes = field
        .bytes()
        .await
        .map_err(|err| ApiError::bad_request(format!("Failed to read upload: {err}")))?;

    // The forward pass is CPU-bound; keep it off the async workers
    let task_state = state.clone();
    let prediction = tokio::task::spawn_blocking(move || task_state.predictor.predict_bytes(&bytes))
        .await
        .map_err(|err| ApiError::internal(format!("Error: {err}")))?
        .map_err(|err| ApiError::internal(format!("Error: {err}")))?;

    Ok(Json(AnalyzeResponse {
        disease: prediction.class_name.clone(),
        confidence: prediction.confidence_percent(),
        is_healthy: prediction.is_healthy,
        predicted_class_index: prediction.predicted_class,
        all_probabilities: prediction.probability_percentages(),
        message: "Analysis complete".to_string(),
        model_source: format!("{} (trained)", state.model_source),
    }))
}
