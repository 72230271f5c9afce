//! Stateless HTTP analysis endpoints served next to the session socket.

use crate::state::AppState;
use artsensei_core::{AnalysisKind, ImagePayload};
use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Failed to fetch image from URL: {0}")]
    ImageFetch(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ImageFetch(_) => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TextAnalysisRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageAnalysisRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: String,
}

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "ArtSensei Backend is running" }))
}

pub async fn analyze_text(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextAnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text cannot be empty"));
    }

    let analysis = match state.model.generate_text(&request.text).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("text analysis failed: {}", e);
            e.user_message(AnalysisKind::Text).to_string()
        }
    };
    Ok(Json(AnalysisResponse { analysis }))
}

pub async fn analyze_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageAnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    if request.text.trim().is_empty() || request.image_url.trim().is_empty() {
        return Err(ApiError::BadRequest("Text and image_url cannot be empty"));
    }
    let url = request.image_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::BadRequest("Invalid image_url format"));
    }

    let image = fetch_image(&state.http, url).await?;
    info!(
        "fetched {} bytes of {} for analysis",
        image.data().len(),
        image.mime_type()
    );

    let analysis = match state.model.analyze_image(&image, &request.text).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("image analysis failed: {}", e);
            e.user_message(AnalysisKind::Image).to_string()
        }
    };
    Ok(Json(AnalysisResponse { analysis }))
}

async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<ImagePayload, ApiError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| ApiError::ImageFetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ApiError::ImageFetch(format!("status {}", response.status())));
    }

    let mime_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

    let data = response
        .bytes()
        .await
        .map_err(|e| ApiError::ImageFetch(e.to_string()))?;
    if data.is_empty() {
        return Err(ApiError::ImageFetch("empty body".to_string()));
    }
    Ok(ImagePayload::new(mime_type, data))
}
