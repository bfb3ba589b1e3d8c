//! API Routes
//!
//! - `/api/health` - Health check
//! - `/api/sessions` - Dataset upload, questions and conversation log
//! - `/charts` - Rendered chart images

pub mod health;
pub mod sessions;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::models::{AppState, ErrorResponse};
use crate::types::AppError;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    let charts = ServeDir::new(&state.config.pipeline.charts_dir);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(sessions::router(state))
        .nest_service("/charts", charts)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    layer.allow_origin(origins)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) | AppError::Dataset(_) | AppError::Csv(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::LLMApi(_) | AppError::QueryAgent(_) => StatusCode::BAD_GATEWAY,
            AppError::Chart(_) | AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        } else {
            warn!(status = %status, error = %self, "Request rejected");
        }

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
