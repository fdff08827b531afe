//! Request-boundary errors
//!
//! Collaborator errors (`StravaError`, `LlmError`, `PreferencesError`,
//! `sqlx::Error`) are converted here. The cause is logged, the caller gets a
//! short message and a machine-readable status code.

use crate::llm::LlmError;
use crate::models::PreferencesError;
use crate::strava::StravaError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  /// An upstream account or credential is missing
  #[error("{0} is not connected")]
  NotConnected(&'static str),

  #[error("{0} not found")]
  NotFound(String),

  #[error("{0}")]
  InvalidInput(String),

  /// An external service failed; the message is safe to show
  #[error("{0}")]
  Upstream(String),

  #[error("Database error")]
  Database(#[from] sqlx::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotConnected(_) => StatusCode::CONFLICT,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
      ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
      ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      ApiError::NotConnected(_) => "not_connected",
      ApiError::NotFound(_) => "not_found",
      ApiError::InvalidInput(_) => "invalid_input",
      ApiError::Upstream(_) => "upstream_error",
      ApiError::Database(_) => "internal_error",
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if let ApiError::Database(ref cause) = self {
      tracing::error!(error = %cause, "Database failure");
    }

    let body = Json(json!({
      "error": self.to_string(),
      "status": self.code(),
    }));
    (self.status(), body).into_response()
  }
}

impl From<StravaError> for ApiError {
  fn from(err: StravaError) -> Self {
    match err {
      StravaError::NotAuthenticated | StravaError::MissingConfig(_) => {
        tracing::info!(reason = %err, "Strava not connected");
        ApiError::NotConnected("Strava")
      }
      StravaError::Database(cause) => ApiError::Database(cause),
      other => {
        tracing::error!(error = %other, "Strava request failed");
        ApiError::Upstream("Strava request failed, please try again".to_string())
      }
    }
  }
}

impl From<LlmError> for ApiError {
  fn from(err: LlmError) -> Self {
    match err {
      LlmError::MissingApiKey => ApiError::NotConnected("AI coach"),
      other => {
        tracing::error!(error = %other, "Claude request failed");
        ApiError::Upstream("The AI coach is unavailable right now".to_string())
      }
    }
  }
}

impl From<PreferencesError> for ApiError {
  fn from(err: PreferencesError) -> Self {
    ApiError::InvalidInput(err.to_string())
  }
}
