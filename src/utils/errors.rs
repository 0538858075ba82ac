//! Sistema de manejo de errores
//!
//! Este módulo define los tipos de errores del despacho
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Falla del backend (sistema de registro); recuperable por el operador
    #[error("External API error: {0}")]
    ExternalApi(String),
}

impl AppError {
    /// Fallas de I/O transitorias que la UI puede reintentar
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::ExternalApi(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::ExternalApi(e.to_string())
    }
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_transient();
        let (status, error, message, details, code) = match self {
            AppError::Validation(e) => {
                tracing::warn!("Validation error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Validation Error",
                    "The provided data is invalid".to_string(),
                    Some(json!(e)),
                    "VALIDATION_ERROR",
                )
            }
            AppError::NotFound(msg) => {
                tracing::warn!("Resource not found: {}", msg);
                (StatusCode::NOT_FOUND, "Not Found", msg, None, "NOT_FOUND")
            }
            AppError::Conflict(msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, "Conflict", msg, None, "CONFLICT")
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "Bad Request", msg, None, "BAD_REQUEST")
            }
            AppError::ExternalApi(msg) => {
                tracing::error!("External API error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External API Error",
                    "An error occurred while communicating with the dispatch backend".to_string(),
                    Some(json!({ "external_api_error": msg })),
                    "EXTERNAL_API_ERROR",
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
            details,
            code: Some(code.to_string()),
            retryable,
        };

        (status, Json(body)).into_response()
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de conflicto
pub fn conflict_error(resource: &str, id: &str, reason: &str) -> AppError {
    AppError::Conflict(format!("{} '{}': {}", resource, id, reason))
}

/// Función helper para crear errores de solicitud incorrecta
pub fn bad_request_error(message: &str) -> AppError {
    AppError::BadRequest(message.to_string())
}
