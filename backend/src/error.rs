//! Error handling for the inventory and sales server
//!
//! Provides consistent error responses in English and Spanish

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{LineStockError, StockError, ValidationError};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions: requires {0}")]
    InsufficientPermissions(String),

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        message_es: String,
    },

    // Validation errors
    #[error("Validation error: {field}: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    // Business logic errors
    #[error("Insufficient stock for {product}. Available: {available}, required: {required}")]
    InsufficientStock {
        product_id: Uuid,
        product: String,
        available: i64,
        required: i64,
        line: Option<usize>,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        AppError::Validation {
            message_es: format!("Dato inválido en {}: {}", field, message),
            field,
            message,
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        AppError::NotFound { entity, id }
    }

    /// Machine-readable code carried in the response body
    pub fn code(&self) -> &'static str {
        match self {
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InsufficientPermissions(_) => "INSUFFICIENT_PERMISSIONS",
            AppError::Unauthorized { .. } => "UNAUTHORIZED",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::TokenExpired | AppError::InvalidToken | AppError::Unauthorized { .. } => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InsufficientStock { .. } | AppError::InvalidStateTransition(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Configuration(_) | AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.field, err.message)
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock {
                product_id,
                product,
                available,
                required,
            } => AppError::InsufficientStock {
                product_id,
                product,
                available,
                required,
                line: None,
            },
            StockError::NonPositiveQuantity(_) => AppError::validation("cantidad", err.to_string()),
            StockError::PresentationMismatch { .. } => {
                AppError::validation("id_presentacion", err.to_string())
            }
            StockError::Overflow { .. } => AppError::validation("cantidad", err.to_string()),
            StockError::ProductNotLoaded(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<LineStockError> for AppError {
    fn from(err: LineStockError) -> Self {
        let index = err.index;
        match AppError::from(err.source) {
            AppError::InsufficientStock {
                product_id,
                product,
                available,
                required,
                ..
            } => AppError::InsufficientStock {
                product_id,
                product,
                available,
                required,
                line: Some(index),
            },
            AppError::Validation { field, message, .. } => {
                AppError::validation(format!("detalles[{}].{}", index, field), message)
            }
            other => other,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: impl Into<String>, message_es: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_es: message_es.into(),
            field: None,
            details: None,
        }
    }
}

impl From<&AppError> for ErrorDetail {
    fn from(err: &AppError) -> Self {
        let code = err.code();
        match err {
            AppError::TokenExpired => {
                ErrorDetail::new(code, "Token has expired", "El token ha expirado")
            }
            AppError::InvalidToken => ErrorDetail::new(code, "Invalid token", "Token inválido"),
            AppError::InsufficientPermissions(permission) => ErrorDetail::new(
                code,
                format!("Permission denied: requires {}", permission),
                format!("Permiso denegado: se requiere {}", permission),
            ),
            AppError::Unauthorized {
                message,
                message_es,
            } => ErrorDetail::new(code, message.clone(), message_es.clone()),
            AppError::Validation {
                field,
                message,
                message_es,
            } => ErrorDetail {
                field: Some(field.clone()),
                ..ErrorDetail::new(code, message.clone(), message_es.clone())
            },
            AppError::NotFound { entity, id } => ErrorDetail {
                details: Some(serde_json::json!({ "entity": entity, "id": id })),
                ..ErrorDetail::new(
                    code,
                    format!("{} {} not found", entity, id),
                    format!("No se encontró {} {}", entity, id),
                )
            },
            AppError::InsufficientStock {
                product_id,
                product,
                available,
                required,
                line,
            } => ErrorDetail {
                details: Some(serde_json::json!({
                    "product_id": product_id,
                    "product": product,
                    "available": available,
                    "required": required,
                    "line": line,
                })),
                ..ErrorDetail::new(
                    code,
                    format!(
                        "Insufficient stock for {}. Available: {}, required: {}",
                        product, available, required
                    ),
                    format!(
                        "Stock insuficiente para {}. Disponible: {}, Requerido: {}",
                        product, available, required
                    ),
                )
            },
            AppError::InvalidStateTransition(msg) => ErrorDetail::new(
                code,
                msg.clone(),
                format!("No se puede cambiar el estado: {}", msg),
            ),
            AppError::Configuration(msg) => ErrorDetail::new(
                code,
                format!("Configuration error: {}", msg),
                format!("Error de configuración: {}", msg),
            ),
            AppError::DatabaseError(_) => ErrorDetail::new(
                code,
                "A database error occurred",
                "Ocurrió un error en la base de datos",
            ),
            AppError::Internal(msg) => {
                ErrorDetail::new(code, msg.clone(), "Error interno del servidor")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_detail = ErrorDetail::from(&self);

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
