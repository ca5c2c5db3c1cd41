//! Error handling for the garment MRP platform
//!
//! Provides consistent error responses in English and Portuguese

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{Shortfall, StockCommitError};
use thiserror::Error;

/// Postgres SQLSTATE codes the API reports as client errors
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_pt: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_pt: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Stock commit errors
    #[error("Insufficient stock: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    InsufficientStock(Vec<Shortfall>),

    #[error("Materials not found: {0:?}")]
    MaterialNotFound(Vec<i64>),

    #[error("Timed out waiting for a lock on {0}")]
    LockTimeout(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[source] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("record").to_string();
            match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => return AppError::DuplicateEntry(constraint),
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    return AppError::Conflict {
                        resource: constraint,
                        message: "The operation conflicts with related records".to_string(),
                        message_pt: "A operação conflita com registros relacionados".to_string(),
                    }
                }
                Some(PG_LOCK_NOT_AVAILABLE) => {
                    return AppError::LockTimeout("inventory".to_string())
                }
                _ => {}
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<StockCommitError> for AppError {
    fn from(err: StockCommitError) -> Self {
        match err {
            StockCommitError::MaterialNotFound(ids) => AppError::MaterialNotFound(ids),
            StockCommitError::InsufficientStock(shortfalls) => {
                AppError::InsufficientStock(shortfalls)
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.to_string())
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
    pub message_pt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: String, message_pt: String) -> Self {
        Self {
            code: code.to_string(),
            message_en,
            message_pt,
            field: None,
            details: None,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    fn with_details<T: Serialize>(mut self, details: &T) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }
}

impl AppError {
    /// Shorthand for a field validation error
    pub fn validation(field: &str, message: &str, message_pt: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_pt: message_pt.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEntry(_) | AppError::Conflict { .. } | AppError::LockTimeout(_) => {
                StatusCode::CONFLICT
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientStock(_) | AppError::MaterialNotFound(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_detail = match &self {
            AppError::Validation { field, message, message_pt } => {
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_pt.clone())
                    .with_field(field)
            }
            AppError::ValidationError(msg) => ErrorDetail::new(
                "VALIDATION_ERROR",
                msg.clone(),
                format!("Dados inválidos: {}", msg),
            ),
            AppError::DuplicateEntry(field) => ErrorDetail::new(
                "DUPLICATE_ENTRY",
                format!("A record with this {} already exists", field),
                format!("Já existe um registro com este {}", field),
            )
            .with_field(field),
            AppError::Conflict { resource, message, message_pt } => {
                ErrorDetail::new("CONFLICT", message.clone(), message_pt.clone()).with_field(resource)
            }
            AppError::NotFound(resource) => ErrorDetail::new(
                "NOT_FOUND",
                format!("{} not found", resource),
                format!("{} não encontrado", resource),
            ),
            AppError::InsufficientStock(shortfalls) => ErrorDetail::new(
                "INSUFFICIENT_STOCK",
                self.to_string(),
                shortfalls
                    .iter()
                    .map(|s| {
                        format!(
                            "Estoque insuficiente para {}. Necessário: {}, Disponível: {}",
                            s.nome, s.necessario, s.disponivel
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            )
            .with_details(shortfalls),
            AppError::MaterialNotFound(ids) => ErrorDetail::new(
                "MATERIAL_NOT_FOUND",
                format!("Materials not found: {:?}", ids),
                format!("Matéria-prima não encontrada: {:?}", ids),
            )
            .with_details(ids),
            AppError::LockTimeout(resource) => ErrorDetail::new(
                "LOCK_TIMEOUT",
                format!("Timed out waiting for {}; please retry", resource),
                format!("Tempo esgotado aguardando {}; tente novamente", resource),
            ),
            AppError::DatabaseError(_) => ErrorDetail::new(
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                "Ocorreu um erro no banco de dados".to_string(),
            ),
            AppError::Internal(msg) => ErrorDetail::new(
                "INTERNAL_ERROR",
                msg.clone(),
                "Erro interno do servidor".to_string(),
            ),
            AppError::InternalError(_) => ErrorDetail::new(
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                "Erro interno do servidor".to_string(),
            ),
        };

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
