//! Error handling for the inventory ledger
//!
//! Every command failure surfaces as a [`LedgerError`]. Store failures inside a
//! command are wrapped in [`LedgerError::Command`] so callers see which command
//! and which identifiers were involved; [`LedgerError::root`] recovers the kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledger_shared::{FieldError, MaterialId, Quantity};
use serde::Serialize;
use thiserror::Error;

/// Ledger error types
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("The {action} quantity ({requested}) is more than the actual one ({available})")]
    InvalidQuantity {
        action: &'static str,
        requested: Quantity,
        available: Quantity,
    },

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(
        "Material {material_id} has {available} units in live lots but {requested} were requested"
    )]
    InsufficientLots {
        material_id: MaterialId,
        requested: Quantity,
        available: i64,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage operation timed out")]
    Timeout,

    #[error("Database error: {0}")]
    DatabaseError(#[source] sqlx::Error),

    #[error("{command} failed for {subject}: {source}")]
    Command {
        command: &'static str,
        subject: String,
        #[source]
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        LedgerError::NotFound { entity, id }
    }

    /// Attach command context; already-wrapped errors are left alone
    pub fn in_command(self, command: &'static str, subject: impl Into<String>) -> Self {
        match self {
            wrapped @ LedgerError::Command { .. } => wrapped,
            other => LedgerError::Command {
                command,
                subject: subject.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error kind, with any command context stripped
    pub fn root(&self) -> &LedgerError {
        match self {
            LedgerError::Command { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether re-running the whole command may succeed.
    ///
    /// Receive, Move and Remove are not idempotent: a caller retrying them must
    /// deduplicate on its own side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            LedgerError::StorageUnavailable(_) | LedgerError::Timeout
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::InvalidQuantity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Validation { .. } => StatusCode::BAD_REQUEST,
            LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            LedgerError::InsufficientLots { .. }
            | LedgerError::DatabaseError(_)
            | LedgerError::Command { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.root() {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::InsufficientLots { .. } => "INSUFFICIENT_LOTS",
            LedgerError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            LedgerError::Timeout => "TIMEOUT",
            LedgerError::DatabaseError(_) | LedgerError::Command { .. } => "DATABASE_ERROR",
        }
    }
}

impl From<FieldError> for LedgerError {
    fn from(err: FieldError) -> Self {
        LedgerError::Validation {
            field: err.field.to_string(),
            message: err.message.to_string(),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let code = db.code().map(|c| c.into_owned());
            let message = db.message().to_string();
            match code.as_deref() {
                // unique, check and foreign key violations
                Some("23505" | "23514" | "23503") => return LedgerError::Conflict(message),
                // serialization failure, deadlock
                Some("40001" | "40P01") => return LedgerError::StorageUnavailable(message),
                // statement_timeout
                Some("57014") => return LedgerError::Timeout,
                _ => {}
            }
        }

        match err {
            sqlx::Error::PoolTimedOut => LedgerError::Timeout,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => LedgerError::StorageUnavailable(err.to_string()),
            other => LedgerError::DatabaseError(other),
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
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let field = match self.root() {
            LedgerError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        // Store internals stay out of the response body
        let message = match self.root() {
            LedgerError::DatabaseError(_) => "A database error occurred".to_string(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Rejected: {}", self);
        }

        let detail = ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
        };
        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
