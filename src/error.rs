use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::{AppointmentStatus, ErrorResponse};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] redb::DatabaseError),

    #[error("Database transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Database table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Database storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Database commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Session signing error: {0}")]
    Signing(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Admin access required")]
    AdminRequired,

    #[error("Patient access required")]
    PatientRequired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Appointment not found or already completed/canceled")]
    NotCancelable,

    #[error("Time slot not available")]
    SlotUnavailable,

    #[error("Cannot delete doctor with future appointments")]
    HasFutureAppointments,

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Route not found")]
    RouteNotFound,
}

/// Attached to internal error responses so the edge layer can decide
/// whether to expose the underlying cause.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub code: u32,
    pub detail: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated
            | Self::AdminRequired
            | Self::PatientRequired
            | Self::Unauthorized
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) | Self::NotCancelable | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::SlotUnavailable
            | Self::HasFutureAppointments
            | Self::InvalidTransition { .. }
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail | Self::DuplicateUsername => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> u32 {
        match self {
            Self::Database(_)
            | Self::DatabaseError(_)
            | Self::Transaction(_)
            | Self::Table(_)
            | Self::Storage(_)
            | Self::Commit(_)
            | Self::Serialization(_)
            | Self::PasswordHash(_)
            | Self::Signing(_) => 2000,
            Self::Unauthenticated => 2001,
            Self::AdminRequired => 2002,
            Self::PatientRequired => 2003,
            Self::Unauthorized => 2004,
            Self::InvalidCredentials => 2005,
            Self::NotFound(_) => 2006,
            Self::NotCancelable => 2007,
            Self::SlotUnavailable => 2008,
            Self::HasFutureAppointments => 2009,
            Self::InvalidTransition { .. } => 2010,
            Self::InvalidRequest(_) => 2011,
            Self::DuplicateEmail => 2012,
            Self::DuplicateUsername => 2013,
            Self::RouteNotFound => 2014,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            let body = ErrorResponse::new(code, "Internal server error");
            let mut response = (status, Json(body)).into_response();
            response.extensions_mut().insert(ErrorDetail {
                code,
                detail: self.to_string(),
            });
            return response;
        }

        let body = ErrorResponse::new(code, self.to_string());
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
