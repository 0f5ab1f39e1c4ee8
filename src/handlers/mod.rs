pub mod admin;
pub mod appointments;
pub mod doctors;
pub mod patients;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::auth::Principal;
use crate::error::{AppError, Result};
use crate::sessions::Session;
use crate::AppState;

// === Auth guards ===

fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session> {
    state
        .sessions
        .resolve(headers)?
        .ok_or(AppError::Unauthenticated)
}

fn require_patient(state: &AppState, headers: &HeaderMap) -> Result<(Session, u64)> {
    let session = require_session(state, headers)?;
    match session.principal {
        Principal::Patient { id } => Ok((session, id)),
        Principal::Admin { .. } => Err(AppError::PatientRequired),
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Session> {
    match state.sessions.resolve(headers)? {
        Some(session) if session.principal.is_admin() => Ok(session),
        _ => Err(AppError::AdminRequired),
    }
}

/// Destroys the session and returns the header that clears its cookie.
fn end_session(state: &AppState, session: &Session) -> Result<[(HeaderName, HeaderValue); 1]> {
    state.sessions.destroy(session)?;
    Ok([(header::SET_COOKIE, state.sessions.clear_cookie()?)])
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// === Misc ===

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Telemedicine API Server Running" }))
}

pub async fn not_found() -> AppError {
    AppError::RouteNotFound
}
