use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue},
};

use super::{end_session, require_admin, today};
use crate::auth::{verify_password_blocking, Principal};
use crate::error::{AppError, Result};
use crate::extract::Json;
use crate::models::*;
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<([(HeaderName, HeaderValue); 1], Json<AdminLoginResponse>)> {
    let admin = state.db.find_admin_by_username(&req.username)?;
    let verified = match &admin {
        Some(a) => verify_password_blocking(req.password, a.password_hash.clone()).await?,
        None => false,
    };
    let admin = admin
        .filter(|_| verified)
        .ok_or_else(|| {
            tracing::warn!("rejected admin login");
            AppError::InvalidCredentials
        })?;

    let cookie = state.sessions.create(Principal::Admin { id: admin.id })?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AdminLoginResponse {
            message: "Admin login successful",
            admin: AdminSummary {
                id: admin.id,
                username: admin.username,
                role: admin.role,
            },
        }),
    ))
}

pub async fn list_patients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PatientProfile>>> {
    require_admin(&state, &headers)?;
    let patients = state.db.list_patients()?;
    Ok(Json(patients.into_iter().map(PatientProfile::from).collect()))
}

pub async fn statistics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Statistics>> {
    require_admin(&state, &headers)?;
    Ok(Json(state.db.statistics(today())?))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<([(HeaderName, HeaderValue); 1], Json<MessageResponse>)> {
    let session = require_admin(&state, &headers)?;
    let cleared = end_session(&state, &session)?;
    Ok((cleared, Json(MessageResponse::new("Logged out successfully"))))
}
