use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
};

use super::{end_session, require_non_empty, require_patient, require_session};
use crate::auth::{hash_password_blocking, verify_password_blocking, Principal};
use crate::error::{AppError, Result};
use crate::extract::Json;
use crate::models::*;
use crate::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<RegisterPatientResponse>)> {
    require_non_empty("first_name", &req.first_name)?;
    require_non_empty("last_name", &req.last_name)?;
    require_non_empty("email", &req.email)?;
    require_non_empty("password", &req.password)?;

    let password_hash = hash_password_blocking(req.password.clone()).await?;
    let patient_id = state.db.create_patient(&req, &password_hash)?;
    tracing::info!(patient_id, "patient registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterPatientResponse {
            message: "Patient registered successfully",
            patient_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<PatientLoginRequest>,
) -> Result<([(HeaderName, HeaderValue); 1], Json<PatientLoginResponse>)> {
    let patient = state.db.find_patient_by_email(&req.email)?;
    let verified = match &patient {
        Some(p) => verify_password_blocking(req.password, p.password_hash.clone()).await?,
        None => false,
    };
    let patient = patient
        .filter(|_| verified)
        .ok_or_else(|| {
            tracing::warn!("rejected patient login");
            AppError::InvalidCredentials
        })?;

    let cookie = state.sessions.create(Principal::Patient { id: patient.id })?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(PatientLoginResponse {
            message: "Login successful",
            patient: PatientSummary {
                id: patient.id,
                first_name: patient.first_name,
                last_name: patient.last_name,
                email: patient.email,
            },
        }),
    ))
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PatientProfile>> {
    let (_, patient_id) = require_patient(&state, &headers)?;
    let patient = state
        .db
        .get_patient(patient_id)?
        .ok_or(AppError::NotFound("Patient"))?;
    Ok(Json(patient.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<MessageResponse>> {
    let (_, patient_id) = require_patient(&state, &headers)?;
    require_non_empty("first_name", &req.first_name)?;
    require_non_empty("last_name", &req.last_name)?;

    state.db.update_patient_profile(patient_id, &req)?;
    Ok(Json(MessageResponse::new("Profile updated successfully")))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<([(HeaderName, HeaderValue); 1], Json<MessageResponse>)> {
    let (session, patient_id) = require_patient(&state, &headers)?;

    let removed = state.db.delete_patient(patient_id)?;
    tracing::info!(patient_id, appointments = removed, "patient account deleted");

    let cleared = end_session(&state, &session)?;
    Ok((cleared, Json(MessageResponse::new("Account deleted successfully"))))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<([(HeaderName, HeaderValue); 1], Json<MessageResponse>)> {
    let session = require_session(&state, &headers)?;
    let cleared = end_session(&state, &session)?;
    Ok((cleared, Json(MessageResponse::new("Logged out successfully"))))
}
