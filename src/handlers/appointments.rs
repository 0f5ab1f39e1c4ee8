use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::{require_patient, require_session};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::models::*;
use crate::AppState;

/// The patient comes from the session, never from the body.
pub async fn book_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<BookAppointmentResponse>)> {
    let (_, patient_id) = require_patient(&state, &headers)?;

    let appointment_id = state.db.book_appointment(patient_id, &req)?;
    tracing::info!(
        appointment_id,
        patient_id,
        doctor_id = req.doctor_id,
        "appointment booked"
    );

    Ok((
        StatusCode::CREATED,
        Json(BookAppointmentResponse {
            message: "Appointment booked successfully",
            appointment_id,
        }),
    ))
}

pub async fn my_appointments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PatientAppointmentView>>> {
    let (_, patient_id) = require_patient(&state, &headers)?;
    Ok(Json(state.db.appointments_for_patient(patient_id)?))
}

pub async fn doctor_appointments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doctor_id): Path<u64>,
) -> Result<Json<Vec<DoctorAppointmentView>>> {
    let session = require_session(&state, &headers)?;
    if !session.principal.can_view_doctor_appointments() {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(state.db.appointments_for_doctor(doctor_id)?))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<MessageResponse>> {
    let session = require_session(&state, &headers)?;

    state
        .db
        .update_appointment_status(id, &session.principal, req.status)?;
    tracing::info!(appointment_id = id, status = %req.status, "appointment updated");

    Ok(Json(MessageResponse::new("Appointment updated successfully")))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<MessageResponse>> {
    let session = require_session(&state, &headers)?;

    state.db.cancel_appointment(id, &session.principal)?;
    tracing::info!(appointment_id = id, "appointment canceled");

    Ok(Json(MessageResponse::new("Appointment canceled successfully")))
}
