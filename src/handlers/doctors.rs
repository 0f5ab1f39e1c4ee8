use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::{require_admin, require_non_empty, today};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::models::*;
use crate::AppState;

fn validate(req: &DoctorRequest) -> Result<()> {
    require_non_empty("first_name", &req.first_name)?;
    require_non_empty("last_name", &req.last_name)?;
    require_non_empty("specialization", &req.specialization)?;
    req.schedule.validate().map_err(AppError::InvalidRequest)
}

pub async fn create_doctor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DoctorRequest>,
) -> Result<(StatusCode, Json<CreateDoctorResponse>)> {
    require_admin(&state, &headers)?;
    validate(&req)?;

    let doctor_id = state.db.create_doctor(&req)?;
    tracing::info!(doctor_id, "doctor added");

    Ok((
        StatusCode::CREATED,
        Json(CreateDoctorResponse {
            message: "Doctor added successfully",
            doctor_id,
        }),
    ))
}

pub async fn list_doctors(State(state): State<AppState>) -> Result<Json<Vec<Doctor>>> {
    Ok(Json(state.db.list_doctors()?))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Doctor>> {
    let doctor = state.db.get_doctor(id)?.ok_or(AppError::NotFound("Doctor"))?;
    Ok(Json(doctor))
}

pub async fn update_doctor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(req): Json<DoctorRequest>,
) -> Result<Json<MessageResponse>> {
    require_admin(&state, &headers)?;
    validate(&req)?;

    state.db.update_doctor(id, &req)?;
    Ok(Json(MessageResponse::new("Doctor updated successfully")))
}

pub async fn delete_doctor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<MessageResponse>> {
    require_admin(&state, &headers)?;

    let removed = state.db.delete_doctor(id, today())?;
    tracing::info!(doctor_id = id, appointments = removed, "doctor deleted");

    Ok(Json(MessageResponse::new("Doctor deleted successfully")))
}
