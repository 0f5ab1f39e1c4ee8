use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::auth::Principal;

// === Patients ===

#[derive(Debug, Deserialize)]
pub struct RegisterPatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPatientResponse {
    pub message: &'static str,
    pub patient_id: u64,
}

/// Stored patient row. Never serialized to clients directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

/// Patient fields safe to hand out: everything but the credential.
#[derive(Debug, Serialize)]
pub struct PatientProfile {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

impl From<PatientRecord> for PatientProfile {
    fn from(p: PatientRecord) -> Self {
        Self {
            id: p.id,
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            phone: p.phone,
            date_of_birth: p.date_of_birth,
            gender: p.gender,
            address: p.address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatientLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct PatientSummary {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PatientLoginResponse {
    pub message: &'static str,
    pub patient: PatientSummary,
}

// === Doctors ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Weekly availability: a list of working hours per day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule(pub BTreeMap<Weekday, Vec<TimeRange>>);

impl Schedule {
    /// Every range must be non-empty and no two ranges on a day may overlap.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (day, ranges) in &self.0 {
            let mut sorted = ranges.clone();
            sorted.sort_by_key(|r| r.start);

            for range in &sorted {
                if range.start >= range.end {
                    return Err(format!(
                        "schedule range {}-{} on {:?} is empty",
                        range.start, range.end, day
                    ));
                }
            }
            for pair in sorted.windows(2) {
                if pair[1].start < pair[0].end {
                    return Err(format!("overlapping schedule ranges on {:?}", day));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorRequest {
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub schedule: Schedule,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDoctorResponse {
    pub message: &'static str,
    pub doctor_id: u64,
}

// === Appointments ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Canceled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Canceled => "canceled",
            Self::Completed => "completed",
        }
    }

    /// Only a scheduled appointment moves, and only to a terminal state.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Canceled) | (Self::Scheduled, Self::Completed)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: u64,
    pub patient_id: u64,
    pub doctor_id: u64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn is_owned_by(&self, principal: &Principal) -> bool {
        matches!(principal, Principal::Patient { id } if *id == self.patient_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: u64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentResponse {
    pub message: &'static str,
    pub appointment_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: AppointmentStatus,
}

/// A patient's appointment joined with the doctor's identity.
#[derive(Debug, Serialize)]
pub struct PatientAppointmentView {
    pub id: u64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub doctor_first_name: String,
    pub doctor_last_name: String,
    pub specialization: String,
}

/// A doctor's appointment joined with the patient's name.
#[derive(Debug, Serialize)]
pub struct DoctorAppointmentView {
    pub id: u64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub patient_first_name: String,
    pub patient_last_name: String,
}

// === Admin ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecord {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminSummary {
    pub id: u64,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub message: &'static str,
    pub admin: AdminSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: AppointmentStatus,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_patients: u64,
    pub total_doctors: u64,
    pub total_appointments: u64,
    pub upcoming_appointments: u64,
    pub appointments_by_status: Vec<StatusCount>,
}

// === Generic ===

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

// === Errors ===

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: u32, error: impl Into<String>) -> Self {
        Self {
            code,
            error: error.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
