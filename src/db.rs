use chrono::{NaiveDate, NaiveTime};
use redb::{
    Database as RedbDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
    WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::auth::Principal;
use crate::error::{AppError, Result};
use crate::models::{
    AdminRecord, Appointment, AppointmentStatus, BookAppointmentRequest, Doctor,
    DoctorAppointmentView, DoctorRequest, PatientAppointmentView, PatientRecord,
    RegisterPatientRequest, StatusCount, Statistics, UpdateProfileRequest,
};
use crate::sessions::SessionRecord;

// Table definitions
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
const PATIENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("patients");
const PATIENT_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("patient_emails");
const DOCTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("doctors");
const ADMINS: TableDefinition<u64, &[u8]> = TableDefinition::new("admins");
const ADMIN_USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("admin_usernames");
const APPOINTMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("appointments");
// Partial unique index: only appointments in `scheduled` status hold a slot.
const SCHEDULED_SLOTS: TableDefinition<&str, u64> = TableDefinition::new("scheduled_slots");
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

type RecordTable<'txn> = Table<'txn, u64, &'static [u8]>;
type SessionTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

pub struct Database {
    db: RedbDatabase,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let db = RedbDatabase::create(path)?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(COUNTERS)?;
            let _ = write_txn.open_table(PATIENTS)?;
            let _ = write_txn.open_table(PATIENT_EMAILS)?;
            let _ = write_txn.open_table(DOCTORS)?;
            let _ = write_txn.open_table(ADMINS)?;
            let _ = write_txn.open_table(ADMIN_USERNAMES)?;
            let _ = write_txn.open_table(APPOINTMENTS)?;
            let _ = write_txn.open_table(SCHEDULED_SLOTS)?;
            let _ = write_txn.open_table(SESSIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // === Patient operations ===

    pub fn create_patient(&self, req: &RegisterPatientRequest, password_hash: &str) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut emails = write_txn.open_table(PATIENT_EMAILS)?;
            if emails.get(req.email.as_str())?.is_some() {
                return Err(AppError::DuplicateEmail);
            }

            let id = next_id(&write_txn, "patients")?;
            let record = PatientRecord {
                id,
                first_name: req.first_name.clone(),
                last_name: req.last_name.clone(),
                email: req.email.clone(),
                password_hash: password_hash.to_string(),
                phone: req.phone.clone(),
                date_of_birth: req.date_of_birth,
                gender: req.gender.clone(),
                address: req.address.clone(),
            };

            let mut patients = write_txn.open_table(PATIENTS)?;
            put_record(&mut patients, id, &record)?;
            emails.insert(req.email.as_str(), id)?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    pub fn get_patient(&self, id: u64) -> Result<Option<PatientRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PATIENTS)?;
        get_record(&table, id)
    }

    pub fn find_patient_by_email(&self, email: &str) -> Result<Option<PatientRecord>> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(PATIENT_EMAILS)?;
        let id = match emails.get(email)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };
        let patients = read_txn.open_table(PATIENTS)?;
        get_record(&patients, id)
    }

    pub fn list_patients(&self) -> Result<Vec<PatientRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PATIENTS)?;
        all_records(&table)
    }

    /// Only name, phone and address are writable here; email and password are not.
    pub fn update_patient_profile(&self, id: u64, req: &UpdateProfileRequest) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PATIENTS)?;
            let mut record: PatientRecord =
                get_record(&table, id)?.ok_or(AppError::NotFound("Patient"))?;

            record.first_name = req.first_name.clone();
            record.last_name = req.last_name.clone();
            record.phone = req.phone.clone();
            record.address = req.address.clone();

            put_record(&mut table, id, &record)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Removes the patient, every appointment they own and every session
    /// they hold. Returns the number of appointments removed.
    pub fn delete_patient(&self, id: u64) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut patients = write_txn.open_table(PATIENTS)?;
            let record: PatientRecord =
                get_record(&patients, id)?.ok_or(AppError::NotFound("Patient"))?;

            let mut appointments = write_txn.open_table(APPOINTMENTS)?;
            let mut slots = write_txn.open_table(SCHEDULED_SLOTS)?;
            let removed =
                remove_appointments_where(&mut appointments, &mut slots, |a| a.patient_id == id)?;

            patients.remove(id)?;
            write_txn
                .open_table(PATIENT_EMAILS)?
                .remove(record.email.as_str())?;

            let mut sessions = write_txn.open_table(SESSIONS)?;
            let owner = Principal::Patient { id };
            remove_sessions_where(&mut sessions, |s| s.principal == owner)?;

            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    // === Doctor operations ===

    pub fn create_doctor(&self, req: &DoctorRequest) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let id = {
            let id = next_id(&write_txn, "doctors")?;
            let mut table = write_txn.open_table(DOCTORS)?;
            put_record(&mut table, id, &doctor_from_request(id, req))?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    pub fn get_doctor(&self, id: u64) -> Result<Option<Doctor>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOCTORS)?;
        get_record(&table, id)
    }

    pub fn list_doctors(&self) -> Result<Vec<Doctor>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOCTORS)?;
        all_records(&table)
    }

    pub fn update_doctor(&self, id: u64, req: &DoctorRequest) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOCTORS)?;
            if table.get(id)?.is_none() {
                return Err(AppError::NotFound("Doctor"));
            }
            put_record(&mut table, id, &doctor_from_request(id, req))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Refused while the doctor still has a scheduled appointment today or
    /// later; otherwise their past appointments go first, then the doctor.
    pub fn delete_doctor(&self, id: u64, today: NaiveDate) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut doctors = write_txn.open_table(DOCTORS)?;
            if doctors.get(id)?.is_none() {
                return Err(AppError::NotFound("Doctor"));
            }

            let mut appointments = write_txn.open_table(APPOINTMENTS)?;
            let booked: Vec<Appointment> = all_records(&appointments)?;
            if booked
                .iter()
                .any(|a| a.doctor_id == id && is_upcoming(a, today))
            {
                return Err(AppError::HasFutureAppointments);
            }

            let mut slots = write_txn.open_table(SCHEDULED_SLOTS)?;
            let removed =
                remove_appointments_where(&mut appointments, &mut slots, |a| a.doctor_id == id)?;
            doctors.remove(id)?;
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    // === Appointment operations ===

    /// Slot check and insert share one write transaction, so two bookings
    /// for the same slot can never both succeed.
    pub fn book_appointment(&self, patient_id: u64, req: &BookAppointmentRequest) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let id = {
            if write_txn.open_table(DOCTORS)?.get(req.doctor_id)?.is_none() {
                return Err(AppError::NotFound("Doctor"));
            }

            let key = slot_key(req.doctor_id, req.appointment_date, req.appointment_time);
            let mut slots = write_txn.open_table(SCHEDULED_SLOTS)?;
            if slots.get(key.as_str())?.is_some() {
                return Err(AppError::SlotUnavailable);
            }

            let id = next_id(&write_txn, "appointments")?;
            let appointment = Appointment {
                id,
                patient_id,
                doctor_id: req.doctor_id,
                appointment_date: req.appointment_date,
                appointment_time: req.appointment_time,
                status: AppointmentStatus::Scheduled,
            };

            let mut appointments = write_txn.open_table(APPOINTMENTS)?;
            put_record(&mut appointments, id, &appointment)?;
            slots.insert(key.as_str(), id)?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    pub fn get_appointment(&self, id: u64) -> Result<Option<Appointment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(APPOINTMENTS)?;
        get_record(&table, id)
    }

    pub fn appointments_for_patient(&self, patient_id: u64) -> Result<Vec<PatientAppointmentView>> {
        let read_txn = self.db.begin_read()?;
        let appointments = read_txn.open_table(APPOINTMENTS)?;
        let doctors = read_txn.open_table(DOCTORS)?;

        let mut own: Vec<Appointment> = all_records::<Appointment, _>(&appointments)?
            .into_iter()
            .filter(|a| a.patient_id == patient_id)
            .collect();
        sort_chronologically(&mut own);

        let mut views = Vec::with_capacity(own.len());
        for a in own {
            let Some(doctor) = get_record::<Doctor, _>(&doctors, a.doctor_id)? else {
                continue;
            };
            views.push(PatientAppointmentView {
                id: a.id,
                appointment_date: a.appointment_date,
                appointment_time: a.appointment_time,
                status: a.status,
                doctor_first_name: doctor.first_name,
                doctor_last_name: doctor.last_name,
                specialization: doctor.specialization,
            });
        }
        Ok(views)
    }

    pub fn appointments_for_doctor(&self, doctor_id: u64) -> Result<Vec<DoctorAppointmentView>> {
        let read_txn = self.db.begin_read()?;
        let appointments = read_txn.open_table(APPOINTMENTS)?;
        let patients = read_txn.open_table(PATIENTS)?;

        let mut booked: Vec<Appointment> = all_records::<Appointment, _>(&appointments)?
            .into_iter()
            .filter(|a| a.doctor_id == doctor_id)
            .collect();
        sort_chronologically(&mut booked);

        let mut views = Vec::with_capacity(booked.len());
        for a in booked {
            let Some(patient) = get_record::<PatientRecord, _>(&patients, a.patient_id)? else {
                continue;
            };
            views.push(DoctorAppointmentView {
                id: a.id,
                appointment_date: a.appointment_date,
                appointment_time: a.appointment_time,
                status: a.status,
                patient_first_name: patient.first_name,
                patient_last_name: patient.last_name,
            });
        }
        Ok(views)
    }

    /// Moves an appointment along the status state machine. Only the owning
    /// patient or an admin may do so.
    pub fn update_appointment_status(
        &self,
        id: u64,
        principal: &Principal,
        next: AppointmentStatus,
    ) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut appointments = write_txn.open_table(APPOINTMENTS)?;
            let mut appointment: Appointment =
                get_record(&appointments, id)?.ok_or(AppError::NotFound("Appointment"))?;

            if !principal.is_admin() && !appointment.is_owned_by(principal) {
                return Err(AppError::Unauthorized);
            }
            if !appointment.status.can_transition_to(next) {
                return Err(AppError::InvalidTransition {
                    from: appointment.status,
                    to: next,
                });
            }

            let mut slots = write_txn.open_table(SCHEDULED_SLOTS)?;
            set_status(&mut appointments, &mut slots, &mut appointment, next)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Cancels a scheduled appointment. Anything not currently scheduled is
    /// reported as missing.
    pub fn cancel_appointment(&self, id: u64, principal: &Principal) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut appointments = write_txn.open_table(APPOINTMENTS)?;
            let mut appointment: Appointment = get_record(&appointments, id)?
                .filter(|a: &Appointment| a.status == AppointmentStatus::Scheduled)
                .ok_or(AppError::NotCancelable)?;

            if !principal.is_admin() && !appointment.is_owned_by(principal) {
                return Err(AppError::Unauthorized);
            }

            let mut slots = write_txn.open_table(SCHEDULED_SLOTS)?;
            set_status(
                &mut appointments,
                &mut slots,
                &mut appointment,
                AppointmentStatus::Canceled,
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // === Admin operations ===

    pub fn create_admin(&self, username: &str, password_hash: &str, role: &str) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut usernames = write_txn.open_table(ADMIN_USERNAMES)?;
            if usernames.get(username)?.is_some() {
                return Err(AppError::DuplicateUsername);
            }

            let id = next_id(&write_txn, "admins")?;
            let record = AdminRecord {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                role: role.to_string(),
            };
            let mut admins = write_txn.open_table(ADMINS)?;
            put_record(&mut admins, id, &record)?;
            usernames.insert(username, id)?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    pub fn find_admin_by_username(&self, username: &str) -> Result<Option<AdminRecord>> {
        let read_txn = self.db.begin_read()?;
        let usernames = read_txn.open_table(ADMIN_USERNAMES)?;
        let id = match usernames.get(username)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };
        let admins = read_txn.open_table(ADMINS)?;
        get_record(&admins, id)
    }

    pub fn statistics(&self, today: NaiveDate) -> Result<Statistics> {
        let read_txn = self.db.begin_read()?;
        let total_patients = read_txn.open_table(PATIENTS)?.len()?;
        let total_doctors = read_txn.open_table(DOCTORS)?.len()?;

        let appointments: Vec<Appointment> = all_records(&read_txn.open_table(APPOINTMENTS)?)?;
        let upcoming_appointments = appointments
            .iter()
            .filter(|a| is_upcoming(a, today))
            .count() as u64;

        let mut appointments_by_status: Vec<StatusCount> = Vec::new();
        for a in &appointments {
            match appointments_by_status.iter_mut().find(|c| c.status == a.status) {
                Some(entry) => entry.count += 1,
                None => appointments_by_status.push(StatusCount {
                    status: a.status,
                    count: 1,
                }),
            }
        }
        appointments_by_status.sort_by_key(|c| c.status);

        Ok(Statistics {
            total_patients,
            total_doctors,
            total_appointments: appointments.len() as u64,
            upcoming_appointments,
            appointments_by_status,
        })
    }

    // === Session operations ===

    pub fn put_session(&self, token: &str, session: &SessionRecord) -> Result<()> {
        let json = serde_json::to_vec(session)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            table.insert(token, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Resolves a live session and pushes its expiry out to `now + ttl_secs`.
    /// Expired records are dropped on sight.
    pub fn touch_session(&self, token: &str, now: i64, ttl_secs: i64) -> Result<Option<Principal>> {
        let write_txn = self.db.begin_write()?;
        let principal = {
            let mut table = write_txn.open_table(SESSIONS)?;
            let current: Option<SessionRecord> = match table.get(token)? {
                Some(data) => Some(serde_json::from_slice(data.value())?),
                None => None,
            };

            match current {
                None => None,
                Some(session) if session.expires_at <= now => {
                    table.remove(token)?;
                    None
                }
                Some(mut session) => {
                    session.expires_at = now + ttl_secs;
                    let json = serde_json::to_vec(&session)?;
                    table.insert(token, json.as_slice())?;
                    Some(session.principal)
                }
            }
        };
        write_txn.commit()?;
        Ok(principal)
    }

    pub fn remove_session(&self, token: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = write_txn.open_table(SESSIONS)?.remove(token)?.is_some();
        write_txn.commit()?;
        Ok(removed)
    }

    /// Drops every session whose expiry is at or before `now`.
    pub fn purge_expired_sessions(&self, now: i64) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            remove_sessions_where(&mut sessions, |s| s.expires_at <= now)?
        };
        write_txn.commit()?;
        Ok(purged)
    }
}

fn remove_sessions_where<F>(table: &mut SessionTable<'_>, pred: F) -> Result<usize>
where
    F: Fn(&SessionRecord) -> bool,
{
    let mut doomed = Vec::new();
    for entry in table.iter()? {
        let (token, data) = entry?;
        let session: SessionRecord = serde_json::from_slice(data.value())?;
        if pred(&session) {
            doomed.push(token.value().to_string());
        }
    }
    for token in &doomed {
        table.remove(token.as_str())?;
    }
    Ok(doomed.len())
}

fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64> {
    let mut table = txn.open_table(COUNTERS)?;
    let next = table.get(counter)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(counter, next)?;
    Ok(next)
}

fn get_record<T, R>(table: &R, id: u64) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(data) => Ok(Some(serde_json::from_slice(data.value())?)),
        None => Ok(None),
    }
}

fn all_records<T, R>(table: &R) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, data) = entry?;
        records.push(serde_json::from_slice(data.value())?);
    }
    Ok(records)
}

fn put_record<T: Serialize>(table: &mut RecordTable<'_>, id: u64, record: &T) -> Result<()> {
    let json = serde_json::to_vec(record)?;
    table.insert(id, json.as_slice())?;
    Ok(())
}

fn slot_key(doctor_id: u64, date: NaiveDate, time: NaiveTime) -> String {
    format!("{}|{}|{}", doctor_id, date, time.format("%H:%M:%S"))
}

fn is_upcoming(a: &Appointment, today: NaiveDate) -> bool {
    a.status == AppointmentStatus::Scheduled && a.appointment_date >= today
}

fn sort_chronologically(appointments: &mut [Appointment]) {
    appointments.sort_by_key(|a| (a.appointment_date, a.appointment_time, a.id));
}

fn doctor_from_request(id: u64, req: &DoctorRequest) -> Doctor {
    Doctor {
        id,
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
        specialization: req.specialization.clone(),
        email: req.email.clone(),
        phone: req.phone.clone(),
        schedule: req.schedule.clone(),
    }
}

/// Writes the new status and keeps the slot index in step with it.
fn set_status(
    appointments: &mut RecordTable<'_>,
    slots: &mut Table<'_, &'static str, u64>,
    appointment: &mut Appointment,
    next: AppointmentStatus,
) -> Result<()> {
    if appointment.status == AppointmentStatus::Scheduled && next != AppointmentStatus::Scheduled {
        let key = slot_key(
            appointment.doctor_id,
            appointment.appointment_date,
            appointment.appointment_time,
        );
        slots.remove(key.as_str())?;
    }
    appointment.status = next;
    put_record(appointments, appointment.id, &*appointment)
}

fn remove_appointments_where<F>(
    appointments: &mut RecordTable<'_>,
    slots: &mut Table<'_, &'static str, u64>,
    matches: F,
) -> Result<usize>
where
    F: Fn(&Appointment) -> bool,
{
    let doomed: Vec<Appointment> = all_records::<Appointment, _>(&*appointments)?
        .into_iter()
        .filter(|a| matches(a))
        .collect();

    for a in &doomed {
        if a.status == AppointmentStatus::Scheduled {
            let key = slot_key(a.doctor_id, a.appointment_date, a.appointment_time);
            slots.remove(key.as_str())?;
        }
        appointments.remove(a.id)?;
    }
    Ok(doomed.len())
}
