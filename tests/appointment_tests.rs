mod common;

use axum::http::StatusCode;
use common::{cookie_header, setup_test_server};
use serde_json::{json, Value};

// === Booking ===

#[tokio::test]
async fn test_book_and_list_own_appointments() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, patient) = app.patient_session("jane@example.com").await;

    app.book_ok(&patient, doctor, "2099-03-02", "09:00:00").await;
    app.book_ok(&patient, doctor, "2099-03-01", "15:30:00").await;
    app.book_ok(&patient, doctor, "2099-03-01", "08:00:00").await;

    let response = app
        .server
        .get("/api/appointments/my-appointments")
        .add_header(cookie_header(), patient)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let rows = body.as_array().unwrap();
    let slots: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| {
            (
                r["appointment_date"].as_str().unwrap(),
                r["appointment_time"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        slots,
        vec![
            ("2099-03-01", "08:00:00"),
            ("2099-03-01", "15:30:00"),
            ("2099-03-02", "09:00:00"),
        ]
    );
    assert_eq!(rows[0]["status"], "scheduled");
    assert_eq!(rows[0]["doctor_last_name"], "House");
    assert_eq!(rows[0]["specialization"], "Cardiology");
}

#[tokio::test]
async fn test_booking_requires_session() {
    let app = setup_test_server();

    let response = app
        .server
        .post("/api/appointments")
        .json(&json!({
            "doctor_id": 1,
            "appointment_date": "2099-01-01",
            "appointment_time": "09:00:00"
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_missing_fields() {
    let app = setup_test_server();
    let (_, patient) = app.patient_session("jane@example.com").await;

    let response = app
        .server
        .post("/api/appointments")
        .add_header(cookie_header(), patient)
        .json(&json!({"doctor_id": 1}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], 2011);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("appointment_date"));
}

#[tokio::test]
async fn test_booking_unknown_doctor() {
    let app = setup_test_server();
    let (_, patient) = app.patient_session("jane@example.com").await;

    let response = app.book(&patient, 42, "2099-01-01", "09:00:00").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Doctor not found");
}

#[tokio::test]
async fn test_double_booking_rejected() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, first) = app.patient_session("first@example.com").await;
    let (_, second) = app.patient_session("second@example.com").await;

    app.book_ok(&first, doctor, "2099-01-01", "09:00:00").await;
    let response = app.book(&second, doctor, "2099-01-01", "09:00:00").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Time slot not available");

    // a different time with the same doctor is fine
    app.book_ok(&second, doctor, "2099-01-01", "09:30:00").await;
}

#[tokio::test]
async fn test_concurrent_bookings_for_one_slot() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, first) = app.patient_session("first@example.com").await;
    let (_, second) = app.patient_session("second@example.com").await;

    let (a, b) = tokio::join!(
        app.book(&first, doctor, "2099-01-01", "09:00:00"),
        app.book(&second, doctor, "2099-01-01", "09:00:00"),
    );

    let mut statuses = vec![a.status_code(), b.status_code()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::BAD_REQUEST]);
    assert_eq!(app.state.db.appointments_for_doctor(doctor).unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_cannot_book() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;

    let response = app.book(&admin, doctor, "2099-01-01", "09:00:00").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

// === Cancel ===

#[tokio::test]
async fn test_cancel_twice() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, patient) = app.patient_session("jane@example.com").await;
    let id = app.book_ok(&patient, doctor, "2099-01-01", "09:00:00").await;

    let response = app
        .server
        .delete(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), patient.clone())
        .await;
    response.assert_status_ok();

    let response = app
        .server
        .delete(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), patient.clone())
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    // the canceled slot is open again
    app.book_ok(&patient, doctor, "2099-01-01", "09:00:00").await;
}

#[tokio::test]
async fn test_cancel_someone_elses_appointment() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, owner) = app.patient_session("owner@example.com").await;
    let (_, intruder) = app.patient_session("intruder@example.com").await;
    let id = app.book_ok(&owner, doctor, "2099-01-01", "09:00:00").await;

    let response = app
        .server
        .delete(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), intruder)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    // admins may cancel on anyone's behalf
    app.server
        .delete(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), admin)
        .await
        .assert_status_ok();
}

// === Status updates ===

#[tokio::test]
async fn test_update_status() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, patient) = app.patient_session("jane@example.com").await;
    let id = app.book_ok(&patient, doctor, "2099-01-01", "09:00:00").await;

    let response = app
        .server
        .put(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), patient.clone())
        .json(&json!({"status": "completed"}))
        .await;
    response.assert_status_ok();

    let stored = app.state.db.get_appointment(id).unwrap().unwrap();
    assert_eq!(stored.status.as_str(), "completed");

    // terminal states stay put
    let response = app
        .server
        .put(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), patient.clone())
        .json(&json!({"status": "scheduled"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .delete(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), patient)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_status_rejects_unknown_value() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, patient) = app.patient_session("jane@example.com").await;
    let id = app.book_ok(&patient, doctor, "2099-01-01", "09:00:00").await;

    let response = app
        .server
        .put(&format!("/api/appointments/{}", id))
        .add_header(cookie_header(), patient)
        .json(&json!({"status": "teleported"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], 2011);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    let stored = app.state.db.get_appointment(id).unwrap().unwrap();
    assert_eq!(stored.status.as_str(), "scheduled");
}

#[tokio::test]
async fn test_update_missing_appointment() {
    let app = setup_test_server();
    let (_, patient) = app.patient_session("jane@example.com").await;

    let response = app
        .server
        .put("/api/appointments/404")
        .add_header(cookie_header(), patient)
        .json(&json!({"status": "canceled"}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Appointment not found");
}

// === Doctor view ===

#[tokio::test]
async fn test_doctor_appointments_admin_only() {
    let app = setup_test_server();
    let admin = app.login_admin().await;
    let doctor = app.create_doctor(&admin, "House").await;
    let (_, patient) = app.patient_session("jane@example.com").await;
    app.book_ok(&patient, doctor, "2099-01-02", "09:00:00").await;
    app.book_ok(&patient, doctor, "2099-01-01", "09:00:00").await;

    let response = app
        .server
        .get(&format!("/api/appointments/doctor/{}", doctor))
        .add_header(cookie_header(), patient)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = app
        .server
        .get(&format!("/api/appointments/doctor/{}", doctor))
        .add_header(cookie_header(), admin)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["appointment_date"], "2099-01-01");
    assert_eq!(body[0]["patient_first_name"], "Jane");
    assert_eq!(body[0]["patient_last_name"], "Doe");
}
