#![allow(dead_code)]

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use telemed_server::{create_router, sessions::SESSION_COOKIE, AppState, Config, Database};
use tempfile::TempDir;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "admin-pass";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    _dir: TempDir,
}

pub fn setup_test_server() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let state = AppState::new(db, Config::default());
    state.ensure_admin(ADMIN_USER, ADMIN_PASS).unwrap();
    let app = create_router(state.clone());
    let server = TestServer::new(app).unwrap();
    TestApp {
        server,
        state,
        _dir: temp_dir,
    }
}

pub fn cookie_header() -> HeaderName {
    header::COOKIE
}

impl TestApp {
    pub async fn register_patient(&self, email: &str, password: &str) -> u64 {
        let response = self
            .server
            .post("/api/patients/register")
            .json(&json!({
                "first_name": "Jane",
                "last_name": "Doe",
                "email": email,
                "password": password,
                "phone": "555-0100",
                "date_of_birth": "1990-04-12",
                "gender": "female",
                "address": "1 Main St"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["patientId"].as_u64().unwrap()
    }

    /// Logs in and returns the `Cookie` header value carrying the session.
    pub async fn login_patient(&self, email: &str, password: &str) -> HeaderValue {
        let response = self
            .server
            .post("/api/patients/login")
            .json(&json!({ "email": email, "password": password }))
            .await;
        response.assert_status_ok();
        session_cookie(&response)
    }

    pub async fn patient_session(&self, email: &str) -> (u64, HeaderValue) {
        let id = self.register_patient(email, "pw-123456").await;
        let session = self.login_patient(email, "pw-123456").await;
        (id, session)
    }

    pub async fn login_admin(&self) -> HeaderValue {
        let response = self
            .server
            .post("/api/admin/login")
            .json(&json!({ "username": ADMIN_USER, "password": ADMIN_PASS }))
            .await;
        response.assert_status_ok();
        session_cookie(&response)
    }

    pub async fn create_doctor(&self, admin: &HeaderValue, last_name: &str) -> u64 {
        let response = self
            .server
            .post("/api/doctors")
            .add_header(cookie_header(), admin.clone())
            .json(&json!({
                "first_name": "Sam",
                "last_name": last_name,
                "specialization": "Cardiology",
                "email": format!("{}@clinic.test", last_name.to_lowercase()),
                "phone": "555-0199",
                "schedule": {
                    "monday": [{ "start": "09:00:00", "end": "12:00:00" }],
                    "wednesday": [
                        { "start": "09:00:00", "end": "12:00:00" },
                        { "start": "13:00:00", "end": "17:00:00" }
                    ]
                }
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["doctorId"].as_u64().unwrap()
    }

    pub async fn book(
        &self,
        session: &HeaderValue,
        doctor_id: u64,
        date: &str,
        time: &str,
    ) -> axum_test::TestResponse {
        self.server
            .post("/api/appointments")
            .add_header(cookie_header(), session.clone())
            .json(&json!({
                "doctor_id": doctor_id,
                "appointment_date": date,
                "appointment_time": time
            }))
            .await
    }

    pub async fn book_ok(&self, session: &HeaderValue, doctor_id: u64, date: &str, time: &str) -> u64 {
        let response = self.book(session, doctor_id, date, time).await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["appointmentId"].as_u64().unwrap()
    }
}

pub fn session_cookie(response: &axum_test::TestResponse) -> HeaderValue {
    let cookie = response.cookie(SESSION_COOKIE);
    HeaderValue::from_str(&format!("{}={}", cookie.name(), cookie.value())).unwrap()
}
