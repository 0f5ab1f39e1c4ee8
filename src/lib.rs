pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod sessions;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

pub use config::{Config, Environment};
pub use db::Database;

use error::{AppError, ErrorDetail};
use models::ErrorResponse;
use sessions::SessionStore;

/// Per-request context: storage, sessions and configuration.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let db = Arc::new(db);
        let sessions = SessionStore::new(
            db.clone(),
            config.session_secret.clone(),
            config.session_ttl,
            config.environment.is_production(),
        );
        Self {
            db,
            sessions,
            config: Arc::new(config),
        }
    }

    /// Creates the admin account unless the username is already present.
    /// Returns whether an account was created.
    pub fn ensure_admin(&self, username: &str, password: &str) -> error::Result<bool> {
        if self.db.find_admin_by_username(username)?.is_some() {
            return Ok(false);
        }
        let password_hash = auth::hash_password(password)?;
        match self.db.create_admin(username, &password_hash, "admin") {
            Ok(_) => Ok(true),
            Err(AppError::DuplicateUsername) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(handlers::root))
        // Patients
        .route("/api/patients/register", post(handlers::patients::register))
        .route("/api/patients/login", post(handlers::patients::login))
        .route("/api/patients/logout", post(handlers::patients::logout))
        .route(
            "/api/patients/profile",
            get(handlers::patients::get_profile)
                .put(handlers::patients::update_profile)
                .delete(handlers::patients::delete_profile),
        )
        // Doctors
        .route(
            "/api/doctors",
            get(handlers::doctors::list_doctors).post(handlers::doctors::create_doctor),
        )
        .route(
            "/api/doctors/{id}",
            get(handlers::doctors::get_doctor)
                .put(handlers::doctors::update_doctor)
                .delete(handlers::doctors::delete_doctor),
        )
        // Appointments
        .route(
            "/api/appointments",
            post(handlers::appointments::book_appointment),
        )
        .route(
            "/api/appointments/my-appointments",
            get(handlers::appointments::my_appointments),
        )
        .route(
            "/api/appointments/doctor/{doctor_id}",
            get(handlers::appointments::doctor_appointments),
        )
        .route(
            "/api/appointments/{id}",
            put(handlers::appointments::update_appointment)
                .delete(handlers::appointments::cancel_appointment),
        )
        // Admin
        .route("/api/admin/login", post(handlers::admin::login))
        .route("/api/admin/logout", post(handlers::admin::logout))
        .route("/api/admin/patients", get(handlers::admin::list_patients))
        .route("/api/admin/statistics", get(handlers::admin::statistics));

    with_edge_layers(routes, state)
}

/// Fallback, error detail, security headers, CORS and tracing around a set
/// of routes.
fn with_edge_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = routes
        .fallback(handlers::not_found)
        .layer(middleware::map_response_with_state(
            state.clone(),
            expose_error_detail,
        ))
        .layer(security_header(
            header::X_CONTENT_TYPE_OPTIONS,
            "nosniff",
        ))
        .layer(security_header(header::X_FRAME_OPTIONS, "SAMEORIGIN"))
        .layer(security_header(header::REFERRER_POLICY, "no-referrer"))
        .layer(security_header(
            HeaderName::from_static("cross-origin-opener-policy"),
            "same-origin",
        ))
        .layer(security_header(header::X_XSS_PROTECTION, "0"));

    if state.config.environment.is_production() {
        router = router.layer(security_header(
            header::STRICT_TRANSPORT_SECURITY,
            "max-age=15552000; includeSubDomains",
        ));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

/// Outside production, internal errors carry their cause in a `detail` field.
async fn expose_error_detail(State(state): State<AppState>, response: Response) -> Response {
    if state.config.environment.is_production() {
        return response;
    }
    let Some(ErrorDetail { code, detail }) = response.extensions().get::<ErrorDetail>().cloned()
    else {
        return response;
    };
    let body = ErrorResponse::new(code, "Internal server error").with_detail(detail);
    (response.status(), Json(body)).into_response()
}
