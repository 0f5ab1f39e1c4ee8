use std::time::Duration;

use telemed_server::{create_router, sessions::SessionStore, AppState, Config, Database};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.uses_default_secret() {
        tracing::warn!("SESSION_SECRET is not set; using the built-in default");
        if config.environment.is_production() {
            anyhow::bail!("SESSION_SECRET must be set in production");
        }
    }

    let db = Database::open(&config.db_path)?;
    tracing::info!(path = %config.db_path, "database opened");

    let port = config.port;
    let bootstrap_admin = config.bootstrap_admin.clone();
    let state = AppState::new(db, config);

    if let Some((username, password)) = bootstrap_admin {
        if state.ensure_admin(&username, &password)? {
            tracing::info!(%username, "bootstrap admin created");
        }
    }

    tokio::spawn(sweep_sessions(state.sessions.clone()));

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

async fn sweep_sessions(sessions: SessionStore) {
    let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let sessions = sessions.clone();
        match tokio::task::spawn_blocking(move || sessions.purge_expired()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "session sweep failed"),
            Err(e) => tracing::warn!(error = %e, "session sweep task panicked"),
        }
    }
}
