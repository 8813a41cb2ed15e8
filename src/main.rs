use std::time::Duration;

mod app;
mod clock;
mod config;
mod db;
mod error;
mod middleware;
mod session;
mod snippets;
mod state;
mod templates;
mod users;
mod validator;

#[cfg(test)]
mod test_utils;

use tower_sessions::session_store::ExpiredDeletion;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "snippetbox=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let db = db::connect(&config.database_url).await?;
    let sessions = db::migrate(&db).await?;

    let (host, port) = (config.host.clone(), config.port);
    let cleanup_every = Duration::from_secs(config.session.cleanup_interval_secs);
    let state = AppState::init(config, db)?;
    let _cleanup =
        tokio::task::spawn(sessions.clone().continuously_delete_expired(cleanup_every));

    let app = app::build_app(state, sessions);
    app::serve(app, &host, port).await
}
