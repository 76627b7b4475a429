use std::sync::Arc;

mod app;
mod auth;
mod cleanup;
mod config;
mod email;
mod error;
mod state;

use crate::{cleanup::CleanupScheduler, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "portfolio_auth=debug,axum=info,tower_http=info".to_string());
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

    let config = Arc::new(AppConfig::from_env()?);
    let db = state::connect_pool(&config).await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let app_state = AppState::init(config.clone(), db)?;

    let _cleanup = CleanupScheduler::new(app_state.auth.clone(), config.cleanup_interval_hours).start();

    app::serve(app::build_app(app_state)).await
}
