use std::{sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{
    google::GoogleOAuth, jwt::TokenIssuer, repo::PgUserStore, services::AuthService,
};
use crate::config::AppConfig;
use crate::email::{Mailer, SmtpMailer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub mailer: Arc<dyn Mailer>,
    pub google: GoogleOAuth,
}

pub async fn connect_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

impl AppState {
    pub fn init(config: Arc<AppConfig>, db: PgPool) -> anyhow::Result<Self> {
        let tokens = TokenIssuer::new(&config.jwt);
        let users = Arc::new(PgUserStore::new(db));
        let auth = AuthService::new(users, tokens);
        let mailer = Arc::new(
            SmtpMailer::new(&config.email, &config.frontend_url).context("build smtp transport")?,
        ) as Arc<dyn Mailer>;
        let google = GoogleOAuth::new(&config.google, &config.backend_url);

        Ok(Self {
            config,
            auth,
            mailer,
            google,
        })
    }
}
