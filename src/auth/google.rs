//! Google OAuth 2.0 authorization-code flow.
//!
//! Only produces the verified identity profile; account resolution happens in
//! [`super::services::AuthService::find_or_create_user_by_google`].

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::GoogleConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str = "openid https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("google login is not configured")]
    Disabled,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("google returned no email for this account")]
    MissingEmail,
}

/// Externally verified identity handed over by Google.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    enabled: bool,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleConfig, backend_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: format!("{}/auth/google/callback", backend_url.trim_end_matches('/')),
            enabled: config.is_enabled(),
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, GoogleError> {
        if !self.enabled {
            return Err(GoogleError::Disabled);
        }
        let url = Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("state", state),
            ],
        )
        .expect("static google auth url is valid");
        Ok(url.into())
    }

    /// Exchanges an authorization code and fetches the account's profile.
    pub async fn fetch_profile(&self, code: &str) -> Result<GoogleProfile, GoogleError> {
        if !self.enabled {
            return Err(GoogleError::Disabled);
        }

        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("google code exchanged");

        let profile: GoogleProfile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if profile.email.is_empty() {
            return Err(GoogleError::MissingEmail);
        }
        Ok(profile)
    }
}
