use std::sync::Arc;

use argon2::Params;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    google::GoogleProfile,
    jwt::{IssuedToken, TokenIssuer, TokenLifetime},
    password::{hash_password, verify_password},
    repo::UserStore,
    repo_types::{NewUser, User},
    tokens::generate_token,
};
use crate::error::AuthError;

/// How long a signup verification link stays valid.
pub const VERIFICATION_TTL: Duration = Duration::days(7);
/// How long a password-reset link stays valid.
pub const RESET_TTL: Duration = Duration::hours(1);
/// Unverified accounts older than this are soft-deleted.
pub const UNVERIFIED_RETENTION: Duration = Duration::days(7);
/// Soft-deleted accounts older than this are removed for good.
pub const SOFT_DELETE_RETENTION: Duration = Duration::days(23);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$"
        )
        .unwrap();
    }
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Account lifecycle: signup, verification, login, password reset, OAuth
/// resolution and retention cleanup.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    hash_params: Params,
    /// Verified against when there is no real hash, so failed logins cost
    /// the same whether or not the email is registered.
    dummy_hash: Arc<str>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenIssuer) -> Self {
        Self::with_hash_params(users, tokens, Params::default())
    }

    pub fn with_hash_params(
        users: Arc<dyn UserStore>,
        tokens: TokenIssuer,
        hash_params: Params,
    ) -> Self {
        let dummy_hash = match hash_password(&generate_token(), hash_params.clone()) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "could not prepare dummy password hash");
                String::new()
            }
        };
        Self {
            users,
            tokens,
            hash_params,
            dummy_hash: dummy_hash.into(),
        }
    }

    /// Argon2 is CPU-bound; keep it off the async workers.
    async fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let plain = plain.to_string();
        let params = self.hash_params.clone();
        tokio::task::spawn_blocking(move || hash_password(&plain, params))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
    }

    async fn verify_hash(&self, plain: &str, hash: &str) -> Result<bool, AuthError> {
        let plain = plain.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
    }

    /// Registers an unverified account and returns its verification token.
    /// Sending the token is up to the caller.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if email.is_empty() || !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(AuthError::InvalidPassword);
        }

        if self.users.find_by_email(email).await?.is_some() {
            warn!("signup for registered email");
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = self.hash(password).await?;
        let token = generate_token();
        let new_user = NewUser {
            email: email.to_string(),
            password_hash: Some(password_hash),
            is_verified: false,
            verification_token: Some(token.clone()),
            verification_expires_at: Some(OffsetDateTime::now_utc() + VERIFICATION_TTL),
            first_name: String::new(),
            last_name: String::new(),
        };

        // A concurrent signup that slipped past the lookup surfaces as a
        // unique violation, mapped to UserAlreadyExists.
        let user = self.users.create(new_user).await?;
        info!(user_id = %user.id, "user signed up");
        Ok(token)
    }

    #[instrument(skip(self, token))]
    pub async fn verify_user(&self, token: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_verification_token(token)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(expires_at) = user.verification_expires_at {
            if OffsetDateTime::now_utc() > expires_at {
                return Err(AuthError::VerificationTokenExpired);
            }
        }
        if user.is_verified {
            return Err(AuthError::UserAlreadyVerified);
        }

        let verified = self
            .users
            .mark_verified(user.id, token)
            .await?
            .ok_or(AuthError::UserAlreadyVerified)?;
        info!(user_id = %verified.id, "user verified");
        Ok(verified)
    }

    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<IssuedToken, AuthError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            warn!("login unknown email");
            self.burn_dummy_verify(password).await;
            return Err(AuthError::UserNotFound);
        };

        let Some(hash) = user.password_hash.as_deref() else {
            warn!(user_id = %user.id, "password login on account without password");
            self.burn_dummy_verify(password).await;
            return Err(AuthError::NoPasswordSet);
        };

        if !self.verify_hash(password, hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.create_token(user.id, &user.email, remember_me)?;
        info!(user_id = %user.id, "user logged in");
        Ok(issued)
    }

    async fn burn_dummy_verify(&self, password: &str) {
        // The outcome is irrelevant; only the time spent matters.
        let _ = self.verify_hash(password, &self.dummy_hash).await;
    }

    pub fn create_token(
        &self,
        user_id: Uuid,
        email: &str,
        remember_me: bool,
    ) -> Result<IssuedToken, AuthError> {
        self.tokens
            .issue(user_id, email, TokenLifetime::from_remember_me(remember_me))
    }

    /// Resolves a bearer token to the live user it was issued for.
    pub async fn get_user_from_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.tokens.verify(token)?;
        self.users
            .find_by_id(claims.sub)
            .await?
            .filter(User::is_live)
            .ok_or(AuthError::UserNotFound)
    }

    /// Tokens are stateless; the HTTP layer clears the cookie.
    pub fn logout(&self, user_id: Uuid) {
        debug!(user_id = %user_id, "logout");
    }

    /// First writer wins: an existing account is returned untouched.
    #[instrument(skip(self, profile), fields(email = %profile.email))]
    pub async fn find_or_create_user_by_google(
        &self,
        profile: &GoogleProfile,
    ) -> Result<User, AuthError> {
        if let Some(user) = self.users.find_by_email(&profile.email).await? {
            return Ok(user);
        }

        debug!(
            given_name = %profile.given_name,
            family_name = %profile.family_name,
            "no account for google profile, creating one"
        );
        let new_user = NewUser {
            email: profile.email.clone(),
            password_hash: None,
            is_verified: true,
            verification_token: None,
            verification_expires_at: None,
            // Names are filled in later through profile completion.
            first_name: String::new(),
            last_name: String::new(),
        };

        match self.users.create(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, "user created from google profile");
                Ok(user)
            }
            Err(crate::error::StoreError::Conflict) => self
                .users
                .find_by_email(&profile.email)
                .await?
                .ok_or(AuthError::UserNotFound),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn generate_password_reset_token(&self, email: &str) -> Result<String, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let token = generate_token();
        self.users
            .set_password_reset_token(user.id, &token, OffsetDateTime::now_utc() + RESET_TTL)
            .await?;

        info!(user_id = %user.id, "password reset requested");
        Ok(token)
    }

    /// Checks a reset token without consuming it.
    #[instrument(skip(self, token))]
    pub async fn validate_password_reset_token(&self, token: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_password_reset_token(token)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        match user.password_reset_expires_at {
            Some(expires_at) if OffsetDateTime::now_utc() <= expires_at => Ok(user),
            _ => Err(AuthError::ResetTokenExpired),
        }
    }

    /// Replaces the password and consumes the reset token `user` was loaded
    /// with. Only one caller can consume a given token; later ones get
    /// `UserNotFound`.
    #[instrument(skip(self, user, new_password), fields(user_id = %user.id))]
    pub async fn update_password(&self, user: &mut User, new_password: &str) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::InvalidPassword);
        }
        let token = user
            .password_reset_token
            .clone()
            .ok_or(AuthError::UserNotFound)?;
        let hash = self.hash(new_password).await?;
        self.users
            .consume_password_reset(user.id, &token, &hash)
            .await?;

        user.password_hash = Some(hash);
        user.password_reset_token = None;
        user.password_reset_expires_at = None;
        info!("password updated");
        Ok(())
    }

    pub async fn soft_delete_unverified_users(&self) -> Result<u64, AuthError> {
        let cutoff = OffsetDateTime::now_utc() - UNVERIFIED_RETENTION;
        Ok(self.users.soft_delete_unverified_before(cutoff).await?)
    }

    pub async fn permanently_delete_users(&self) -> Result<u64, AuthError> {
        let cutoff = OffsetDateTime::now_utc() - SOFT_DELETE_RETENTION;
        Ok(self.users.permanently_delete_before(cutoff).await?)
    }
}
