use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{claims::Claims, repo_types::User};
use crate::{config::JwtConfig, error::AuthError, state::AppState};

/// Name of the cookie carrying the bearer token.
pub const TOKEN_COOKIE: &str = "jwt-token";

/// The only accepted signing algorithm.
const ALGORITHM: Algorithm = Algorithm::HS256;

const SHORT_TTL: Duration = Duration::from_secs(60 * 60);
const LONG_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 14);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLifetime {
    /// One hour.
    Short,
    /// Fourteen days ("remember me").
    Long,
}

impl TokenLifetime {
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            TokenLifetime::Long
        } else {
            TokenLifetime::Short
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            TokenLifetime::Short => SHORT_TTL,
            TokenLifetime::Long => LONG_TTL,
        }
    }
}

/// A signed bearer token and how long it stays valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub lifetime: Duration,
}

impl IssuedToken {
    pub fn expiry_seconds(&self) -> u64 {
        self.lifetime.as_secs()
    }
}

/// Signs and verifies HS256 bearer tokens with a secret fixed at construction.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        lifetime: TokenLifetime,
    ) -> Result<IssuedToken, AuthError> {
        let ttl = lifetime.duration();
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl;
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        debug!(user_id = %user_id, lifetime = ?lifetime, "jwt signed");
        Ok(IssuedToken {
            token,
            lifetime: ttl,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        // Reject foreign algorithms before touching the signature.
        let header = decode_header(token).map_err(|_| AuthError::InvalidSignature)?;
        if header.alg != ALGORITHM {
            warn!(alg = ?header.alg, "jwt with unexpected algorithm");
            return Err(AuthError::InvalidSignature);
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidSignature,
            }
        })?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

/// Reads the bearer token from the `jwt-token` cookie, falling back to an
/// `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = read_cookie(headers, TOKEN_COOKIE) {
        return Some(token);
    }
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::to_string)
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// The authenticated, live user behind the request's bearer token.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            warn!("missing bearer token");
            AuthError::InvalidSignature
        })?;

        let user = state
            .auth
            .get_user_from_token(&token)
            .await
            .map_err(|e| match e {
                AuthError::UserNotFound => AuthError::InvalidSignature,
                other => other,
            })?;

        Ok(AuthUser(user))
    }
}
