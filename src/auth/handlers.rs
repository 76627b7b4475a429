use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            CompletePasswordReset, GoogleCallbackQuery, GoogleLoginQuery, LoginRequest,
            MessageResponse, PasswordResetRequest, PublicUser, ResetTokenRequest,
            ResetTokenStatus, SignupRequest, TokenResponse, VerifyQuery,
        },
        jwt::{read_cookie, AuthUser, IssuedToken, TOKEN_COOKIE},
        tokens::generate_token,
    },
    config::CookieConfig,
    error::{AuthError, ErrorKind},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

/// Carries the OAuth `state` between the consent redirect and the callback.
const OAUTH_STATE_COOKIE: &str = "oauth-state";
const OAUTH_STATE_MAX_AGE: i64 = 10 * 60;
const REMEMBER_ME_SUFFIX: &str = "|rememberMe";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/verify", get(verify))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/check", get(check))
        .route("/auth/me", get(get_me))
}

pub fn google_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
}

pub fn password_reset_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/password-reset/request", post(request_password_reset))
        .route("/auth/password-reset/check", post(check_password_reset))
        .route("/auth/password-reset/complete", post(complete_password_reset))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password_length(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AuthError::InvalidPassword);
    }
    Ok(())
}

fn cookie(config: &CookieConfig, name: &str, value: &str, max_age: i64) -> String {
    let mut cookie = format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax");
    if !config.domain.is_empty() {
        cookie.push_str("; Domain=");
        cookie.push_str(&config.domain);
    }
    if config.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn session_cookie(state: &AppState, issued: &IssuedToken) -> String {
    cookie(
        &state.config.cookie,
        TOKEN_COOKIE,
        &issued.token,
        issued.expiry_seconds() as i64,
    )
}

fn append_cookie(res: &mut Response, cookie: String) {
    match HeaderValue::try_from(cookie) {
        Ok(value) => {
            res.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "dropping malformed cookie"),
    }
}

fn redirect(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn frontend(state: &AppState, path: &str) -> String {
    format!("{}{path}", state.config.frontend_url.trim_end_matches('/'))
}

/// Sets the session cookie and returns the token in the body.
fn token_response(state: &AppState, issued: IssuedToken) -> Response {
    let session = session_cookie(state, &issued);
    let mut res = Json(TokenResponse {
        expiry_seconds: issued.expiry_seconds(),
        token: issued.token,
    })
    .into_response();
    append_cookie(&mut res, session);
    res
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    payload.email = normalize_email(&payload.email);
    check_password_length(&payload.password)?;

    let token = state.auth.sign_up(&payload.email, &payload.password).await?;
    // The account stays even when delivery fails.
    state
        .mailer
        .send_verification_email(&payload.email, &token)
        .await?;

    info!(email = %payload.email, "verification email sent");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Verification email sent".into(),
        }),
    ))
}

#[instrument(skip(state, query))]
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, AuthError> {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing token" })),
        )
            .into_response());
    };

    let user = match state.auth.verify_user(&token).await {
        Ok(user) => user,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::NotFound | ErrorKind::Expired | ErrorKind::AlreadyDone
            ) =>
        {
            warn!(error = %e, "verification link rejected");
            return Ok(redirect(frontend(&state, "/auth")));
        }
        Err(e) => return Err(e),
    };

    // The account stays verified; the failed mail still fails the request.
    state.mailer.send_welcome_email(&user.email).await?;

    let issued = state.auth.create_token(user.id, &user.email, false)?;
    let mut res = redirect(frontend(&state, "/home"));
    append_cookie(&mut res, session_cookie(&state, &issued));
    Ok(res)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    payload.email = normalize_email(&payload.email);

    let issued = state
        .auth
        .login(&payload.email, &payload.password, payload.remember_me)
        .await
        .map_err(AuthError::into_login_failure)?;

    Ok(token_response(&state, issued))
}

#[instrument(skip(state, user))]
pub async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> Response {
    state.auth.logout(user.id);

    let mut res = Json(MessageResponse {
        message: "Logged out".into(),
    })
    .into_response();
    append_cookie(&mut res, cookie(&state.config.cookie, TOKEN_COOKIE, "", -1));
    res
}

pub async fn check(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "authenticated": true, "id": user.id }))
}

#[instrument(skip(user))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip(state))]
pub async fn google_login(
    State(state): State<AppState>,
    Query(query): Query<GoogleLoginQuery>,
) -> Result<Response, AuthError> {
    let mut oauth_state = generate_token();
    if query.remember_me {
        oauth_state.push_str(REMEMBER_ME_SUFFIX);
    }

    let url = state.google.authorize_url(&oauth_state)?;
    let mut res = redirect(url);
    append_cookie(
        &mut res,
        cookie(
            &state.config.cookie,
            OAUTH_STATE_COOKIE,
            &oauth_state,
            OAUTH_STATE_MAX_AGE,
        ),
    );
    Ok(res)
}

#[instrument(skip(state, headers, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<Response, AuthError> {
    if read_cookie(&headers, OAUTH_STATE_COOKIE).as_deref() != Some(query.state.as_str()) {
        warn!("oauth state mismatch");
        return Err(AuthError::InvalidSignature);
    }
    let Some(code) = query.code.as_deref() else {
        warn!(error = ?query.error, "google consent not granted");
        let mut res = redirect(frontend(&state, "/auth"));
        append_cookie(
            &mut res,
            cookie(&state.config.cookie, OAUTH_STATE_COOKIE, "", -1),
        );
        return Ok(res);
    };
    let remember_me = query.state.ends_with(REMEMBER_ME_SUFFIX);

    let mut profile = state.google.fetch_profile(code).await?;
    profile.email = normalize_email(&profile.email);
    let user = state.auth.find_or_create_user_by_google(&profile).await?;

    state.mailer.send_welcome_email(&user.email).await?;

    let issued = state.auth.create_token(user.id, &user.email, remember_me)?;
    info!(user_id = %user.id, "google login");

    let mut res = redirect(frontend(&state, "/home"));
    append_cookie(&mut res, session_cookie(&state, &issued));
    append_cookie(
        &mut res,
        cookie(&state.config.cookie, OAUTH_STATE_COOKIE, "", -1),
    );
    Ok(res)
}

#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = normalize_email(&payload.email);
    let token = state.auth.generate_password_reset_token(&email).await?;
    state.mailer.send_password_reset_email(&email, &token).await?;

    Ok(Json(MessageResponse {
        message: "Password reset email sent".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn check_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetTokenRequest>,
) -> Result<Json<ResetTokenStatus>, AuthError> {
    state
        .auth
        .validate_password_reset_token(&payload.token)
        .await?;
    Ok(Json(ResetTokenStatus { valid: true }))
}

#[instrument(skip(state, payload))]
pub async fn complete_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<CompletePasswordReset>,
) -> Result<Response, AuthError> {
    let mut user = state
        .auth
        .validate_password_reset_token(&payload.token)
        .await?;
    check_password_length(&payload.new_password)?;

    state
        .auth
        .update_password(&mut user, &payload.new_password)
        .await?;

    state
        .mailer
        .send_password_reset_confirmation_email(&user.email)
        .await?;

    let issued = state.auth.create_token(user.id, &user.email, false)?;
    Ok(token_response(&state, issued))
}
