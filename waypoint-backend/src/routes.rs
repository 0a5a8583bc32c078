use crate::AppState;
use crate::address::{ServerAddress, client_ip};
use crate::auth::{AuthUser, verification_gate};
use crate::directory::Heartbeat;
use crate::error::AppError;
use crate::helpers::{generate_password, generate_pin, hash_secret, now_ms};
use crate::pending::PendingAuth;
use crate::validation;

use axum::{
    Json,
    extract::{ConnectInfo, Path, Query, State, rejection::ExtensionRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
};
use axum_macros::debug_handler;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use waypoint_db::NewUser;

// ============================================================================
// Server directory
// ============================================================================

#[debug_handler]
pub(crate) async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    payload: Option<Json<Heartbeat>>,
) -> Result<impl IntoResponse, AppError> {
    let address: ServerAddress = address.parse()?;

    // A server may only register itself. Loopback peers (and an absent peer
    // identity) are exempt; see `ServerAddress::matches_peer`.
    if let Some(peer) = client_ip(&headers, connect_info.ok().map(|ci| ci.0)) {
        if !address.matches_peer(peer) {
            return Err(AppError::AddressMismatch {
                expected: address.ip.to_string(),
                actual: peer.to_string(),
            });
        }
    }

    let Json(heartbeat) = payload.unwrap_or_default();
    let now = now_ms();
    state.directory.upsert(address, heartbeat, now);
    state.stats.maybe_sample(&state.directory, now);

    Ok("Nice")
}

pub(crate) async fn list_servers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.directory.snapshot(now_ms())))
}

pub(crate) async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(state.stats.render())
}

// ============================================================================
// Client downloads
// ============================================================================

/// Version advertised to launchers polling for updates.
const LATEST_CLIENT_VERSION: &str = "1.0.4";

/// Only this major line has published download artifacts.
const SUPPORTED_VERSION_PREFIX: &str = "1.";

/// The runtime archive is shared across every client in the supported line.
const RUNTIME_ARCHIVE_URL: &str = "https://cdn.waypoint.io/runtime/waypoint-runtime-2_00_19.7z";

pub(crate) async fn latest_version() -> &'static str {
    LATEST_CLIENT_VERSION
}

pub(crate) async fn client_link(
    Path(version): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_supported_version(&version)?;
    Ok(format!(
        "https://github.com/waypoint-mp/waypoint-client/releases/download/{version}/client.zip"
    ))
}

pub(crate) async fn runtime_link(
    Path(version): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_supported_version(&version)?;
    Ok(RUNTIME_ARCHIVE_URL)
}

fn require_supported_version(version: &str) -> Result<(), AppError> {
    if !version.starts_with(SUPPORTED_VERSION_PREFIX) {
        return Err(AppError::Validation("Bad client version".to_string()));
    }
    Ok(())
}

// ============================================================================
// Registration & verification
// ============================================================================

#[derive(Deserialize)]
pub(crate) struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
pub(crate) struct RegisterResponse {
    id: i64,
}

#[debug_handler]
pub(crate) async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_name(&payload.name)?;
    validation::validate_email(&payload.email)?;
    validation::validate_password(&payload.password)?;

    let pin = generate_pin();
    let new = NewUser {
        name: payload.name,
        email: payload.email.clone(),
        password_hash: hash_secret(&payload.password, &payload.email),
        verification_pin_hash: hash_secret(&pin, &payload.email),
        has_verified_email: false,
        discord: None,
    };
    let user = state.db.create_user(new, now_ms()).await?;

    let mailer = state.mailer.clone();
    let (email, name) = (user.email.clone(), user.name.clone());
    tokio::spawn(async move { mailer.send_signup_pin(&email, &name, &pin).await });

    Ok((StatusCode::CREATED, Json(RegisterResponse { id: user.id })))
}

#[derive(Deserialize)]
pub(crate) struct VerifyRequest {
    email: String,
    pin: String,
    password: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct TokenResponse {
    token: String,
}

pub(crate) async fn verify(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id: i64 = id.parse().unwrap_or(-1);
    let now = now_ms();

    let mut user = state
        .db
        .user_by_id(id)
        .await?
        .ok_or(AppError::NotFound)?;
    verification_gate(&user, now)?;

    // The PIN (and optional password) hashes are salted with the e-mail the
    // caller supplied; a wrong e-mail simply fails the precondition below.
    let pin_hash = hash_secret(&payload.pin, &payload.email);
    let password_hash = payload
        .password
        .as_deref()
        .map(|password| hash_secret(password, &payload.email));

    let affected = state
        .db
        .confirm_verification(id, pin_hash, password_hash, now)
        .await?;
    if !affected {
        return Err(AppError::NotFound);
    }

    let mailer = state.mailer.clone();
    let email = user.email.clone();
    tokio::spawn(async move { mailer.send_signup_success(&email).await });

    user.has_verified_email = true;
    let token = state.verifier.issue_token(&user)?;
    Ok(Json(TokenResponse { token }))
}

#[derive(Deserialize)]
pub(crate) struct ResetPinRequest {
    id: i64,
    email: String,
    password: String,
}

pub(crate) async fn reset_pin(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = now_ms();
    let password_hash = hash_secret(&payload.password, &payload.email);
    let user = state
        .db
        .user_by_credentials(payload.email, password_hash)
        .await?
        .filter(|user| user.id == payload.id)
        .ok_or_else(|| {
            AppError::Validation("User not found with this id, email and password".to_string())
        })?;

    verification_gate(&user, now)?;

    let pin = generate_pin();
    let rotated = state
        .db
        .rotate_verification_pin(user.id, hash_secret(&pin, &user.email), now)
        .await?;
    if !rotated {
        // A concurrent verify got there first.
        return Err(AppError::AlreadyVerified);
    }

    let mailer = state.mailer.clone();
    tokio::spawn(async move { mailer.send_signup_pin(&user.email, &user.name, &pin).await });

    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordRequest {
    email: String,
    password: Option<String>,
    new_password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordResponse {
    password_generated: bool,
}

pub(crate) async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = now_ms();
    let new_password = payload.new_password.clone().unwrap_or_else(generate_password);
    let password_generated = payload.new_password.is_none();

    // A caller-chosen password requires the current one as a precondition;
    // a generated password goes to the mailbox owner, so it does not.
    let old_password_hash = if password_generated {
        None
    } else {
        Some(hash_secret(
            payload.password.as_deref().unwrap_or_default(),
            &payload.email,
        ))
    };

    let affected = state
        .db
        .reset_password(
            payload.email.clone(),
            old_password_hash,
            hash_secret(&new_password, &payload.email),
            now,
        )
        .await?;
    if !affected {
        return Err(AppError::NotFound);
    }

    let user = state
        .db
        .user_by_email(payload.email)
        .await?
        .ok_or(AppError::Inconsistent("user missing after password reset"))?;

    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        mailer
            .send_password_reset(&user.email, &user.name, &new_password)
            .await
    });

    Ok(Json(ResetPasswordResponse { password_generated }))
}

// ============================================================================
// Login
// ============================================================================

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub(crate) struct LoginResponse {
    token: String,
    id: i64,
    name: String,
}

#[debug_handler]
pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .verifier
        .password_login(&payload.email, &payload.password)
        .await?;
    if !user.has_verified_email {
        return Err(AppError::EmailNotVerified);
    }

    let token = state.verifier.issue_token(&user)?;
    Ok(Json(LoginResponse {
        token,
        id: user.id,
        name: user.name,
    }))
}

#[derive(Deserialize)]
pub(crate) struct OAuthQuery {
    state: Option<String>,
    code: Option<String>,
}

pub(crate) async fn login_discord(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthQuery>,
) -> Result<impl IntoResponse, AppError> {
    let state_token = query.state.ok_or(AppError::MissingState)?;
    Ok(Redirect::to(&state.discord.authorize_url(&state_token)))
}

pub(crate) async fn login_discord_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthQuery>,
) -> Result<impl IntoResponse, AppError> {
    let state_token = query.state.ok_or(AppError::MissingState)?;
    let code = query
        .code
        .ok_or_else(|| AppError::Provider("missing authorization code".to_string()))?;

    let profile = state.discord.exchange_code(&code).await?;
    let user = state.verifier.discord_login(profile, now_ms()).await?;
    if !user.has_verified_email {
        return Err(AppError::EmailNotVerified);
    }

    let token = state.verifier.issue_token(&user)?;
    state.pending.publish(
        state_token,
        PendingAuth {
            token,
            user_id: user.id,
            discord_username: user.discord_username,
            discord_discriminator: user.discord_discriminator,
            discord_avatar: user.discord_avatar,
        },
    );

    Ok("Success! You may return to the game...")
}

pub(crate) async fn login_discord_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthQuery>,
) -> Result<impl IntoResponse, AppError> {
    let state_token = query.state.ok_or(AppError::MissingState)?;
    match state.pending.consume(&state_token) {
        Some(pending) => Ok(Json(pending)),
        None => Err(AppError::NotReady),
    }
}

// ============================================================================
// Profile & session tickets
// ============================================================================

#[derive(Serialize)]
pub(crate) struct MeResponse {
    id: i64,
    name: String,
}

pub(crate) async fn me(AuthUser(user): AuthUser) -> Result<impl IntoResponse, AppError> {
    Ok(Json(MeResponse {
        id: user.id,
        name: user.name,
    }))
}

#[derive(Serialize)]
pub(crate) struct UserInfoResponse {
    name: String,
}

pub(crate) async fn user_info(
    Path(id): Path<String>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let id: i64 = id.parse().unwrap_or(-1);
    if id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(Json(UserInfoResponse { name: user.name }))
}

#[derive(Serialize)]
pub(crate) struct PlayResponse {
    session: String,
}

pub(crate) async fn play(
    State(state): State<Arc<AppState>>,
    Path(server_address): Path<String>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .issue(user.id, &server_address, now_ms())
        .await?;
    Ok(Json(PlayResponse { session }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionUser {
    id: i64,
    discord_id: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct SessionUserResponse {
    user: SessionUser,
}

pub(crate) async fn session_user(
    State(state): State<Arc<AppState>>,
    Path((server_address, session)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.sessions.resolve(&server_address, &session).await?;
    Ok(Json(SessionUserResponse {
        user: SessionUser {
            id: user.id,
            discord_id: user.discord_id,
        },
    }))
}
