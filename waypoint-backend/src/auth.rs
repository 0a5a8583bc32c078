use crate::AppState;
use crate::error::AppError;
use crate::helpers::{generate_password, generate_pin, hash_secret};

use async_trait::async_trait;
use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use waypoint_db::{Database, DbError, DiscordProfileFields, NewUser, User, make_fake_discord_email};

/// Bearer tokens expire after a week; the liveness re-check below usually
/// invalidates them much sooner than that.
const TOKEN_TTL_SECS: u64 = 60 * 60 * 24 * 7;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token failed signature verification")]
    InvalidSignature,

    #[error("token is expired")]
    Expired,

    #[error("token could not be signed")]
    Signing,

    #[error("oauth provider error: {0}")]
    Provider(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidSignature | AuthError::Expired => AppError::InvalidToken,
            AuthError::Signing => AppError::Internal("token signing failed"),
            AuthError::Provider(msg) => AppError::Provider(msg),
        }
    }
}

/// Claim set carried by a bearer token.
///
/// `id`, `email` and `has_verified_email` double as the liveness triple: a
/// token is only honored while the live user record still matches all three
/// exactly, so revoking a verification or changing an e-mail invalidates
/// every outstanding token without a blocklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub email: String,
    pub has_verified_email: bool,
    pub roles: Vec<String>,

    /// Timestamp of when this token expires.
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl Claims {
    fn new(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            has_verified_email: user.has_verified_email,
            roles: user.roles.clone(),
            expires_at: get_current_timestamp() + TOKEN_TTL_SECS,
        }
    }
}

/// Issues and verifies signed bearer tokens.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        encode(&Header::default(), &Claims::new(user), &self.encoding)
            .map_err(|_| AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidSignature,
            })
    }
}

/// Profile fields from Discord's identify scope.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// The OAuth provider seam: building the authorize redirect and exchanging
/// an authorization code for a profile. Tests substitute a stub.
#[async_trait]
pub trait DiscordOAuth: Send + Sync {
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<DiscordProfile, AuthError>;
}

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const PROFILE_URL: &str = "https://discord.com/api/users/@me";

/// The real Discord client.
pub struct DiscordClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DiscordClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_uri,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn provider_err(err: reqwest::Error) -> AuthError {
    AuthError::Provider(err.to_string())
}

#[async_trait]
impl DiscordOAuth for DiscordClient {
    fn authorize_url(&self, state: &str) -> String {
        reqwest::Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("scope", "identify"),
                ("response_type", "code"),
                ("state", state),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .expect("static authorize url")
        .to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<DiscordProfile, AuthError> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(provider_err)?
            .error_for_status()
            .map_err(provider_err)?
            .json()
            .await
            .map_err(provider_err)?;

        self.http
            .get(PROFILE_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(provider_err)?
            .error_for_status()
            .map_err(provider_err)?
            .json()
            .await
            .map_err(provider_err)
    }
}

/// Resolves a request into a verified user, one strategy per method.
pub struct CredentialVerifier {
    db: Database,
    tokens: TokenSigner,
}

impl CredentialVerifier {
    pub fn new(db: Database, tokens: TokenSigner) -> Self {
        Self { db, tokens }
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AppError> {
        Ok(self.tokens.issue(user)?)
    }

    /// Password strategy. The response is identical whether the e-mail is
    /// unknown or the password is wrong.
    pub async fn password_login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let password_hash = hash_secret(password, email);
        match self
            .db
            .user_by_credentials(email.to_string(), password_hash)
            .await?
        {
            Some(user) => Ok(user),
            None => Err(AppError::InvalidCredentials),
        }
    }

    /// Bearer-token strategy: cryptographic verification, then a liveness
    /// re-check of the claim triple against the live record.
    pub async fn bearer_login(&self, token: &str) -> Result<User, AppError> {
        let claims = self.tokens.verify(token)?;
        match self
            .db
            .user_by_claims(claims.id, claims.email, claims.has_verified_email)
            .await?
        {
            Some(user) => Ok(user),
            None => Err(AppError::StaleToken),
        }
    }

    /// Discord strategy: never fails on "user not found" — it provisions.
    pub async fn discord_login(&self, profile: DiscordProfile, now: i64) -> Result<User, AppError> {
        let email = make_fake_discord_email(&profile.id);
        let fields = DiscordProfileFields {
            discord_id: profile.id.clone(),
            username: profile.username,
            discriminator: profile.discriminator,
            avatar: profile.avatar,
        };

        if let Some(user) = self.db.user_by_email(email.clone()).await? {
            return self.refresh_profile(user, fields, now).await;
        }

        // Random unusable password and PIN: this account authenticates
        // through Discord and is treated as pre-verified.
        let new = NewUser {
            name: profile.id,
            email: email.clone(),
            password_hash: hash_secret(&generate_password(), &email),
            verification_pin_hash: hash_secret(&generate_pin(), &email),
            has_verified_email: true,
            discord: Some(fields.clone()),
        };
        match self.db.create_user(new, now).await {
            Ok(user) => Ok(user),
            // Lost a provisioning race with a concurrent login for the same
            // Discord account; use the row the winner created.
            Err(DbError::EmailTaken) | Err(DbError::NameTaken) => {
                match self.db.user_by_email(email).await? {
                    Some(user) => self.refresh_profile(user, fields, now).await,
                    None => Err(AppError::Inconsistent("provisioned user missing")),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn refresh_profile(
        &self,
        mut user: User,
        fields: DiscordProfileFields,
        now: i64,
    ) -> Result<User, AppError> {
        self.db
            .update_discord_profile(user.id, fields.clone(), now)
            .await?;
        user.discord_id = Some(fields.discord_id);
        user.discord_username = fields.username;
        user.discord_discriminator = fields.discriminator;
        user.discord_avatar = fields.avatar;
        Ok(user)
    }
}

/// Pre-checks before a conditional verification write, so a failed attempt
/// gets a precise error instead of a blanket "no match". The conditional
/// update itself stays the authority under concurrent attempts.
pub fn verification_gate(user: &User, now: i64) -> Result<(), AppError> {
    if user.has_verified_email {
        return Err(AppError::AlreadyVerified);
    }
    if user.pin_expired(now) {
        return Err(AppError::PinExpired);
    }
    Ok(())
}

/// Extractor for routes requiring a live bearer token.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::InvalidToken)?;

        let user = state.verifier.bearer_login(bearer.token()).await?;
        Ok(AuthUser(user))
    }
}
