use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  Db(waypoint_db::DbError),
  Validation(String),
  /// Malformed `ip:port` token in a path.
  InvalidAddress,
  /// The claimed server IP does not match the peer we actually see.
  AddressMismatch { expected: String, actual: String },
  /// Password login failed; deliberately the same whether the e-mail
  /// exists or the password is wrong.
  InvalidCredentials,
  EmailNotVerified,
  /// Token failed cryptographic verification or is past its expiry.
  InvalidToken,
  /// Token verified, but the live user record no longer matches its claims.
  StaleToken,
  /// OAuth endpoints called without the caller-chosen state token.
  MissingState,
  /// No pending login for that state token. Indistinguishable from a token
  /// that was never issued, so we cannot say more.
  NotReady,
  NotFound,
  Forbidden,
  PinExpired,
  AlreadyVerified,
  /// The OAuth provider rejected or garbled the exchange.
  Provider(String),
  /// A record we just wrote could not be read back.
  Inconsistent(&'static str),
  /// Unexpected invariant break; details stay server-side.
  Internal(&'static str),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      AppError::Db(db_err) => {
        let (status, message): (StatusCode, String) = match &db_err {
          waypoint_db::DbError::EmailTaken | waypoint_db::DbError::NameTaken => {
            (StatusCode::BAD_REQUEST, db_err.to_string())
          }
          waypoint_db::DbError::UserNotFound => {
            (StatusCode::NOT_FOUND, "User not found".to_string())
          }
          waypoint_db::DbError::Sqlite(_) | waypoint_db::DbError::Connection(_) => {
            // Don't expose internal database errors
            tracing::error!(?db_err, "internal database error");
            (
              StatusCode::INTERNAL_SERVER_ERROR,
              "An internal error occurred. Please try again later.".to_string(),
            )
          }
        };
        let error_response = ErrorResponse::new(message);
        return (status, Json(error_response)).into_response();
      }
      AppError::Validation(msg) => {
        tracing::warn!(validation_error = %msg, "validation failed");
        (StatusCode::BAD_REQUEST, msg)
      }
      AppError::InvalidAddress => (
        StatusCode::BAD_REQUEST,
        "Address must contain IP and port (i.e. 127.0.0.1:7777)".to_string(),
      ),
      AppError::AddressMismatch { expected, actual } => (
        StatusCode::FORBIDDEN,
        format!("Your IP is expected to be {expected}, but it is {actual}"),
      ),
      AppError::InvalidCredentials => (
        StatusCode::UNAUTHORIZED,
        "User does not exist or wrong password".to_string(),
      ),
      AppError::EmailNotVerified => (
        StatusCode::FORBIDDEN,
        "Email address didn't verify".to_string(),
      ),
      AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
      AppError::StaleToken => (
        StatusCode::UNAUTHORIZED,
        "Token no longer matches the account".to_string(),
      ),
      AppError::MissingState => (StatusCode::BAD_REQUEST, "no state".to_string()),
      AppError::NotReady => (StatusCode::UNAUTHORIZED, "When it's ready!".to_string()),
      AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
      AppError::Forbidden => (StatusCode::FORBIDDEN, "Token doesn't match id".to_string()),
      AppError::PinExpired => (StatusCode::BAD_REQUEST, "Code is expired".to_string()),
      AppError::AlreadyVerified => (
        StatusCode::BAD_REQUEST,
        "User has verified email".to_string(),
      ),
      AppError::Provider(msg) => {
        tracing::warn!(provider_error = %msg, "oauth exchange failed");
        (StatusCode::UNAUTHORIZED, "Login failed".to_string())
      }
      AppError::Inconsistent(what) => {
        tracing::error!(what, "record not found on read-back");
        (StatusCode::IM_A_TEAPOT, what.to_string())
      }
      AppError::Internal(what) => {
        tracing::error!(what, "internal error");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "An internal error occurred. Please try again later.".to_string(),
        )
      }
    };

    (status, Json(ErrorResponse::new(message))).into_response()
  }
}

impl From<waypoint_db::DbError> for AppError {
  fn from(err: waypoint_db::DbError) -> Self {
    AppError::Db(err)
  }
}

impl From<crate::validation::ValidationError> for AppError {
  fn from(err: crate::validation::ValidationError) -> Self {
    AppError::Validation(err.to_string())
  }
}

impl From<crate::address::AddressError> for AppError {
  fn from(_: crate::address::AddressError) -> Self {
    AppError::InvalidAddress
  }
}
