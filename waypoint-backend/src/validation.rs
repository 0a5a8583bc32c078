/// Input validation for the account routes
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Name must be between 2 and 32 characters (got {0})")]
    NameLength(usize),

    #[error("Name contains invalid characters (only alphanumeric, underscore and dash allowed)")]
    NameInvalidChars,

    #[error("E-mail must be between 5 and 100 characters (got {0})")]
    EmailLength(usize),

    #[error("E-mail address is malformed")]
    EmailMalformed,

    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
}

/// Validates an account name
///
/// Rules:
/// - 2 to 32 characters
/// - Only alphanumeric characters, underscores and dashes
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if !(2..=32).contains(&len) {
        return Err(ValidationError::NameLength(len));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(ValidationError::NameInvalidChars);
    }

    Ok(())
}

/// Validates an e-mail address
///
/// Rules:
/// - 5 to 100 characters
/// - Exactly one '@' with a dot somewhere after it
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let len = email.chars().count();
    if !(5..=100).contains(&len) {
        return Err(ValidationError::EmailLength(len));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::EmailMalformed);
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ValidationError::EmailMalformed);
    }

    Ok(())
}

/// Validates a password (length only; content is the user's business)
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 6 {
        return Err(ValidationError::PasswordTooShort);
    }

    Ok(())
}
