use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
  #[error("database error: {0}")]
  Sqlite(#[from] tokio_rusqlite::rusqlite::Error),

  #[error("database connection error: {0}")]
  Connection(#[from] tokio_rusqlite::Error),

  #[error("the specified e-mail address already exists")]
  EmailTaken,

  #[error("a user with the same name already exists")]
  NameTaken,

  #[error("user not found")]
  UserNotFound,
}

pub type Result<T> = std::result::Result<T, DbError>;
