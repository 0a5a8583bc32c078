use rand::distr::{Alphanumeric, SampleString};
use rand::rng;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn generate_pin() -> String {
  Alphanumeric.sample_string(&mut rng(), 32)
}

pub fn generate_session_ticket() -> String {
  Alphanumeric.sample_string(&mut rng(), 32)
}

pub fn generate_password() -> String {
  Alphanumeric.sample_string(&mut rng(), 16)
}

/// Salted hash shared by passwords and verification PINs.
/// The salt is the account's e-mail, so identical secrets on different
/// accounts hash differently.
pub fn hash_secret(secret: &str, email: &str) -> String {
  format!("{:x}", Sha256::digest(format!("{secret}:{email}").as_bytes()))
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap()
    .as_millis() as i64
}
