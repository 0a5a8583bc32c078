/// How long a verification PIN stays usable after being issued.
pub const VERIFICATION_PIN_TTL_MS: i64 = 2 * 60 * 1000;

/// Synthesized unique e-mail for accounts provisioned through Discord.
///
/// Discord's identify scope does not expose a real address, but the users
/// table requires a unique one, so Discord-only accounts get
/// `{discordId}@fake-discord-email.waypoint.io`.
pub fn make_fake_discord_email(discord_id: &str) -> String {
  format!("{discord_id}@fake-discord-email.waypoint.io")
}

/// A registered account as stored in the users table.
#[derive(Debug, Clone)]
pub struct User {
  pub id: i64,
  pub name: String,
  pub email: String,
  /// Salted SHA-256 of the password (salt = email).
  pub password_hash: String,
  pub has_verified_email: bool,
  /// Salted hash of the last issued verification PIN.
  pub verification_pin_hash: Option<String>,
  /// Unix ms when the PIN was issued; the PIN expires after
  /// [`VERIFICATION_PIN_TTL_MS`].
  pub verification_pin_sent_at: Option<i64>,
  pub roles: Vec<String>,
  /// Server the user last asked to play on, paired with the session ticket.
  pub current_server_address: Option<String>,
  pub current_session: Option<String>,
  pub discord_id: Option<String>,
  pub discord_username: Option<String>,
  pub discord_discriminator: Option<String>,
  pub discord_avatar: Option<String>,
  pub created_at: i64,
  pub updated_at: i64,
}

impl User {
  /// Whether the verification PIN issued for this user is past its window.
  /// A user with no recorded issue time counts as expired.
  pub fn pin_expired(&self, now: i64) -> bool {
    match self.verification_pin_sent_at {
      Some(sent_at) => now - sent_at >= VERIFICATION_PIN_TTL_MS,
      None => true,
    }
  }
}

/// Fields needed to insert a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub name: String,
  pub email: String,
  pub password_hash: String,
  pub verification_pin_hash: String,
  /// Discord-provisioned accounts are created pre-verified.
  pub has_verified_email: bool,
  pub discord: Option<DiscordProfileFields>,
}

/// Mutable profile fields mirrored from the Discord identify response.
#[derive(Debug, Clone)]
pub struct DiscordProfileFields {
  pub discord_id: String,
  pub username: Option<String>,
  pub discriminator: Option<String>,
  pub avatar: Option<String>,
}

pub(crate) fn roles_to_column(roles: &[String]) -> String {
  roles.join(",")
}

pub(crate) fn roles_from_column(column: &str) -> Vec<String> {
  column
    .split(',')
    .filter(|r| !r.is_empty())
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fake_discord_email_embeds_id() {
    assert_eq!(
      make_fake_discord_email("321635713512357216132"),
      "321635713512357216132@fake-discord-email.waypoint.io"
    );
  }

  #[test]
  fn roles_round_trip() {
    assert_eq!(roles_to_column(&["user".into(), "admin".into()]), "user,admin");
    assert_eq!(roles_from_column("user,admin"), vec!["user", "admin"]);
    assert!(roles_from_column("").is_empty());
  }
}
