use crate::error::AppError;
use crate::helpers::generate_session_ticket;
use waypoint_db::{Database, User};

/// Mints the opaque per-(user, server) session strings a trusted game
/// server uses to re-identify a player out of band.
pub struct SessionTicketIssuer {
    db: Database,
}

impl SessionTicketIssuer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Mint a fresh ticket and bind it to the user, overwriting whatever
    /// pair was there before — nothing checks that the previous ticket was
    /// ever resolved. Tickets do not expire; a new `play` call is the only
    /// thing that retires one.
    pub async fn issue(
        &self,
        user_id: i64,
        server_address: &str,
        now: i64,
    ) -> Result<String, AppError> {
        let session = generate_session_ticket();
        self.db
            .set_session(user_id, server_address.to_string(), session.clone(), now)
            .await?;
        Ok(session)
    }

    /// Exact-match lookup of (server address, session). Only trusted server
    /// processes call this, so there is no rate limit beyond the router's.
    pub async fn resolve(&self, server_address: &str, session: &str) -> Result<User, AppError> {
        if !server_address.contains(':') {
            return Err(AppError::Validation("bad server IP:port passed".to_string()));
        }
        match self
            .db
            .user_by_session(server_address.to_string(), session.to_string())
            .await?
        {
            Some(user) => Ok(user),
            None => Err(AppError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_db::NewUser;

    async fn issuer_with_user() -> (SessionTicketIssuer, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let user = db
            .create_user(
                NewUser {
                    name: "player".to_string(),
                    email: "player@example.com".to_string(),
                    password_hash: "h".to_string(),
                    verification_pin_hash: "p".to_string(),
                    has_verified_email: true,
                    discord: None,
                },
                0,
            )
            .await
            .unwrap();
        (SessionTicketIssuer::new(db), user.id)
    }

    #[tokio::test]
    async fn issue_then_resolve_round_trips() {
        let (issuer, user_id) = issuer_with_user().await;

        let ticket = issuer.issue(user_id, "1.2.3.4:7777", 0).await.unwrap();
        assert_eq!(ticket.len(), 32);

        let user = issuer.resolve("1.2.3.4:7777", &ticket).await.unwrap();
        assert_eq!(user.id, user_id);
    }

    #[tokio::test]
    async fn new_ticket_retires_the_old_one() {
        let (issuer, user_id) = issuer_with_user().await;

        let first = issuer.issue(user_id, "1.2.3.4:7777", 0).await.unwrap();
        let second = issuer.issue(user_id, "5.6.7.8:7777", 1).await.unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            issuer.resolve("1.2.3.4:7777", &first).await,
            Err(AppError::NotFound)
        ));
        assert!(issuer.resolve("5.6.7.8:7777", &second).await.is_ok());
    }

    #[tokio::test]
    async fn resolve_rejects_addresses_without_a_port() {
        let (issuer, _) = issuer_with_user().await;

        assert!(matches!(
            issuer.resolve("not-an-address", "session").await,
            Err(AppError::Validation(_))
        ));
    }
}
