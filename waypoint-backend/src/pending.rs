use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// A completed Discord login waiting for its polling client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuth {
    pub token: String,
    pub user_id: i64,
    pub discord_username: Option<String>,
    pub discord_discriminator: Option<String>,
    pub discord_avatar: Option<String>,
}

/// Bridges the OAuth redirect and the polling client.
///
/// Keys are caller-chosen state tokens; the store makes no attempt to judge
/// their entropy or uniqueness. Entries that are never polled stay here
/// until the process restarts — there is no TTL sweep.
pub struct PendingAuthStore {
    entries: Mutex<HashMap<String, PendingAuth>>,
}

impl PendingAuthStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a completed login under the state token, overwriting any
    /// previous entry for it. Last writer wins on collision.
    pub fn publish(&self, state: String, payload: PendingAuth) {
        debug!(user_id = payload.user_id, "published pending auth");
        self.entries.lock().unwrap().insert(state, payload);
    }

    /// Atomically read and delete the entry for the state token.
    ///
    /// `None` means "not ready": either the callback has not landed yet,
    /// someone already consumed it, or the token was never issued — the
    /// store cannot tell these apart. Under concurrent pollers exactly one
    /// gets the payload.
    pub fn consume(&self, state: &str) -> Option<PendingAuth> {
        self.entries.lock().unwrap().remove(state)
    }
}

impl Default for PendingAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(token: &str) -> PendingAuth {
        PendingAuth {
            token: token.to_string(),
            user_id: 7,
            discord_username: Some("scamp".to_string()),
            discord_discriminator: Some("0001".to_string()),
            discord_avatar: None,
        }
    }

    #[test]
    fn consume_is_exactly_once() {
        let store = PendingAuthStore::new();
        store.publish("state-1".to_string(), payload("t"));

        assert_eq!(store.consume("state-1"), Some(payload("t")));
        assert_eq!(store.consume("state-1"), None);
    }

    #[test]
    fn absent_and_consumed_are_indistinguishable() {
        let store = PendingAuthStore::new();
        assert_eq!(store.consume("never-published"), None);
    }

    #[test]
    fn publish_overwrites_on_collision() {
        let store = PendingAuthStore::new();
        store.publish("state".to_string(), payload("first"));
        store.publish("state".to_string(), payload("second"));

        assert_eq!(store.consume("state").unwrap().token, "second");
        assert_eq!(store.consume("state"), None);
    }

    #[test]
    fn concurrent_pollers_get_one_payload_total() {
        let store = Arc::new(PendingAuthStore::new());
        store.publish("shared".to_string(), payload("t"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.consume("shared").is_some())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }
}
