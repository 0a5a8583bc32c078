use crate::address::ServerAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// A server with no heartbeat for this long is evicted on the next read.
pub const DEFAULT_SERVER_TIMEOUT_MS: i64 = 10_000;

/// Hard cap on advertised player slots.
pub const PLAYER_LIMIT: i64 = 100;

const DEFAULT_SERVER_NAME: &str = "Yet Another Waypoint Server";

/// A heartbeat body as posted by a game server. Everything is untrusted:
/// numbers may be missing, fractional, negative, or not numbers at all, and
/// get coerced and clamped on upsert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub name: Option<String>,
    pub max_players: Option<serde_json::Value>,
    pub online: Option<serde_json::Value>,
}

/// Internal Directory record. `last_heartbeat` never leaves this module.
#[derive(Debug, Clone)]
struct ServerRecord {
    address: ServerAddress,
    name: String,
    max_players: i64,
    online: i64,
    last_heartbeat: i64,
}

/// The public view of a registered server, with the staleness bookkeeping
/// stripped.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub ip: String,
    pub port: u16,
    pub name: String,
    pub max_players: i64,
    pub online: i64,
}

impl ServerInfo {
    fn from_record(record: &ServerRecord) -> Self {
        Self {
            ip: record.address.ip.to_string(),
            port: record.address.port,
            name: record.name.clone(),
            max_players: record.max_players,
            online: record.online,
        }
    }
}

/// The ephemeral server directory.
///
/// Process-wide, owned by `AppState`, mutated concurrently by heartbeat
/// handlers. Eviction is lazy: stale entries disappear only when a snapshot
/// is taken, and the sweep plus the copy happen in one critical section so
/// readers never observe a partial eviction.
pub struct Directory {
    servers: Mutex<HashMap<String, ServerRecord>>,
    timeout_ms: AtomicI64,
}

impl Directory {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SERVER_TIMEOUT_MS)
    }

    pub fn with_timeout(timeout_ms: i64) -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
            timeout_ms: AtomicI64::new(timeout_ms),
        }
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    /// Change the staleness timeout at runtime. Takes effect on the next
    /// snapshot.
    pub fn set_timeout_ms(&self, timeout_ms: i64) {
        self.timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    /// Store a heartbeat, replacing any previous record for the address
    /// wholesale and stamping it with `now`.
    ///
    /// Clamping rules: `maxPlayers` is truncated into [1, 100] (non-numeric
    /// falls back to the cap), `online` is truncated into [0, maxPlayers]
    /// (non-numeric becomes 0).
    pub fn upsert(&self, address: ServerAddress, heartbeat: Heartbeat, now: i64) {
        let max_players = coerce_number(heartbeat.max_players.as_ref())
            .unwrap_or(PLAYER_LIMIT as f64)
            .trunc() as i64;
        let max_players = max_players.clamp(1, PLAYER_LIMIT);

        let online = coerce_number(heartbeat.online.as_ref()).unwrap_or(0.0).trunc() as i64;
        let online = online.clamp(0, max_players);

        let record = ServerRecord {
            address,
            name: heartbeat
                .name
                .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            max_players,
            online,
            last_heartbeat: now,
        };

        debug!(address = %address, online, max_players, "heartbeat");
        self.servers.lock().unwrap().insert(address.to_string(), record);
    }

    /// Sweep stale entries, then return an independent copy of the rest.
    ///
    /// Entries whose heartbeat age is `>= timeout` are removed; both steps
    /// run under the map lock so a concurrent heartbeat can never land
    /// between "decide to evict" and "remove".
    pub fn snapshot(&self, now: i64) -> Vec<ServerInfo> {
        let timeout = self.timeout_ms();
        let mut servers = self.servers.lock().unwrap();
        servers.retain(|_, record| now - record.last_heartbeat < timeout);

        let mut infos: Vec<ServerInfo> = servers.values().map(ServerInfo::from_record).collect();
        infos.sort_by(|a, b| (&a.ip, a.port).cmp(&(&b.ip, b.port)));
        infos
    }

    /// Total players and servers across the directory as-is, stale entries
    /// included. Population sampling deliberately does not sweep; stale
    /// servers pollute the stats until the next snapshot evicts them.
    pub fn population(&self) -> (i64, i64) {
        let servers = self.servers.lock().unwrap();
        let players = servers.values().map(|record| record.online).sum();
        (players, servers.len() as i64)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

fn coerce_number(value: Option<&serde_json::Value>) -> Option<f64> {
    value.and_then(serde_json::Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(s: &str) -> ServerAddress {
        s.parse().unwrap()
    }

    fn heartbeat(name: &str, max_players: serde_json::Value, online: serde_json::Value) -> Heartbeat {
        Heartbeat {
            name: Some(name.to_string()),
            max_players: Some(max_players),
            online: Some(online),
        }
    }

    #[test]
    fn upsert_clamps_out_of_range_fields() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("s", json!(500), json!(-3)), 0);

        let snapshot = directory.snapshot(0);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].max_players, 100);
        assert_eq!(snapshot[0].online, 0);
    }

    #[test]
    fn upsert_raises_zero_max_players_to_one() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("s", json!(0), json!(0)), 0);

        let snapshot = directory.snapshot(0);
        assert_eq!(snapshot[0].max_players, 1);
        assert_eq!(snapshot[0].online, 0);
    }

    #[test]
    fn upsert_truncates_fractional_fields() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("s", json!(15.9), json!(7.8)), 0);

        let snapshot = directory.snapshot(0);
        assert_eq!(snapshot[0].max_players, 15);
        assert_eq!(snapshot[0].online, 7);
    }

    #[test]
    fn upsert_coerces_non_numeric_fields() {
        let directory = Directory::new();
        directory.upsert(
            addr("1.2.3.4:7777"),
            heartbeat("s", json!("lots"), json!("nan")),
            0,
        );

        let snapshot = directory.snapshot(0);
        assert_eq!(snapshot[0].max_players, 100);
        assert_eq!(snapshot[0].online, 0);
    }

    #[test]
    fn upsert_clamps_online_to_max_players() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("s", json!(10), json!(25)), 0);

        let snapshot = directory.snapshot(0);
        assert_eq!(snapshot[0].max_players, 10);
        assert_eq!(snapshot[0].online, 10);
    }

    #[test]
    fn upsert_defaults_missing_fields() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), Heartbeat::default(), 0);

        let snapshot = directory.snapshot(0);
        assert_eq!(snapshot[0].name, DEFAULT_SERVER_NAME);
        assert_eq!(snapshot[0].max_players, 100);
        assert_eq!(snapshot[0].online, 0);
        assert_eq!(snapshot[0].max_players.clamp(1, PLAYER_LIMIT), 100);
    }

    #[test]
    fn upsert_replaces_wholesale() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("old", json!(50), json!(5)), 0);
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("new", json!(20), json!(1)), 1);

        let snapshot = directory.snapshot(1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "new");
        assert_eq!(snapshot[0].max_players, 20);
    }

    #[test]
    fn snapshot_evicts_at_exactly_the_timeout() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), Heartbeat::default(), 1_000);

        // Present strictly before the timeout elapses.
        assert_eq!(directory.snapshot(1_000 + DEFAULT_SERVER_TIMEOUT_MS - 1).len(), 1);
        // Gone once the age reaches the timeout.
        assert_eq!(directory.snapshot(1_000 + DEFAULT_SERVER_TIMEOUT_MS).len(), 0);
        // And stays gone: eviction removed the record.
        assert_eq!(directory.snapshot(1_000).len(), 0);
    }

    #[test]
    fn timeout_is_mutable_at_runtime() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), Heartbeat::default(), 0);

        directory.set_timeout_ms(100);
        assert_eq!(directory.snapshot(99).len(), 1);
        assert_eq!(directory.snapshot(100).len(), 0);
    }

    #[test]
    fn snapshot_does_not_expose_last_heartbeat() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), Heartbeat::default(), 123);

        let json = serde_json::to_value(directory.snapshot(123)).unwrap();
        let entry = &json.as_array().unwrap()[0];
        assert!(entry.get("lastHeartbeat").is_none());
        assert!(entry.get("last_heartbeat").is_none());
        assert_eq!(entry["ip"], "1.2.3.4");
        assert_eq!(entry["port"], 7777);
    }

    #[test]
    fn population_counts_stale_entries() {
        let directory = Directory::new();
        directory.upsert(addr("1.2.3.4:7777"), heartbeat("a", json!(100), json!(3)), 0);
        directory.upsert(addr("5.6.7.8:7777"), heartbeat("b", json!(100), json!(4)), 0);

        // Well past the timeout, but no snapshot has swept yet.
        assert_eq!(directory.population(), (7, 2));

        directory.snapshot(DEFAULT_SERVER_TIMEOUT_MS);
        assert_eq!(directory.population(), (0, 0));
    }
}
