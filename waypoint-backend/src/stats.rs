use crate::directory::Directory;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Minimum spacing between population samples, shared across all servers.
pub const DEFAULT_SAMPLE_INTERVAL_MS: i64 = 60_000;

/// Header row of the stats dump. Rows follow as `time,playersOnline,serversOnline`.
pub const STATS_HEADER: &str = "Time,PlayersOnline,ServersOnline";

/// One timestamped population measurement across the whole directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSample {
    pub time: i64,
    pub players_online: i64,
    pub servers_online: i64,
}

impl StatsSample {
    /// Parse one archive row. Returns `None` for anything that is not three
    /// comma-separated integers (headers, blank lines, corruption).
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(',');
        let time = fields.next()?.parse().ok()?;
        let players_online = fields.next()?.parse().ok()?;
        let servers_online = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            time,
            players_online,
            servers_online,
        })
    }

    fn render(&self) -> String {
        format!("{},{},{}", self.time, self.players_online, self.servers_online)
    }
}

#[derive(Default)]
struct SamplerState {
    live: Vec<StatsSample>,
    last_sample_at: Option<i64>,
}

/// Rate-limited population sampler.
///
/// The historical archive is loaded once at startup and immutable after
/// that; the live sequence is append-only for the process lifetime. Query
/// output is historical ++ live, which is chronological because the archive
/// predates the process.
pub struct StatsSampler {
    interval_ms: i64,
    historical: Vec<StatsSample>,
    state: Mutex<SamplerState>,
}

impl StatsSampler {
    pub fn new(interval_ms: i64) -> Self {
        Self::with_archive(interval_ms, Vec::new())
    }

    pub fn with_archive(interval_ms: i64, historical: Vec<StatsSample>) -> Self {
        Self {
            interval_ms,
            historical,
            state: Mutex::new(SamplerState::default()),
        }
    }

    /// Read the historical archive. Stats are best-effort telemetry, not a
    /// ledger: an unreadable file yields an empty archive and a corrupt row
    /// is skipped, never an error.
    pub fn load_archive(path: &Path) -> Vec<StatsSample> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %path.display(), %err, "stats archive not readable, starting empty");
                return Vec::new();
            }
        };

        let mut samples = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match StatsSample::parse(line) {
                Some(sample) => samples.push(sample),
                None => debug!(line, "skipping unparsable stats row"),
            }
        }
        samples
    }

    /// Called after every successful heartbeat upsert. Appends a sample of
    /// the entire current directory if the previous sample is older than the
    /// interval. The rate limit is global, not per-server.
    pub fn maybe_sample(&self, directory: &Directory, now: i64) {
        let mut state = self.state.lock().unwrap();
        let due = state
            .last_sample_at
            .is_none_or(|last| now - last > self.interval_ms);
        if !due {
            return;
        }

        let (players_online, servers_online) = directory.population();
        state.live.push(StatsSample {
            time: now,
            players_online,
            servers_online,
        });
        state.last_sample_at = Some(now);
        debug!(players_online, servers_online, "took population sample");
    }

    /// Full stats dump: header, then archive rows, then live rows.
    pub fn render(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut out = String::from(STATS_HEADER);
        out.push('\n');
        for sample in self.historical.iter().chain(state.live.iter()) {
            out.push_str(&sample.render());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Heartbeat;
    use serde_json::json;

    fn heartbeat(online: i64) -> Heartbeat {
        Heartbeat {
            name: None,
            max_players: Some(json!(100)),
            online: Some(json!(online)),
        }
    }

    fn populated_directory() -> Directory {
        let directory = Directory::new();
        directory.upsert("1.2.3.4:7777".parse().unwrap(), heartbeat(3), 0);
        directory.upsert("5.6.7.8:7777".parse().unwrap(), heartbeat(4), 0);
        directory
    }

    #[test]
    fn samples_are_rate_limited_globally() {
        let directory = populated_directory();
        let sampler = StatsSampler::new(60_000);

        sampler.maybe_sample(&directory, 1_000);
        sampler.maybe_sample(&directory, 2_000);
        sampler.maybe_sample(&directory, 61_000); // exactly the interval: not yet due
        sampler.maybe_sample(&directory, 61_001);

        let rendered = sampler.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], STATS_HEADER);
        assert_eq!(lines[1..], ["1000,7,2", "61001,7,2"]);
    }

    #[test]
    fn sample_covers_the_whole_directory() {
        let directory = populated_directory();
        let sampler = StatsSampler::new(60_000);
        sampler.maybe_sample(&directory, 5);

        assert!(sampler.render().contains("5,7,2"));
    }

    #[test]
    fn render_concatenates_archive_then_live() {
        let archive = vec![
            StatsSample { time: 10, players_online: 1, servers_online: 1 },
            StatsSample { time: 20, players_online: 2, servers_online: 1 },
        ];
        let sampler = StatsSampler::with_archive(60_000, archive);
        sampler.maybe_sample(&populated_directory(), 30);

        assert_eq!(
            sampler.render(),
            format!("{STATS_HEADER}\n10,1,1\n20,2,1\n30,7,2\n")
        );
    }

    #[test]
    fn parse_skips_corrupt_rows() {
        assert_eq!(
            StatsSample::parse("123,4,5"),
            Some(StatsSample { time: 123, players_online: 4, servers_online: 5 })
        );
        assert_eq!(StatsSample::parse(STATS_HEADER), None);
        assert_eq!(StatsSample::parse("123,4"), None);
        assert_eq!(StatsSample::parse("123,4,5,6"), None);
        assert_eq!(StatsSample::parse("123,four,5"), None);
        assert_eq!(StatsSample::parse(""), None);
    }

    #[test]
    fn load_archive_tolerates_corruption_and_missing_files() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("waypoint-stats-test-{}.csv", std::process::id()));
        std::fs::write(&path, format!("{STATS_HEADER}\n100,5,2\ngarbage\n200,6,3\n")).unwrap();

        let samples = StatsSampler::load_archive(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].time, 100);
        assert_eq!(samples[1].time, 200);

        assert!(StatsSampler::load_archive(Path::new("/nonexistent/stats.csv")).is_empty());
    }
}
