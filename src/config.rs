//! Tunable configuration for the collaboration core.

use std::time::Duration;

/// Runtime configuration for the collaboration core. Fields default to the
/// values this crate ships with; override via [`Config::from_env`] in
/// deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Width of the sliding rate-limit window per `(roomId, clientId)`.
    pub rate_window: Duration,
    /// Max weighted ops accepted per `rate_window`.
    pub rate_max: f64,
    /// Weight of a `CURSOR_UPDATE` against the rate budget.
    pub cursor_update_weight: f64,
    /// `pendingBroadcastDepth` at/above which `BACKPRESSURE` is sent.
    pub backpressure_threshold: usize,
    /// Bound on each session's outbound queue.
    pub send_queue_cap: usize,
    /// Idle duration after which an empty room is eligible for reaping.
    pub room_ttl: Duration,
    /// Reaper sweep interval.
    pub reaper_interval: Duration,
    /// Ops since last snapshot that triggers a new snapshot.
    pub snapshot_ops: u64,
    /// Elapsed time since last snapshot that triggers a new snapshot.
    pub snapshot_interval: Duration,
    /// Max `content` length in Unicode scalar values (we count Rust `chars`,
    /// the closest stdlib analogue).
    pub max_content_chars: usize,
    /// Max live participants per room.
    pub max_participants_per_room: usize,
    /// Duration of inactivity before a session is pinged; two missed pings
    /// closes it.
    pub idle_timeout: Duration,
    /// Max length of `roomId` / `userId` / `clientId` fields.
    pub max_id_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_window: Duration::from_secs(1),
            rate_max: 50.0,
            cursor_update_weight: 0.25,
            backpressure_threshold: 100,
            send_queue_cap: 256,
            room_ttl: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
            snapshot_ops: 500,
            snapshot_interval: Duration::from_secs(10 * 60),
            max_content_chars: 10_000,
            max_participants_per_room: 50,
            idle_timeout: Duration::from_secs(5 * 60),
            max_id_len: 100,
        }
    }
}

impl Config {
    /// Overlay environment variables (`COLLAB_RATE_MAX`, `COLLAB_ROOM_TTL_SECS`,
    /// etc.) on top of the defaults. Unset or unparseable variables are
    /// ignored, keeping the default. A lightweight manual env overlay rather
    /// than a full config-file framework, since there are only a handful of
    /// scalars to tune.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_f64("COLLAB_RATE_MAX") {
            cfg.rate_max = v;
        }
        if let Some(v) = env_u64("COLLAB_RATE_WINDOW_SECS") {
            cfg.rate_window = Duration::from_secs(v);
        }
        if let Some(v) = env_usize("COLLAB_BACKPRESSURE_THRESHOLD") {
            cfg.backpressure_threshold = v;
        }
        if let Some(v) = env_usize("COLLAB_SEND_QUEUE_CAP") {
            cfg.send_queue_cap = v;
        }
        if let Some(v) = env_u64("COLLAB_ROOM_TTL_SECS") {
            cfg.room_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("COLLAB_REAPER_INTERVAL_SECS") {
            cfg.reaper_interval = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("COLLAB_SNAPSHOT_OPS") {
            cfg.snapshot_ops = v;
        }
        if let Some(v) = env_u64("COLLAB_SNAPSHOT_INTERVAL_SECS") {
            cfg.snapshot_interval = Duration::from_secs(v);
        }
        if let Some(v) = env_usize("COLLAB_MAX_CONTENT_CHARS") {
            cfg.max_content_chars = v;
        }
        if let Some(v) = env_usize("COLLAB_MAX_PARTICIPANTS_PER_ROOM") {
            cfg.max_participants_per_room = v;
        }
        if let Some(v) = env_u64("COLLAB_IDLE_TIMEOUT_SECS") {
            cfg.idle_timeout = Duration::from_secs(v);
        }
        cfg
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.rate_max, 50.0);
        assert_eq!(cfg.backpressure_threshold, 100);
        assert_eq!(cfg.send_queue_cap, 256);
        assert_eq!(cfg.room_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.reaper_interval, Duration::from_secs(60));
        assert_eq!(cfg.snapshot_ops, 500);
        assert_eq!(cfg.max_content_chars, 10_000);
        assert_eq!(cfg.max_participants_per_room, 50);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(300));
    }
}
