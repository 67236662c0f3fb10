use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stream::StreamName;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub scheduler: SchedulerConfig,
    pub streams: StreamsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `METRONOME_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("METRONOME_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            streams: StreamsConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  postgres:    host={}, db={}, max_connections={}",
            self.postgres.host, self.postgres.database, self.postgres.max_connections
        );
        tracing::info!(
            "  scheduler:   alarm_interval={}s, maintenance_interval={}s, rotate_after={}h, max_concurrent_checks={}",
            self.scheduler.alarm_interval_secs,
            self.scheduler.maintenance_interval_secs,
            self.scheduler.rotate_after_hours,
            self.scheduler.max_concurrent_checks
        );
        tracing::info!("  streams:     {}", self.streams.names.join(", "));
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "metronome"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Cadences and limits for the maintenance / alarm-check scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub alarm_interval_secs: u64,
    pub maintenance_interval_secs: u64,
    /// Partitions created more than this many hours ago are rotated out.
    pub rotate_after_hours: u64,
    /// Upper bound on alarm checks executing at the same time.
    pub max_concurrent_checks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alarm_interval_secs: 10,
            maintenance_interval_secs: 600,
            rotate_after_hours: 720,
            max_concurrent_checks: 64,
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            alarm_interval_secs: profiled_env_u64(p, "ALARM_INTERVAL_SECS", defaults.alarm_interval_secs),
            maintenance_interval_secs: profiled_env_u64(
                p,
                "MAINTENANCE_INTERVAL_SECS",
                defaults.maintenance_interval_secs,
            ),
            rotate_after_hours: profiled_env_u64(p, "ROTATE_AFTER_HOURS", defaults.rotate_after_hours),
            max_concurrent_checks: profiled_env_u32(p, "MAX_CONCURRENT_CHECKS", 64) as usize,
        }
    }

    pub fn alarm_interval(&self) -> Duration {
        Duration::from_secs(self.alarm_interval_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.rotate_after_hours.saturating_mul(3_600))
    }
}

// ── Streams ───────────────────────────────────────────────────

pub const DEFAULT_STREAMS: &[&str] = &["response_time", "request_time"];

/// Logical streams kept provisioned by the maintenance pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    pub names: Vec<String>,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            names: DEFAULT_STREAMS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StreamsConfig {
    fn from_env_profiled(p: &str) -> Self {
        match profiled_env_opt(p, "METRIC_STREAMS") {
            Some(raw) => Self {
                names: raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            },
            None => Self::default(),
        }
    }

    /// Validate every configured name.
    pub fn stream_names(&self) -> Result<Vec<StreamName>, crate::CoreError> {
        self.names.iter().map(|n| StreamName::new(n.as_str())).collect()
    }
}
