use crate::cli::Overrides;
use crate::error::StatsResult;
use crate::logs::DEFAULT_LOG_LIMIT;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

const TRACE_LEVELS: [&'static str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
const LOCAL_SETTINGS_YAML_FILE: &str = ".env.local.yaml";

/// Leaderboard size used when none, or a non-positive one, is configured.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

// All settings may be configured via environment variables. Example:
// LEDGER_DB="/srv/stats/ledger.sqlite" would set ledger_db to that path.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_trace_level")]
    trace_level: String,
    #[serde(default = "default_ledger_db")]
    pub ledger_db: PathBuf,
    #[serde(default = "default_stats_limit")]
    pub stats_limit: i64,
    #[serde(default = "default_stats_ttl_sec")]
    pub stats_ttl_sec: u64,
    // Live ledger written by the game server. Snapshots are only scheduled
    // in-process when this is set.
    pub ledger_source: Option<PathBuf>,
    #[serde(default = "default_snapshot_schedule")]
    pub snapshot_schedule: String,
    // Directory of the server's .log / .log.gz files, for the log stats.
    pub logs_dir: Option<PathBuf>,
    #[serde(default = "default_log_stats_limit")]
    pub log_stats_limit: i64,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The only knobs the cache and the aggregator read.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    pub snapshot_path: PathBuf,
    pub ttl: Duration,
    pub leaderboard_limit: usize,
    pub logs_dir: Option<PathBuf>,
    pub log_limit: usize,
}

impl Settings {
    pub fn new(overrides: &Overrides) -> StatsResult<Self> {
        let mut figment = Figment::new();
        if Path::new(LOCAL_SETTINGS_YAML_FILE).exists() {
            eprintln!(
                "\n######################################\n\
                   ##   Found '.env.local.yaml' file,  ##\n\
                   ##   loading local configuration.   ##\n\
                   ######################################\n\
                "
            );
            figment = figment.merge(Yaml::file(LOCAL_SETTINGS_YAML_FILE));
        }
        Self::from_figment(figment.merge(Env::raw()), overrides)
    }

    fn from_figment(figment: Figment, overrides: &Overrides) -> StatsResult<Self> {
        let settings = figment.merge(Serialized::defaults(overrides)).extract()?;
        Ok(settings)
    }

    pub fn get_trace_level(&self) -> Level {
        get_trace_level(&self.trace_level)
    }

    pub fn leaderboard_limit(&self) -> usize {
        effective_limit(self.stats_limit)
    }

    pub fn stats_config(&self) -> StatsConfig {
        StatsConfig {
            snapshot_path: self.ledger_db.clone(),
            ttl: Duration::from_secs(self.stats_ttl_sec),
            leaderboard_limit: self.leaderboard_limit(),
            logs_dir: self.logs_dir.clone(),
            log_limit: effective_log_limit(self.log_stats_limit),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Non-positive limits fall back to [`DEFAULT_LEADERBOARD_LIMIT`].
pub fn effective_limit(raw: i64) -> usize {
    positive_or(raw, DEFAULT_LEADERBOARD_LIMIT)
}

/// Non-positive limits fall back to [`DEFAULT_LOG_LIMIT`].
pub fn effective_log_limit(raw: i64) -> usize {
    positive_or(raw, DEFAULT_LOG_LIMIT)
}

fn positive_or(raw: i64, default: usize) -> usize {
    match usize::try_from(raw) {
        Ok(limit) if limit > 0 => limit,
        _ => default,
    }
}

fn get_trace_level(level_str: &str) -> Level {
    match level_str {
        level if level == TRACE_LEVELS[0] => Level::TRACE,
        level if level == TRACE_LEVELS[1] => Level::DEBUG,
        level if level == TRACE_LEVELS[2] => Level::INFO,
        level if level == TRACE_LEVELS[3] => Level::WARN,
        level if level == TRACE_LEVELS[4] => Level::ERROR,
        // Default trace level
        _ => Level::INFO,
    }
}

fn default_trace_level() -> String {
    "INFO".to_string()
}

fn default_ledger_db() -> PathBuf {
    PathBuf::from("ledger.sqlite")
}

fn default_stats_limit() -> i64 {
    DEFAULT_LEADERBOARD_LIMIT as i64
}

fn default_stats_ttl_sec() -> u64 {
    60
}

fn default_snapshot_schedule() -> String {
    // every 5 minutes, on the minute
    "0 */5 * * * *".to_string()
}

fn default_log_stats_limit() -> i64 {
    DEFAULT_LOG_LIMIT as i64
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}
