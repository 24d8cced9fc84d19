pub mod events;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use flate2::read::MultiGzDecoder;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::leaderboard::{rank_tallies, StatRow};
use crate::error::{StatsError, StatsResult};
use crate::ledger::Tally;
use events::LogEvent;

/// Rows per log leaderboard when none, or a non-positive one, is configured.
pub const DEFAULT_LOG_LIMIT: usize = 5;
/// Sessions this short count as connection churn.
const SHORT_SESSION_SECS: i64 = 60;

static FILE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaytimeRow {
    pub rank: usize,
    pub player: String,
    pub seconds: i64,
    pub sessions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChurnRow {
    pub rank: usize,
    pub player: String,
    pub disconnects: i64,
    pub short_sessions: i64,
}

/// Leaderboards computed from the server logs rather than the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub generated_at: DateTime<Utc>,
    pub top_playtime: Vec<PlaytimeRow>,
    pub top_advancements: Vec<StatRow>,
    pub top_player_deaths: Vec<StatRow>,
    pub top_death_causes: Vec<StatRow>,
    pub top_villager_killers: Vec<StatRow>,
    pub connection_churn: Vec<ChurnRow>,
}

/// Running totals while the log lines stream by.
#[derive(Debug, Default)]
pub struct LogTally {
    playtime: HashMap<String, i64>,
    sessions: HashMap<String, i64>,
    open_sessions: HashMap<String, NaiveDateTime>,
    advancements: HashMap<String, i64>,
    player_deaths: HashMap<String, i64>,
    death_causes: HashMap<String, i64>,
    villager_killers: HashMap<String, i64>,
    disconnects: HashMap<String, i64>,
    short_sessions: HashMap<String, i64>,
}

impl LogTally {
    pub fn record(&mut self, event: LogEvent, date: NaiveDate) {
        match event {
            LogEvent::Login { player, time } => {
                self.open_sessions.insert(player, date.and_time(time));
            }
            // A disconnect is logged twice ("lost connection" then "left the
            // game"), only the one closing the session counts.
            LogEvent::Leave { player, time } => {
                let Some(start) = self.open_sessions.remove(&player) else {
                    return;
                };
                bump(&mut self.disconnects, &player, 1);
                let seconds = (date.and_time(time) - start).num_seconds();
                if seconds < 0 {
                    return;
                }
                bump(&mut self.playtime, &player, seconds);
                bump(&mut self.sessions, &player, 1);
                if seconds <= SHORT_SESSION_SECS {
                    bump(&mut self.short_sessions, &player, 1);
                }
            }
            LogEvent::Advancement { player } => bump(&mut self.advancements, &player, 1),
            LogEvent::PlayerDeath { player, cause } => {
                bump(&mut self.player_deaths, &player, 1);
                bump(&mut self.death_causes, &cause, 1);
            }
            LogEvent::VillagerDeath { killer, cause } => {
                if let Some(killer) = killer {
                    bump(&mut self.villager_killers, &killer, 1);
                }
                bump(&mut self.death_causes, &cause, 1);
            }
        }
    }

    /// Rank everything. Sessions still open are left out.
    pub fn finish(self, limit: usize, generated_at: DateTime<Utc>) -> LogStats {
        let top_playtime = self
            .playtime
            .iter()
            .sorted_unstable_by(|a, b| Reverse(a.1).cmp(&Reverse(b.1)).then_with(|| a.0.cmp(b.0)))
            .take(limit)
            .enumerate()
            .map(|(idx, (player, seconds))| PlaytimeRow {
                rank: idx + 1,
                player: player.clone(),
                seconds: *seconds,
                sessions: self.sessions.get(player).copied().unwrap_or(0),
            })
            .collect();

        let short = |player: &String| self.short_sessions.get(player).copied().unwrap_or(0);
        let connection_churn = self
            .disconnects
            .iter()
            .sorted_unstable_by(|a, b| {
                Reverse((a.1, short(a.0)))
                    .cmp(&Reverse((b.1, short(b.0))))
                    .then_with(|| a.0.cmp(b.0))
            })
            .take(limit)
            .enumerate()
            .map(|(idx, (player, disconnects))| ChurnRow {
                rank: idx + 1,
                player: player.clone(),
                disconnects: *disconnects,
                short_sessions: short(player),
            })
            .collect();

        LogStats {
            generated_at,
            top_playtime,
            top_advancements: rank_counts(&self.advancements, limit),
            top_player_deaths: rank_counts(&self.player_deaths, limit),
            top_death_causes: rank_counts(&self.death_causes, limit),
            top_villager_killers: rank_counts(&self.villager_killers, limit),
            connection_churn,
        }
    }
}

fn bump(counter: &mut HashMap<String, i64>, key: &str, by: i64) {
    *counter.entry(key.to_string()).or_default() += by;
}

fn rank_counts(counter: &HashMap<String, i64>, limit: usize) -> Vec<StatRow> {
    let tallies = counter
        .iter()
        .map(|(name, count)| Tally::new(name.as_str(), *count))
        .collect();
    rank_tallies(tallies, limit)
}

/// Stats over every `.log` / `.log.gz` file found in `paths`.
///
/// Directories are read one level deep, files in name order, so that dated
/// logs replay chronologically. Files without a date in their name (the live
/// `latest.log`) are taken to be from today.
pub fn collect_log_stats(paths: &[PathBuf], limit: usize) -> StatsResult<LogStats> {
    collect_log_stats_at(paths, limit, Utc::now())
}

pub fn collect_log_stats_at(
    paths: &[PathBuf],
    limit: usize,
    generated_at: DateTime<Utc>,
) -> StatsResult<LogStats> {
    let limit = match limit {
        0 => DEFAULT_LOG_LIMIT,
        limit => limit,
    };
    let files = log_files(paths)?;
    let today = generated_at.date_naive();

    let mut tally = LogTally::default();
    for file in &files {
        let date = file_date(file).unwrap_or(today);
        let mut events = 0;
        for line in open_log(file)?.split(b'\n') {
            let line = line
                .map_err(|e| StatsError::LogIo(format!("cannot read {}: {e}", file.display())))?;
            if let Some(event) = LogEvent::parse(&String::from_utf8_lossy(&line)) {
                tally.record(event, date);
                events += 1;
            }
        }
        debug!("{events} events in {}", file.display());
    }

    info!("Computed log stats from {} files", files.len());
    Ok(tally.finish(limit, generated_at))
}

fn log_files(paths: &[PathBuf]) -> StatsResult<Vec<PathBuf>> {
    if !paths.iter().any(|p| p.exists()) {
        return Err(StatsError::NotFound(format!(
            "no server logs at {}",
            paths.iter().map(|p| p.display().to_string()).join(", ")
        )));
    }

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let children = fs::read_dir(path)
                .and_then(|entries| entries.map(|e| e.map(|e| e.path())).collect::<Result<Vec<_>, _>>())
                .map_err(|e| StatsError::LogIo(format!("cannot list {}: {e}", path.display())))?;
            files.extend(children.into_iter().filter(|p| is_log_file(p)).sorted());
        } else if path.is_file() {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("log") | Some("gz")
        )
}

fn file_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let caps = FILE_DATE.captures(name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

fn open_log(path: &Path) -> StatsResult<Box<dyn BufRead>> {
    let file = File::open(path)
        .map_err(|e| StatsError::LogIo(format!("cannot open {}: {e}", path.display())))?;
    let reader: Box<dyn Read> = match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Box::new(MultiGzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(Box::new(BufReader::new(reader)))
}
