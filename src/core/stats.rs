use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::config::DEFAULT_LEADERBOARD_LIMIT;
use crate::core::leaderboard::{rank_balance, BalanceRow, Category, Leaderboard};
use crate::error::StatsResult;
use crate::ledger::reader::LedgerReader;

/// Scalar metrics over the whole ledger, independent of the leaderboard limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Total recorded actions.
    pub sum: i64,
    pub distinct_players: i64,
    /// action identifier => number of actions
    pub per_action: BTreeMap<String, i64>,
}

/// Everything computed from one snapshot. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub totals: Totals,
    pub leaderboards: Vec<Leaderboard>,
    /// Placed and broken blocks per player, capped like the leaderboards.
    pub builders_vs_breakers: Vec<BalanceRow>,
}

impl StatsSnapshot {
    pub fn leaderboard(&self, category: Category) -> Option<&Leaderboard> {
        self.leaderboards.iter().find(|l| l.category == category)
    }
}

pub fn compute_stats(reader: &LedgerReader, limit: usize) -> StatsResult<StatsSnapshot> {
    compute_stats_at(reader, limit, Utc::now())
}

/// Same as [`compute_stats`] with the timestamp supplied by the caller, so
/// that identical inputs give identical snapshots.
pub fn compute_stats_at(
    reader: &LedgerReader,
    limit: usize,
    generated_at: DateTime<Utc>,
) -> StatsResult<StatsSnapshot> {
    let limit = match limit {
        0 => DEFAULT_LEADERBOARD_LIMIT,
        limit => limit,
    };

    let leaderboards = Category::iter()
        .map(|category| {
            let tallies = reader.tally(category.query())?;
            debug!("{} raw rows for {}", tallies.len(), category.as_ref());
            Ok(Leaderboard::rank(category, tallies, limit))
        })
        .collect::<StatsResult<Vec<Leaderboard>>>()?;

    let totals = Totals {
        sum: reader.total_actions()?,
        distinct_players: reader.distinct_players()?,
        per_action: reader
            .totals_per_kind()?
            .into_iter()
            .map(|t| (t.subject, t.amount))
            .collect(),
    };

    Ok(StatsSnapshot {
        generated_at,
        totals,
        leaderboards,
        builders_vs_breakers: rank_balance(reader.block_balance()?, limit),
    })
}

/// Open the snapshot at `path` and compute its stats.
pub fn load_stats(path: &Path, limit: usize) -> StatsResult<StatsSnapshot> {
    let reader = LedgerReader::open(path)?;
    let stats = compute_stats(&reader, limit)?;
    info!(
        "Computed stats from {} ({} actions)",
        reader.path().display(),
        stats.totals.sum
    );
    Ok(stats)
}
