use itertools::Itertools;
use serde::Serialize;
use std::cmp::Reverse;
use strum::{AsRefStr, EnumIter};

use crate::ledger::{reader::Query, ActionKind, BlockBalance, Tally};

/// Leaderboards computed on every refresh, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    TopPlayers,
    Builders,
    Breakers,
    DeadliestPlayers,
    FavoriteBlocks,
    MobKills,
    EnvironmentalCauses,
    Hotspots,
    Worlds,
    ActionMix,
    HourlyActivity,
}

impl Category {
    pub fn query(&self) -> Query {
        match self {
            Category::TopPlayers => Query::ActionsPerPlayer(None),
            Category::Builders => Query::ActionsPerPlayer(Some(ActionKind::BlockPlace)),
            Category::Breakers => Query::ActionsPerPlayer(Some(ActionKind::BlockBreak)),
            Category::DeadliestPlayers => Query::ActionsPerPlayer(Some(ActionKind::EntityKill)),
            Category::FavoriteBlocks => Query::ObjectsPerAction(ActionKind::BlockPlace),
            Category::MobKills => Query::ObjectsPerAction(ActionKind::EntityKill),
            Category::EnvironmentalCauses => Query::EnvironmentalCauses,
            Category::Hotspots => Query::ActionsPerChunk,
            Category::Worlds => Query::ActionsPerWorld,
            Category::ActionMix => Query::ActionsPerKind,
            Category::HourlyActivity => Query::ActionsPerHour,
        }
    }

    /// Breakdowns of the whole ledger are shown in full.
    pub fn is_capped(&self) -> bool {
        !matches!(
            self,
            Category::Worlds | Category::ActionMix | Category::HourlyActivity
        )
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::TopPlayers => "Top Players (by actions)",
            Category::Builders => "Builders (blocks placed)",
            Category::Breakers => "Breakers (blocks broken)",
            Category::DeadliestPlayers => "Deadliest Players",
            Category::FavoriteBlocks => "Favorite Blocks Placed",
            Category::MobKills => "Most Killed Mobs",
            Category::EnvironmentalCauses => "Top Environmental Causes (no player)",
            Category::Hotspots => "Hottest Chunks",
            Category::Worlds => "World Split",
            Category::ActionMix => "Action Mix",
            Category::HourlyActivity => "Hourly Activity (server time)",
        }
    }

    /// (subject column, value column)
    pub fn headers(&self) -> (&'static str, &'static str) {
        match self {
            Category::TopPlayers => ("Player", "Actions"),
            Category::Builders => ("Player", "Blocks Placed"),
            Category::Breakers => ("Player", "Blocks Broken"),
            Category::DeadliestPlayers => ("Player", "Kills"),
            Category::FavoriteBlocks => ("Block", "Placed"),
            Category::MobKills => ("Mob", "Kills"),
            Category::EnvironmentalCauses => ("Cause", "Events"),
            Category::Hotspots => ("Chunk", "Actions"),
            Category::Worlds => ("World", "Actions"),
            Category::ActionMix => ("Action", "Count"),
            Category::HourlyActivity => ("Hour", "Actions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatRow {
    pub rank: usize,
    pub subject: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub category: Category,
    pub rows: Vec<StatRow>,
}

impl Leaderboard {
    /// Rank tallies of one category, keeping at most `limit` rows when the
    /// category is capped.
    pub fn rank(category: Category, tallies: Vec<Tally>, limit: usize) -> Leaderboard {
        let keep = match category.is_capped() {
            true => limit,
            false => usize::MAX,
        };
        Leaderboard {
            category,
            rows: rank_tallies(tallies, keep),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Amount descending, ties by subject ascending, ranks from 1.
pub fn rank_tallies(tallies: Vec<Tally>, limit: usize) -> Vec<StatRow> {
    tallies
        .into_iter()
        .sorted_unstable_by(|a, b| {
            Reverse(a.amount)
                .cmp(&Reverse(b.amount))
                .then_with(|| a.subject.cmp(&b.subject))
        })
        .take(limit)
        .enumerate()
        .map(|(idx, tally)| StatRow {
            // idx is zero-based
            rank: idx + 1,
            subject: tally.subject,
            value: tally.amount,
        })
        .collect()
}

/// Builders vs breakers: one player's placed and broken blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceRow {
    pub rank: usize,
    pub player: String,
    pub blocks_placed: i64,
    pub blocks_broken: i64,
}

/// Most blocks placed first, then most broken, then by name.
pub fn rank_balance(balance: Vec<BlockBalance>, limit: usize) -> Vec<BalanceRow> {
    balance
        .into_iter()
        .sorted_unstable_by(|a, b| {
            Reverse((a.placed, a.broken))
                .cmp(&Reverse((b.placed, b.broken)))
                .then_with(|| a.player.cmp(&b.player))
        })
        .take(limit)
        .enumerate()
        .map(|(idx, row)| BalanceRow {
            rank: idx + 1,
            player: row.player,
            blocks_placed: row.placed,
            blocks_broken: row.broken,
        })
        .collect()
}
