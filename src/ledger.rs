pub mod reader;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod fixtures;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter};

/// Action kinds tracked individually on the leaderboards, named as in the
/// `ActionIdentifiers` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, Display, Serialize)]
pub enum ActionKind {
    #[strum(serialize = "block-place")]
    #[serde(rename = "block-place")]
    BlockPlace,
    #[strum(serialize = "block-break")]
    #[serde(rename = "block-break")]
    BlockBreak,
    #[strum(serialize = "entity-kill")]
    #[serde(rename = "entity-kill")]
    EntityKill,
}

/// One grouped row: how much `subject` accumulated for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub subject: String,
    pub amount: i64,
}

impl Tally {
    pub fn new(subject: impl Into<String>, amount: i64) -> Self {
        Tally {
            subject: subject.into(),
            amount,
        }
    }
}

/// Blocks placed and broken by one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBalance {
    pub player: String,
    pub placed: i64,
    pub broken: i64,
}
