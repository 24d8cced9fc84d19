use rusqlite::{Connection, ErrorCode, OpenFlags, ToSql};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{StatsError, StatsResult};
use crate::ledger::{ActionKind, BlockBalance, Tally};

// (table, columns the queries below rely on)
const REQUIRED_SCHEMA: [(&str, &[&str]); 6] = [
    (
        "actions",
        &[
            "action_id",
            "time",
            "x",
            "z",
            "world_id",
            "object_id",
            "source",
            "player_id",
        ],
    ),
    ("ActionIdentifiers", &["id", "action_identifier"]),
    ("ObjectIdentifiers", &["id", "identifier"]),
    ("worlds", &["id", "identifier"]),
    ("players", &["id", "player_name"]),
    ("sources", &["id", "name"]),
];

/// Fixed set of grouped queries over the ledger schema. Every query yields
/// `(subject, amount)` over the full table, ranking is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Actions per player, optionally restricted to one action kind.
    ActionsPerPlayer(Option<ActionKind>),
    /// Objects involved in one action kind (blocks placed, mobs killed).
    ObjectsPerAction(ActionKind),
    ActionsPerKind,
    ActionsPerWorld,
    /// Actions without a player, grouped by source.
    EnvironmentalCauses,
    ActionsPerChunk,
    ActionsPerHour,
}

impl Query {
    fn sql(&self) -> &'static str {
        match self {
            Query::ActionsPerPlayer(None) => {
                "SELECT p.player_name, COUNT(*)
                 FROM actions a
                 JOIN players p ON p.id = a.player_id
                 GROUP BY p.player_name"
            }
            Query::ActionsPerPlayer(Some(_)) => {
                "SELECT p.player_name, COUNT(*)
                 FROM actions a
                 JOIN players p ON p.id = a.player_id
                 JOIN ActionIdentifiers ai ON ai.id = a.action_id
                 WHERE ai.action_identifier = ?1
                 GROUP BY p.player_name"
            }
            Query::ObjectsPerAction(_) => {
                "SELECT o.identifier, COUNT(*)
                 FROM actions a
                 JOIN ObjectIdentifiers o ON o.id = a.object_id
                 JOIN ActionIdentifiers ai ON ai.id = a.action_id
                 WHERE ai.action_identifier = ?1
                 GROUP BY o.identifier"
            }
            Query::ActionsPerKind => {
                "SELECT ai.action_identifier, COUNT(*)
                 FROM actions a
                 JOIN ActionIdentifiers ai ON ai.id = a.action_id
                 GROUP BY ai.action_identifier"
            }
            Query::ActionsPerWorld => {
                "SELECT w.identifier, COUNT(*)
                 FROM actions a
                 JOIN worlds w ON w.id = a.world_id
                 GROUP BY w.identifier"
            }
            Query::EnvironmentalCauses => {
                "SELECT s.name, COUNT(*)
                 FROM actions a
                 JOIN sources s ON s.id = a.source
                 WHERE a.player_id IS NULL
                 GROUP BY s.name"
            }
            // Arithmetic shift floors negative coordinates into the right chunk.
            Query::ActionsPerChunk => {
                "SELECT printf('%s (%d, %d)', w.identifier, a.x >> 4, a.z >> 4) AS chunk, COUNT(*)
                 FROM actions a
                 JOIN worlds w ON w.id = a.world_id
                 GROUP BY chunk"
            }
            Query::ActionsPerHour => {
                "SELECT strftime('%H', a.time) AS hour, COUNT(*)
                 FROM actions a
                 WHERE strftime('%H', a.time) IS NOT NULL
                 GROUP BY hour"
            }
        }
    }

    fn action_kind(&self) -> Option<ActionKind> {
        match self {
            Query::ActionsPerPlayer(kind) => *kind,
            Query::ObjectsPerAction(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Read-only handle on a ledger snapshot.
pub struct LedgerReader {
    conn: Connection,
    path: PathBuf,
}

impl LedgerReader {
    /// Open a snapshot without ever declaring write intent on it, then check
    /// that every table and column the queries rely on is present.
    pub fn open(path: impl AsRef<Path>) -> StatsResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StatsError::NotFound(format!(
                "no ledger snapshot at {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let reader = LedgerReader {
            conn,
            path: path.to_path_buf(),
        };
        reader
            .conn
            .execute_batch("PRAGMA temp_store = MEMORY; PRAGMA query_only = ON;")
            .map_err(|e| reader.schema_error(e))?;
        reader.check_schema()?;
        debug!("Opened ledger snapshot {}", reader.path.display());
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_schema(&self) -> StatsResult<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .map_err(|e| self.schema_error(e))?;

        for (table, columns) in REQUIRED_SCHEMA {
            let present = stmt
                .query_map([table], |row| row.get::<_, String>(0))
                .and_then(|rows| rows.collect::<Result<Vec<String>, _>>())
                .map_err(|e| self.schema_error(e))?;

            if present.is_empty() {
                return Err(StatsError::SchemaMismatch(format!(
                    "table '{}' missing from {}",
                    table,
                    self.path.display()
                )));
            }
            if let Some(column) = columns
                .iter()
                .find(|column| !present.iter().any(|name| name == *column))
            {
                return Err(StatsError::SchemaMismatch(format!(
                    "column '{}.{}' missing from {}",
                    table,
                    column,
                    self.path.display()
                )));
            }
        }
        Ok(())
    }

    // A file that is not a database at all only fails on first read.
    fn schema_error(&self, error: rusqlite::Error) -> StatsError {
        match error.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) => StatsError::SchemaMismatch(format!(
                "{} is not a SQLite database",
                self.path.display()
            )),
            _ => error.into(),
        }
    }

    pub fn tally(&self, query: Query) -> StatsResult<Vec<Tally>> {
        let mut stmt = self.conn.prepare_cached(query.sql())?;
        let kind = query.action_kind().map(|kind| kind.as_ref().to_string());
        let params: Vec<&dyn ToSql> = kind.iter().map(|k| k as &dyn ToSql).collect();

        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(Tally {
                subject: row.get(0)?,
                amount: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<Tally>, _>>()?)
    }

    /// Top actors for one tracked action kind.
    pub fn actors_for(&self, kind: ActionKind) -> StatsResult<Vec<Tally>> {
        self.tally(Query::ActionsPerPlayer(Some(kind)))
    }

    /// Global totals per action identifier.
    pub fn totals_per_kind(&self) -> StatsResult<Vec<Tally>> {
        self.tally(Query::ActionsPerKind)
    }

    /// Placed and broken blocks side by side, one row per player.
    pub fn block_balance(&self) -> StatsResult<Vec<BlockBalance>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT p.player_name,
                    COALESCE(SUM(ai.action_identifier = ?1), 0),
                    COALESCE(SUM(ai.action_identifier = ?2), 0)
             FROM actions a
             JOIN players p ON p.id = a.player_id
             JOIN ActionIdentifiers ai ON ai.id = a.action_id
             GROUP BY p.player_name",
        )?;
        let rows = stmt.query_map(
            [
                ActionKind::BlockPlace.as_ref(),
                ActionKind::BlockBreak.as_ref(),
            ],
            |row| {
                Ok(BlockBalance {
                    player: row.get(0)?,
                    placed: row.get(1)?,
                    broken: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<BlockBalance>, _>>()?)
    }

    pub fn total_actions(&self) -> StatsResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))?)
    }

    pub fn distinct_players(&self) -> StatsResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(DISTINCT player_id) FROM actions WHERE player_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?)
    }
}
