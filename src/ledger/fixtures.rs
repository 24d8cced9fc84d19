use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::ledger::ActionKind;

pub const LEDGER_SCHEMA: &str = "
    CREATE TABLE ActionIdentifiers (id INTEGER PRIMARY KEY, action_identifier TEXT NOT NULL);
    CREATE TABLE ObjectIdentifiers (id INTEGER PRIMARY KEY, identifier TEXT NOT NULL);
    CREATE TABLE worlds (id INTEGER PRIMARY KEY, identifier TEXT NOT NULL);
    CREATE TABLE players (id INTEGER PRIMARY KEY, player_id BLOB NOT NULL, player_name TEXT NOT NULL, first_join TEXT NOT NULL, last_join TEXT NOT NULL);
    CREATE TABLE sources (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE actions (
        id INTEGER PRIMARY KEY,
        action_id INT NOT NULL,
        time TEXT NOT NULL,
        x INT NOT NULL,
        y INT NOT NULL,
        z INT NOT NULL,
        world_id INT NOT NULL,
        object_id INT NOT NULL,
        old_object_id INT NOT NULL,
        block_state TEXT NULL,
        old_block_state TEXT NULL,
        source INT NOT NULL,
        player_id INT NULL,
        extra_data TEXT NULL,
        rolled_back BOOLEAN NOT NULL
    );
    INSERT INTO ActionIdentifiers (id, action_identifier) VALUES (1, 'block-break'), (3, 'block-place'), (8, 'entity-kill');
    INSERT INTO ObjectIdentifiers (id, identifier) VALUES (10, 'minecraft:air'), (11, 'minecraft:dirt'), (12, 'minecraft:stone'), (20, 'minecraft:zombie');
    INSERT INTO worlds (id, identifier) VALUES (1, 'minecraft:overworld');
    INSERT INTO sources (id, name) VALUES (1, 'player'), (2, 'gravity');
";

/// Throwaway ledger database with the lookup tables filled in.
pub struct LedgerFixture {
    dir: TempDir,
    path: PathBuf,
}

impl LedgerFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(LEDGER_SCHEMA).unwrap();
        LedgerFixture { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn connection(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }

    pub fn add_player(&self, id: i64, name: &str) {
        self.connection()
            .execute(
                "INSERT INTO players (id, player_id, player_name, first_join, last_join)
                 VALUES (?1, X'00', ?2, '2025-01-01', '2025-01-02')",
                params![id, name],
            )
            .unwrap();
    }

    pub fn add_action(
        &self,
        id: i64,
        kind: ActionKind,
        player: Option<i64>,
        x: i64,
        z: i64,
        time: &str,
    ) {
        insert_action(&self.connection(), id, kind, player, x, z, time);
    }
}

pub fn insert_action(
    conn: &Connection,
    id: i64,
    kind: ActionKind,
    player: Option<i64>,
    x: i64,
    z: i64,
    time: &str,
) {
    let (action_id, object_id) = match kind {
        ActionKind::BlockBreak => (1, 12),
        ActionKind::BlockPlace => (3, 11),
        ActionKind::EntityKill => (8, 20),
    };
    let source = if player.is_some() { 1 } else { 2 };
    conn.execute(
        "INSERT INTO actions (id, action_id, time, x, y, z, world_id, object_id, old_object_id,
                              block_state, old_block_state, source, player_id, extra_data, rolled_back)
         VALUES (?1, ?2, ?3, ?4, 64, ?5, 1, ?6, 10, NULL, NULL, ?7, ?8, NULL, 0)",
        params![id, action_id, time, x, z, object_id, source, player],
    )
    .unwrap();
}

/// Steve places dirt, breaks stone and kills a zombie; gravity breaks a block.
pub fn seed_sample(fixture: &LedgerFixture) {
    fixture.add_player(1, "Steve");
    fixture.add_action(1, ActionKind::BlockPlace, Some(1), 0, 0, "2025-01-01 10:00:00");
    fixture.add_action(2, ActionKind::BlockBreak, Some(1), 1, 1, "2025-01-01 10:05:00");
    fixture.add_action(3, ActionKind::EntityKill, Some(1), 2, 2, "2025-01-01 10:10:00");
    fixture.add_action(4, ActionKind::BlockBreak, None, 3, 3, "2025-01-01 10:15:00");
}

/// Players with a given number of block placements each.
pub fn seed_amounts(fixture: &LedgerFixture, amounts: &[(&str, i64)]) {
    let mut conn = fixture.connection();
    let tx = conn.transaction().unwrap();
    let mut next_action = 1;
    for (player_id, (name, amount)) in (1..).zip(amounts) {
        tx.execute(
            "INSERT INTO players (id, player_id, player_name, first_join, last_join)
             VALUES (?1, X'00', ?2, '2025-01-01', '2025-01-02')",
            params![player_id, name],
        )
        .unwrap();
        for _ in 0..*amount {
            insert_action(
                &tx,
                next_action,
                ActionKind::BlockPlace,
                Some(player_id),
                0,
                0,
                "2025-01-01 12:00:00",
            );
            next_action += 1;
        }
    }
    tx.commit().unwrap();
}
