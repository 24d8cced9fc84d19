use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE ActionIdentifiers (id INTEGER PRIMARY KEY, action_identifier TEXT NOT NULL);
    CREATE TABLE ObjectIdentifiers (id INTEGER PRIMARY KEY, identifier TEXT NOT NULL);
    CREATE TABLE worlds (id INTEGER PRIMARY KEY, identifier TEXT NOT NULL);
    CREATE TABLE players (id INTEGER PRIMARY KEY, player_name TEXT NOT NULL);
    CREATE TABLE sources (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE actions (
        id INTEGER PRIMARY KEY,
        action_id INT NOT NULL,
        time TEXT NOT NULL,
        x INT NOT NULL,
        z INT NOT NULL,
        world_id INT NOT NULL,
        object_id INT NOT NULL,
        source INT NOT NULL,
        player_id INT NULL
    );
    INSERT INTO ActionIdentifiers (id, action_identifier) VALUES (1, 'block-break'), (3, 'block-place'), (8, 'entity-kill');
    INSERT INTO ObjectIdentifiers (id, identifier) VALUES (1, 'minecraft:oak_planks'), (2, 'minecraft:creeper');
    INSERT INTO worlds (id, identifier) VALUES (1, 'minecraft:overworld'), (2, 'minecraft:the_nether');
    INSERT INTO sources (id, name) VALUES (1, 'player'), (2, 'fire');
";

/// Live ledger as the game server would leave it: WAL journal, lookups filled.
pub struct World {
    _dir: TempDir,
    root: PathBuf,
    ledger: PathBuf,
    conn: Connection,
}

impl World {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let ledger = root.join("world").join("ledger.sqlite");
        std::fs::create_dir_all(ledger.parent().unwrap()).unwrap();
        let conn = Connection::open(&ledger).unwrap();
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        World {
            _dir: dir,
            root,
            ledger,
            conn,
        }
    }

    pub fn ledger(&self) -> &Path {
        &self.ledger
    }

    /// Somewhere outside the world directory to put snapshots.
    pub fn stats_dir(&self) -> PathBuf {
        self.root.join("stats")
    }

    pub fn player(&self, id: i64, name: &str) {
        self.conn
            .execute(
                "INSERT INTO players (id, player_name) VALUES (?1, ?2)",
                params![id, name],
            )
            .unwrap();
    }

    /// `count` block placements by `player` in the overworld.
    pub fn place(&self, player: i64, count: i64) {
        for _ in 0..count {
            self.conn
                .execute(
                    "INSERT INTO actions (action_id, time, x, z, world_id, object_id, source, player_id)
                     VALUES (3, '2025-02-01 20:30:00', 100, -100, 1, 1, 1, ?1)",
                    params![player],
                )
                .unwrap();
        }
    }

    /// A mob killed by `player` in the nether.
    pub fn kill(&self, player: i64) {
        self.conn
            .execute(
                "INSERT INTO actions (action_id, time, x, z, world_id, object_id, source, player_id)
                 VALUES (8, '2025-02-01 21:00:00', -1, -17, 2, 2, 1, ?1)",
                params![player],
            )
            .unwrap();
    }
}
