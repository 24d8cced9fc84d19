mod common;

use common::World;
use ledger_stats::config::StatsConfig;
use ledger_stats::core::leaderboard::Category;
use ledger_stats::core::stats::{load_stats, StatsSnapshot};
use ledger_stats::error::StatsError;
use ledger_stats::ledger::snapshot;
use ledger_stats::scheduler::SnapshotTask;
use ledger_stats::server::{router, AppState};
use ledger_stats::storage::MemoryCache;

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn rows(stats: &StatsSnapshot, category: Category) -> Vec<(usize, String, i64)> {
    stats
        .leaderboard(category)
        .unwrap()
        .rows
        .iter()
        .map(|r| (r.rank, r.subject.clone(), r.value))
        .collect()
}

#[test]
fn ties_rank_by_name_and_totals_cover_everything() {
    let world = World::new();
    world.player(1, "B");
    world.player(2, "A");
    world.player(3, "C");
    world.place(1, 100);
    world.place(2, 100);
    world.place(3, 50);

    let destination = world.stats_dir().join("ledger.sqlite");
    snapshot::copy(world.ledger(), &destination).unwrap();
    let stats = load_stats(&destination, 2).unwrap();

    assert_eq!(
        rows(&stats, Category::TopPlayers),
        vec![(1, "A".to_string(), 100), (2, "B".to_string(), 100)]
    );
    assert_eq!(stats.totals.sum, 250);
    assert_eq!(stats.totals.distinct_players, 3);
    assert_eq!(stats.totals.per_action.get("block-place"), Some(&250));
}

#[test]
fn empty_ledger_gives_empty_boards() {
    let world = World::new();

    let destination = world.stats_dir().join("ledger.sqlite");
    snapshot::copy(world.ledger(), &destination).unwrap();
    let stats = load_stats(&destination, 10).unwrap();

    assert_eq!(stats.totals.sum, 0);
    assert_eq!(stats.leaderboards.len(), 11);
    assert!(stats.leaderboards.iter().all(|board| board.is_empty()));
}

#[test]
fn negative_coordinates_land_in_the_right_chunk() {
    let world = World::new();
    world.player(1, "Alex");
    world.kill(1);
    world.place(1, 2);

    let destination = world.stats_dir().join("ledger.sqlite");
    snapshot::copy(world.ledger(), &destination).unwrap();
    let stats = load_stats(&destination, 10).unwrap();

    assert_eq!(
        rows(&stats, Category::Hotspots),
        vec![
            (1, "minecraft:overworld (6, -7)".to_string(), 2),
            (2, "minecraft:the_nether (-1, -2)".to_string(), 1),
        ]
    );
    assert_eq!(
        rows(&stats, Category::MobKills),
        vec![(1, "minecraft:creeper".to_string(), 1)]
    );
}

#[test]
fn missing_live_ledger_exits_with_two() {
    let world = World::new();
    let destination = world.stats_dir().join("ledger.sqlite");

    let err = snapshot::copy(&world.stats_dir().join("nope.sqlite"), &destination).unwrap_err();

    assert!(matches!(err, StatsError::SourceUnavailable(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(!destination.exists());
}

async fn get(addr: SocketAddr, path: &str) -> (String, serde_json::Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let status = head.lines().next().unwrap().to_string();
    (status, serde_json::from_str(body).unwrap())
}

#[tokio::test]
async fn served_stats_follow_snapshot_refreshes() {
    let world = World::new();
    world.player(1, "Steve");
    world.place(1, 3);

    let config = StatsConfig {
        snapshot_path: world.stats_dir().join("ledger.sqlite"),
        ttl: Duration::from_secs(3600),
        leaderboard_limit: 10,
        logs_dir: None,
        log_limit: 5,
    };
    let cache = MemoryCache::new(config.ttl);
    let task = SnapshotTask::new(
        cache.clone(),
        world.ledger().to_path_buf(),
        config.snapshot_path.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(cache, config));
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let (status, body) = get(addr, "/api/stats").await;
    assert!(status.contains("503"), "{status}");
    assert_eq!(body["status"], "no_data");

    task.run().await.unwrap();
    let (status, body) = get(addr, "/api/stats").await;
    assert!(status.contains("200"), "{status}");
    assert_eq!(body["totals"]["sum"], 3);

    // Within the TTL, only a refresh makes new actions visible.
    world.kill(1);
    let (_, body) = get(addr, "/api/stats").await;
    assert_eq!(body["totals"]["sum"], 3);
    task.run().await.unwrap();
    let (_, body) = get(addr, "/api/stats").await;
    assert_eq!(body["totals"]["sum"], 4);
    assert_eq!(body["leaderboards"][3]["category"], "deadliest_players");
    assert_eq!(body["leaderboards"][3]["rows"][0]["subject"], "Steve");

    server.abort();
}
