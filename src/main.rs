use ledger_stats::cli::{Cli, Command, Format, Overrides};
use ledger_stats::config::{effective_log_limit, Settings};
use ledger_stats::core::stats::load_stats;
use ledger_stats::core::templates::{render_json, render_log_markdown, render_markdown};
use ledger_stats::error::{StatsError, StatsResult};
use ledger_stats::ledger::snapshot;
use ledger_stats::logs::collect_log_stats;
use ledger_stats::scheduler::{JobProcess, Scheduler, SnapshotTask};
use ledger_stats::server::{self, AppState};
use ledger_stats::storage::MemoryCache;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Only the commands reading a snapshot need the environment settings, so
    // a bad PORT or CACHE_TTL never blocks a snapshot.
    let result = match cli.command {
        Command::Snapshot { src, dst } => {
            init_tracing(Level::INFO);
            run_snapshot(src, dst).await
        }
        Command::LogReport {
            paths,
            limit,
            format,
        } => {
            init_tracing(Level::INFO);
            run_log_report(paths, limit, format).await
        }
        Command::Report { overrides, format } => match load_settings(&overrides) {
            Ok(settings) => run_report(&settings, format).await,
            Err(e) => Err(e),
        },
        Command::Serve { overrides } => match load_settings(&overrides) {
            Ok(settings) => run_serve(settings).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// No subscriber is installed yet when this fails, so the error goes to stderr.
fn load_settings(overrides: &Overrides) -> StatsResult<Settings> {
    let settings = Settings::new(overrides).inspect_err(|e| eprintln!("{e}"))?;
    init_tracing(settings.get_trace_level());
    Ok(settings)
}

fn init_tracing(level: Level) {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
    }
}

async fn run_snapshot(src: PathBuf, dst: PathBuf) -> StatsResult<()> {
    let destination = dst.clone();
    tokio::task::spawn_blocking(move || snapshot::copy(&src, &destination)).await??;
    println!("Snapshot written to {}", dst.display());
    Ok(())
}

async fn run_report(settings: &Settings, format: Format) -> StatsResult<()> {
    let config = settings.stats_config();
    let stats = tokio::task::spawn_blocking(move || {
        load_stats(&config.snapshot_path, config.leaderboard_limit)
    })
    .await??;

    let rendered = match format {
        Format::Markdown => render_markdown(&stats)?,
        Format::Json => render_json(&stats)?,
    };
    println!("{rendered}");
    Ok(())
}

async fn run_log_report(paths: Vec<PathBuf>, limit: i64, format: Format) -> StatsResult<()> {
    let limit = effective_log_limit(limit);
    let stats = tokio::task::spawn_blocking(move || collect_log_stats(&paths, limit)).await??;

    let rendered = match format {
        Format::Markdown => render_log_markdown(&stats)?,
        Format::Json => render_json(&stats)?,
    };
    println!("{rendered}");
    Ok(())
}

async fn run_serve(settings: Settings) -> StatsResult<()> {
    let config = settings.stats_config();
    let cache = MemoryCache::new(config.ttl);

    // Kept alive for as long as the server runs.
    let _scheduler = match &settings.ledger_source {
        Some(source) => {
            let task = SnapshotTask::new(
                cache.clone(),
                source.clone(),
                config.snapshot_path.clone(),
            );
            let sched = Scheduler::new(task).await?;

            let jobs = vec![
                JobProcess::InitializeSnapshot, // only ran once, at startup.
                JobProcess::RefreshSnapshot(&settings.snapshot_schedule),
            ];
            for job in jobs {
                sched.add_job(job).await?;
            }

            info!("Starting scheduler.");
            sched.start().await?;
            Some(sched)
        }
        None => {
            info!("No ledger source configured, serving existing snapshots only.");
            None
        }
    };

    let address = settings.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| StatsError::Task(format!("Could not bind {address}: {e}")))?;

    server::serve(listener, AppState::new(cache, config)).await
}
