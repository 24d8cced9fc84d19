use chrono::{DateTime, Utc};
use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StatsError, StatsResult};

// A negative page count copies every page in a single step: the backup then
// reads from one transaction and never restarts when the live writer commits.
const ALL_PAGES: i32 = -1;
const PAUSE_WHEN_BUSY: Duration = Duration::from_millis(250);
const MAX_BUSY_WAIT: Duration = Duration::from_secs(30);
const SOURCE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const TEMP_PREFIX: &str = ".ledger-snapshot-";

/// Destination of the snapshots, and when it was last refreshed.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    path: PathBuf,
    last_copied: Option<DateTime<Utc>>,
}

impl SnapshotHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotHandle {
            path: path.into(),
            last_copied: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` until a copy made through this handle fully succeeded.
    pub fn last_copied(&self) -> Option<DateTime<Utc>> {
        self.last_copied
    }

    pub fn refresh(&mut self, source: &Path) -> StatsResult<DateTime<Utc>> {
        copy(source, &self.path)?;
        let now = Utc::now();
        self.last_copied = Some(now);
        Ok(now)
    }
}

/// Online backup of a live ledger into `destination`.
///
/// The source is opened read-only and read through SQLite's backup API, so
/// the game server keeps writing while the copy runs. The copy lands in a
/// uniquely named temporary file next to the destination, must pass
/// `PRAGMA quick_check`, and is then renamed over the destination: readers
/// see either the previous snapshot or the new one, never a partial file.
/// Concurrent copiers each write their own temporary file.
pub fn copy(source: &Path, destination: &Path) -> StatsResult<()> {
    if !source.is_file() {
        return Err(StatsError::SourceUnavailable(format!(
            "source database not found: {}",
            source.display()
        )));
    }
    if is_same_file(source, destination) {
        return Err(StatsError::CopyIo(format!(
            "refusing to overwrite the live ledger {} with its own snapshot",
            destination.display()
        )));
    }

    let src = open_source(source)?;

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| {
        StatsError::CopyIo(format!("cannot create {}: {e}", parent.display()))
    })?;

    // Removed on drop, whatever happens before `persist`.
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| {
            StatsError::CopyIo(format!("cannot create temp file in {}: {e}", parent.display()))
        })?;

    write_snapshot(&src, temp.path())?;
    persist(temp, destination)?;

    fs::File::open(&parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| StatsError::CopyIo(format!("cannot sync {}: {e}", parent.display())))?;

    info!(
        "Snapshot complete: {} -> {}",
        source.display(),
        destination.display()
    );
    Ok(())
}

#[cfg(unix)]
fn is_same_file(source: &Path, destination: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(source), fs::metadata(destination)) {
        (Ok(src), Ok(dst)) => src.dev() == dst.dev() && src.ino() == dst.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(source: &Path, destination: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(src), Ok(dst)) => src == dst,
        _ => false,
    }
}

fn open_source(source: &Path) -> StatsResult<Connection> {
    let unavailable = |e: rusqlite::Error| {
        StatsError::SourceUnavailable(format!("cannot read {}: {e}", source.display()))
    };

    let src = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(unavailable)?;
    src.busy_timeout(SOURCE_BUSY_TIMEOUT).map_err(unavailable)?;
    // Opening is lazy, make sure this actually is a database.
    src.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(unavailable)?;
    Ok(src)
}

fn write_snapshot(src: &Connection, temp: &Path) -> StatsResult<()> {
    let copy_io =
        |e: rusqlite::Error| StatsError::CopyIo(format!("cannot write {}: {e}", temp.display()));

    let mut dst = Connection::open(temp).map_err(copy_io)?;
    {
        let backup = Backup::new(src, &mut dst).map_err(copy_io)?;
        run_backup(&backup).map_err(copy_io)?;
    }

    // A WAL source hands its journal mode over; the snapshot must be readable
    // by a read-only connection without -wal/-shm companions.
    let mode: String = dst
        .query_row("PRAGMA journal_mode = DELETE", [], |row| row.get(0))
        .map_err(copy_io)?;
    debug!("Snapshot journal mode: {mode}");

    let check: String = dst
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(copy_io)?;
    if check != "ok" {
        return Err(StatsError::CopyIo(format!(
            "snapshot failed consistency check: {check}"
        )));
    }

    dst.close().map_err(|(_, e)| copy_io(e))
}

fn run_backup(backup: &Backup) -> rusqlite::Result<()> {
    let started = Instant::now();
    loop {
        match backup.step(ALL_PAGES)? {
            StepResult::Done => return Ok(()),
            StepResult::More => {}
            _ if started.elapsed() >= MAX_BUSY_WAIT => {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    Some("source stayed locked for the whole backup".to_string()),
                ));
            }
            // Busy or locked by the live writer.
            _ => {
                debug!("Ledger busy, retrying backup step");
                thread::sleep(PAUSE_WHEN_BUSY);
            }
        }
    }
}

fn persist(temp: NamedTempFile, destination: &Path) -> StatsResult<()> {
    temp.persist(destination).map(|_| ()).map_err(|e| {
        // Dropping the returned file removes the temporary copy.
        let detail = e.error.to_string();
        drop(e.file);
        warn!("Discarded snapshot that could not be moved into place");
        StatsError::CopyIo(format!(
            "cannot move snapshot into {}: {detail}",
            destination.display()
        ))
    })
}
