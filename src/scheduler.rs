use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{StatsError, StatsResult};
use crate::ledger::snapshot::SnapshotHandle;
use crate::storage::StatsCache;

pub struct Scheduler {
    scheduler: JobScheduler,
    task: SnapshotTask,
}

pub enum JobProcess<'schedule> {
    InitializeSnapshot,
    RefreshSnapshot(&'schedule str),
}

impl Scheduler {
    pub async fn new(task: SnapshotTask) -> StatsResult<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Scheduler { scheduler, task })
    }

    pub async fn add_job(&self, job_process: JobProcess<'_>) -> StatsResult<uuid::Uuid> {
        let job = match job_process {
            JobProcess::InitializeSnapshot => initialize_snapshot_job(self.task.clone()).await?,
            JobProcess::RefreshSnapshot(schedule) => {
                refresh_snapshot_job(schedule, self.task.clone()).await?
            }
        };
        Ok(self.scheduler.add(job).await?)
    }

    pub async fn start(&self) -> StatsResult<()> {
        Ok(self.scheduler.start().await?)
    }
}

/// One snapshot refresh followed by a cache invalidation.
#[derive(Clone)]
pub struct SnapshotTask {
    cache: StatsCache,
    source: PathBuf,
    handle: Arc<Mutex<SnapshotHandle>>,
}

impl SnapshotTask {
    pub fn new(cache: StatsCache, source: PathBuf, destination: PathBuf) -> Self {
        SnapshotTask {
            cache,
            source,
            handle: Arc::new(Mutex::new(SnapshotHandle::new(destination))),
        }
    }

    /// Copy on the blocking pool, so that stats readers never wait on it.
    pub async fn run(&self) -> StatsResult<()> {
        // Held across the copy so that two ticks never write the same file.
        let mut handle = self.handle.clone().lock_owned().await;
        let source = self.source.clone();
        let copied_at =
            tokio::task::spawn_blocking(move || handle.refresh(&source)).await??;

        self.cache.invalidate();
        info!("Ledger snapshot refreshed at {copied_at}");
        Ok(())
    }

    pub async fn last_copied(&self) -> Option<DateTime<Utc>> {
        self.handle.lock().await.last_copied()
    }
}

//////////////////
// Jobs definition
//////////////////

async fn initialize_snapshot_job(task: SnapshotTask) -> StatsResult<Job> {
    let job = Job::new_one_shot_async(Duration::from_secs(0), move |_uuid, _l| {
        let task = task.clone();
        Box::pin(async move {
            if let Err(e) = task.run().await {
                log_failure(e);
            }
        })
    })?;
    Ok(job)
}

async fn refresh_snapshot_job(schedule: &str, task: SnapshotTask) -> StatsResult<Job> {
    let job = Job::new_async(schedule, move |uuid, mut l| {
        let task = task.clone();
        Box::pin(async move {
            if let Err(e) = task.run().await {
                log_failure(e);
            }

            // Query the next execution time for this job
            let next_tick = l.next_tick_for_job(uuid).await;
            match next_tick {
                Ok(Some(ts)) => info!("Next ledger snapshot at {:?}", ts),
                _ => error!("Could not get next tick for ledger snapshot job"),
            }
        })
    })?;
    Ok(job)
}

// Retried on the next tick either way.
fn log_failure(e: StatsError) {
    match e {
        StatsError::SourceUnavailable(_) => error!("Live ledger unavailable. {e}"),
        _ => error!("Could not snapshot ledger. {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::load_stats;
    use crate::ledger::fixtures::{seed_sample, LedgerFixture};
    use crate::ledger::ActionKind;
    use crate::storage::MemoryCache;

    #[tokio::test]
    async fn refresh_copies_and_invalidates() {
        let fixture = LedgerFixture::new();
        seed_sample(&fixture);
        let destination = fixture.dir().join("snapshot.sqlite");
        let cache: StatsCache = MemoryCache::new(Duration::from_secs(3600));
        let task = SnapshotTask::new(cache.clone(), fixture.path().to_path_buf(), destination.clone());

        task.run().await.unwrap();
        assert!(task.last_copied().await.is_some());
        let compute = || {
            let destination = destination.clone();
            async move { load_stats(&destination, 10) }
        };
        let before = cache.get(compute).await.unwrap();
        assert_eq!(before.totals.sum, 4);

        fixture.add_action(5, ActionKind::EntityKill, Some(1), 0, 0, "2025-01-01 11:00:00");
        task.run().await.unwrap();

        let after = cache.get(compute).await.unwrap();
        assert_eq!(after.totals.sum, 5);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_cache_alone() {
        let fixture = LedgerFixture::new();
        let cache: StatsCache = MemoryCache::new(Duration::from_secs(3600));
        let task = SnapshotTask::new(
            cache.clone(),
            fixture.dir().join("missing.sqlite"),
            fixture.dir().join("snapshot.sqlite"),
        );

        let result = task.run().await;

        assert!(matches!(result, Err(StatsError::SourceUnavailable(_))));
        assert!(task.last_copied().await.is_none());
        assert!(cache.peek().is_none());
    }

    #[tokio::test]
    async fn jobs_register_with_the_scheduler() {
        let fixture = LedgerFixture::new();
        let cache: StatsCache = MemoryCache::new(Duration::from_secs(60));
        let task = SnapshotTask::new(
            cache,
            fixture.path().to_path_buf(),
            fixture.dir().join("snapshot.sqlite"),
        );
        let scheduler = Scheduler::new(task).await.unwrap();

        scheduler.add_job(JobProcess::InitializeSnapshot).await.unwrap();
        scheduler
            .add_job(JobProcess::RefreshSnapshot("0 */5 * * * *"))
            .await
            .unwrap();
    }
}
