use std::error::Error;
use std::fmt;
use tokio_cron_scheduler::JobSchedulerError;

/// Custom Error and Result types to unify errors from all sources.
pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug)]
pub enum StatsError {
    /// Live ledger missing or unreadable at copy time.
    SourceUnavailable(String),
    /// Snapshot destination could not be written.
    CopyIo(String),
    /// No snapshot file has been produced yet.
    NotFound(String),
    SchemaMismatch(String),
    Database(String),
    /// A server log could not be read or decompressed.
    LogIo(String),
    Config(String),
    Render(String),
    Scheduler(String),
    Task(String),
}

impl StatsError {
    /// Process exit code for the snapshot command.
    pub fn exit_code(&self) -> u8 {
        match self {
            StatsError::SourceUnavailable(_) => 2,
            StatsError::CopyIo(_) => 3,
            _ => 1,
        }
    }

    /// Errors that mean "no data yet" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StatsError::NotFound(_))
    }
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StatsError::SourceUnavailable(s) => write!(f, "Source Unavailable: {}", s),
            StatsError::CopyIo(s) => write!(f, "Copy IO Error: {}", s),
            StatsError::NotFound(s) => write!(f, "Snapshot Not Found: {}", s),
            StatsError::SchemaMismatch(s) => write!(f, "Schema Mismatch: {}", s),
            StatsError::Database(s) => write!(f, "Database Error: {}", s),
            StatsError::LogIo(s) => write!(f, "Log IO Error: {}", s),
            StatsError::Config(s) => write!(f, "Config Error: {}", s),
            StatsError::Render(s) => write!(f, "Render Error: {}", s),
            StatsError::Scheduler(s) => write!(f, "Scheduler Error: {}", s),
            StatsError::Task(s) => write!(f, "Task Error: {}", s),
        }
    }
}

impl Error for StatsError {}

impl From<rusqlite::Error> for StatsError {
    fn from(error: rusqlite::Error) -> Self {
        StatsError::Database(error.to_string())
    }
}

impl From<figment::Error> for StatsError {
    fn from(error: figment::Error) -> Self {
        StatsError::Config(error.to_string())
    }
}

impl From<minijinja::Error> for StatsError {
    fn from(error: minijinja::Error) -> Self {
        StatsError::Render(error.to_string())
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(error: serde_json::Error) -> Self {
        StatsError::Render(error.to_string())
    }
}

impl From<JobSchedulerError> for StatsError {
    fn from(error: JobSchedulerError) -> Self {
        StatsError::Scheduler(error.to_string())
    }
}

impl From<tokio::task::JoinError> for StatsError {
    fn from(error: tokio::task::JoinError) -> Self {
        StatsError::Task(error.to_string())
    }
}
