use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::lock::LockError;
use crate::snapshot::SnapshotError;

/// Machine-readable error codes for operators and report tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    PeriodUnavailable,
    MalformedSnapshot,
    MalformedState,
    StorageIo,
    LockContention,
    InvalidRange,
    ConfigParseError,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "E2001",
            Self::PeriodUnavailable => "E2002",
            Self::InvalidRange => "E2003",
            Self::MalformedSnapshot => "E3001",
            Self::MalformedState => "E3002",
            Self::StorageIo => "E5001",
            Self::LockContention => "E5002",
            Self::ConfigParseError => "E1002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Video or statistic not found",
            Self::PeriodUnavailable => "Requested period is not available",
            Self::InvalidRange => "Date range yields no timestamps",
            Self::MalformedSnapshot => "Malformed raw snapshot",
            Self::MalformedState => "Malformed state file",
            Self::StorageIo => "Storage I/O failure",
            Self::LockContention => "Lock contention",
            Self::ConfigParseError => "Config file parse error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotFound => None,
            Self::PeriodUnavailable => {
                Some("No snapshots exist for that year; pick a range inside the collected history.")
            }
            Self::InvalidRange => Some("Make sure the end date is not before the start date."),
            Self::MalformedSnapshot => {
                Some("Inspect the day file; re-collect the day and run `tstats import` again.")
            }
            Self::MalformedState => {
                Some("Remove the broken TimeSeries files and run `tstats rebuild`.")
            }
            Self::StorageIo => Some("Check disk space and write permissions of the data folder."),
            Self::LockContention => Some("Retry after the other import releases its lock."),
            Self::ConfigParseError => Some("Fix syntax in tubestats.toml and retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while persisting or loading catalog, ledger and time-series state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state for {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::StorageIo,
            Self::Malformed { .. } => ErrorCode::MalformedState,
            Self::Encode { .. } => ErrorCode::InternalUnexpected,
        }
    }
}

/// Public error type of the stats store.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("video {0} not found")]
    VideoNotFound(i64),

    #[error("no data available for {}", .0.format("%Y-%m-%d"))]
    PeriodUnavailable(DateTime<Utc>),

    #[error("no timestamps to query")]
    NoTimestamps,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("worker thread panicked during {0}")]
    WorkerPanicked(&'static str),
}

impl StatsError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::VideoNotFound(_) => ErrorCode::NotFound,
            Self::PeriodUnavailable(_) => ErrorCode::PeriodUnavailable,
            Self::NoTimestamps => ErrorCode::InvalidRange,
            Self::Snapshot(err) => err.code(),
            Self::State(err) => err.code(),
            Self::Lock(err) => err.code(),
            Self::WorkerPanicked(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Whether callers may map this error to a zero value instead of failing.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self.code(), ErrorCode::NotFound | ErrorCode::PeriodUnavailable)
    }
}
