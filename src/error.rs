use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Unified application error type.
///
/// The first group of variants mirrors the stages of a sync. A failure in any
/// of them aborts the whole run, so git errors are mapped to the stage they
/// happened in rather than converted wholesale.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unable to prepare the destination {}. {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to clone {url}. {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },
    #[error("Cloning {url} did not finish within {}.", humantime::format_duration(*timeout))]
    CloneTimeout { url: String, timeout: Duration },
    #[error("Unable to resolve references. {0}")]
    RefResolution(#[source] git2::Error),
    #[error("Unable to compute the diff for commit {commit}. {source}")]
    Diff {
        commit: String,
        #[source]
        source: git2::Error,
    },
    #[error("Unable to check out branch {branch}. {source}")]
    Checkout {
        branch: String,
        #[source]
        source: git2::Error,
    },
    #[error("Unable to open the repository at {}. {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },
    #[error("Errored while handling a file. {0}")]
    Io(#[from] std::io::Error),
    #[error("Error while writing information to a string. {0}")]
    BufferWrite(#[from] std::fmt::Error),
    #[error("Error serializing json. {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Runtime error. {0}")]
    TokioJoin(#[from] tokio::task::JoinError),
    #[error("Error parsing the duration string. {0}")]
    DurationParse(#[from] humantime::DurationError),
    #[error("Commit timestamp is out of range. {0}")]
    TimeRange(#[from] time::error::ComponentRange),
    #[error("Directory not found error. {0}")]
    DirNotFound(#[from] repo_sync_dirs::DirError),
}

/// Convenience alias for results that bubble `AppError`.
pub type AppResult<T> = Result<T, AppError>;
