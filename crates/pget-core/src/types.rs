use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─── Task State Machine ─────────────────────────────
//
//  queued → running → done
//               │
//               ├→ failed
//               └→ cancelled

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Immutable per-download input as accepted over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub url: String,
    #[serde(default)]
    pub download_path: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

/// One accepted download, tracked in memory for its lifetime.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub url: String,
    pub content_length: u64,
    pub parallelism: usize,
    pub output_dir: PathBuf,
    pub filename: String,
    pub state: TaskState,
}

/// One progress sample as pushed through the hub and out to subscribers.
///
/// `speed` carries a sentinel: `-1` means the sample came from a chunk
/// worker and only the byte counters are fresh; `0` marks the final frame
/// of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub downloaded: u64,
    pub total: u64,
    pub speed: i64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.downloaded >= self.total
    }
}

// ─── Error Types ────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PgetError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("does not support range request")]
    RangeNotSupported,

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("invalid range: content length must be positive")]
    InvalidRange,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("empty path")]
    EmptyPath,

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("task finished")]
    TaskUnknown,

    #[error("download cancelled")]
    Cancelled,
}
