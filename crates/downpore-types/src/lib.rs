//! # Downpore Types
//!
//! This crate defines the data model, the error taxonomy and the [`DownloadDaemon`] trait shared
//! by the downpore crates, plus torrent and magnet link creation.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::Serialize;
use thiserror::Error;

#[cfg(test)]
use {serde_json as _, tempfile as _};

pub mod torrent;

pub use torrent::{
    TorrentDescriptor, TorrentOptions, create_torrent, create_torrent_file, magnet_link,
    validate_magnet_link,
};

/// Error type for every daemon, orchestration and fixture operation.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// The daemon could not be reached (connection refused, request timed out, ...).
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection configuration cannot be turned into an endpoint.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The daemon rejected the RPC secret.
    #[error("authentication required")]
    Unauthorized,

    /// The daemon answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// Error code reported by the daemon.
        code: i64,
        /// Error message reported by the daemon, verbatim.
        message: String,
    },

    /// The daemon answered with something that could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The download source handed to the client is malformed.
    #[error("invalid download source: {0}")]
    InvalidSource(String),

    /// Polling did not observe a terminal state within the caller's bound.
    #[error("download did not complete within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The daemon reported the download as failed.
    #[error("download {gid} failed: {message}")]
    DownloadFailed {
        /// Handle of the failed download.
        gid: Gid,
        /// Failure detail reported by the daemon, verbatim.
        message: String,
    },

    /// Torrent creation failed.
    #[error("generator error: {0}")]
    Generator(String),

    /// File system errors (file not found, permission denied, etc.)
    #[error("file system error: {0}")]
    FileSystem(String),
}

/// Opaque handle the daemon assigns to a download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// Wraps a daemon-assigned identifier.
    pub fn new(gid: impl Into<String>) -> Self {
        Self(gid.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a download comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// Plain HTTP(S)/FTP URI.
    Uri(String),
    /// `magnet:?xt=urn:btih:...` link.
    Magnet(String),
    /// Path to a `.torrent` file readable by this process.
    TorrentFile(PathBuf),
    /// Raw `.torrent` contents.
    Torrent(Vec<u8>),
}

/// Per-download options passed along with an add.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddOptions {
    /// Directory the daemon stores the download in. Daemon default when unset.
    pub download_dir: Option<String>,
    /// Share ratio after which seeding stops. `0.0` seeds without a ratio limit.
    pub seed_ratio: Option<f64>,
    /// Verify existing data before starting. Needed to seed files already on disk.
    pub check_integrity: bool,
}

/// Lifecycle state of a download as reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    /// Queued, not started yet.
    Waiting,
    /// Transferring.
    Active,
    /// Paused by request.
    Paused,
    /// Finished successfully.
    Complete,
    /// Failed.
    Error,
    /// Removed by request.
    Removed,
}

impl DownloadState {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Removed)
    }

    /// The daemon's name for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadState {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "removed" => Ok(Self::Removed),
            other => Err(DaemonError::Protocol(format!(
                "unknown download state {other:?}"
            ))),
        }
    }
}

/// Snapshot of one download.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[allow(missing_docs)] // rationale: same fields as the daemon's status response
pub struct DownloadStatus {
    pub gid: Gid,
    pub state: DownloadState,
    pub total_length: u64,
    pub completed_length: u64,
    /// Bytes per second.
    pub download_speed: u64,
    /// Bytes per second.
    pub upload_speed: u64,
    pub error_code: Option<String>,
    /// Daemon error text, verbatim.
    pub error_message: Option<String>,
    /// Torrent name, when the daemon knows it.
    pub name: Option<String>,
    /// Hex info hash for BitTorrent downloads.
    pub info_hash: Option<String>,
    pub dir: Option<String>,
    pub files: Vec<FileEntry>,
    /// Downloads started as a result of this one (magnet metadata hands off here).
    pub followed_by: Vec<Gid>,
    pub connections: u64,
}

impl DownloadStatus {
    /// Fraction of the payload downloaded, in `[0, 1]`. Zero while the size is unknown.
    pub fn progress(&self) -> f64 {
        if self.total_length == 0 {
            return 0.0;
        }
        (self.completed_length as f64 / self.total_length as f64).min(1.0)
    }

    /// [`Self::progress`] as a percentage.
    pub fn progress_percent(&self) -> f64 {
        self.progress() * 100.0
    }

    /// Whether this is the metadata stage of a magnet download that handed off to another GID.
    pub fn is_metadata_handoff(&self) -> bool {
        self.state == DownloadState::Complete && !self.followed_by.is_empty()
    }
}

/// One file of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct FileEntry {
    pub path: String,
    pub length: u64,
    pub completed_length: u64,
}

/// Daemon-wide transfer statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct GlobalStats {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub num_active: u64,
    pub num_waiting: u64,
    pub num_stopped: u64,
}

/// Terminal outcome of one orchestrated download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadReport {
    /// True only when the download reached [`DownloadState::Complete`].
    pub success: bool,
    /// Last observed state, if any status was read.
    pub state: Option<DownloadState>,
    /// Wall-clock seconds spent, from add to terminal state or timeout.
    pub elapsed: f64,
    /// Failure detail. Daemon errors are carried verbatim.
    pub error: Option<String>,
    /// Whether the download was given up on because the timeout elapsed.
    pub timed_out: bool,
    /// Handle of the download that was tracked last.
    pub gid: Option<Gid>,
    /// Last observed status.
    pub status: Option<DownloadStatus>,
}

/// DownloadDaemon defines the interface downpore needs from a download daemon.
#[allow(async_fn_in_trait)]
pub trait DownloadDaemon {
    /// Add a download. It starts immediately unless the daemon queues it.
    async fn add(&self, source: &DownloadSource, options: &AddOptions)
    -> Result<Gid, DaemonError>;
    /// Current status of a download.
    async fn status(&self, gid: &Gid) -> Result<DownloadStatus, DaemonError>;
    /// Pause an active or waiting download.
    async fn pause(&self, gid: &Gid) -> Result<(), DaemonError>;
    /// Resume a paused download.
    async fn resume(&self, gid: &Gid) -> Result<(), DaemonError>;
    /// Remove a download. `force` skips the daemon's graceful shutdown of peer connections.
    /// Downloaded data stays on disk.
    async fn remove(&self, gid: &Gid, force: bool) -> Result<(), DaemonError>;
    /// All downloads the daemon knows about, active ones first.
    async fn list(&self) -> Result<Vec<DownloadStatus>, DaemonError>;
    /// Daemon-wide statistics.
    async fn stats(&self) -> Result<GlobalStats, DaemonError>;
}
