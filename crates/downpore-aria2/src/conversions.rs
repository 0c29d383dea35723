//! Type conversions between aria2 wire values and downpore_types.
//!
//! aria2 encodes every number as a decimal string. Conversions parse them and fail with
//! [`DaemonError::Protocol`] rather than defaulting garbage to zero.

use downpore_types::{
    AddOptions, DaemonError, DownloadState, DownloadStatus, FileEntry, Gid, GlobalStats,
};

use crate::rpc::{RawFile, RawGlobalStat, RawOptions, RawStatus, RawVersion};

/// Version information reported by `aria2.getVersion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aria2Version {
    /// aria2 release, e.g. `1.37.0`.
    pub version: String,
    /// Compiled-in features, e.g. `BitTorrent`.
    pub enabled_features: Vec<String>,
}

impl From<RawVersion> for Aria2Version {
    fn from(value: RawVersion) -> Self {
        Self {
            version: value.version,
            enabled_features: value.enabled_features,
        }
    }
}

impl TryFrom<RawStatus> for DownloadStatus {
    type Error = DaemonError;

    fn try_from(value: RawStatus) -> Result<Self, Self::Error> {
        let name = value
            .bittorrent
            .and_then(|b| b.info)
            .map(|info| info.name)
            .filter(|name| !name.is_empty());
        let files = value
            .files
            .into_iter()
            .map(FileEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            state: value.status.parse::<DownloadState>()?,
            total_length: parse_count("totalLength", &value.total_length)?,
            completed_length: parse_count("completedLength", &value.completed_length)?,
            download_speed: parse_count("downloadSpeed", &value.download_speed)?,
            upload_speed: parse_count("uploadSpeed", &value.upload_speed)?,
            connections: parse_count("connections", &value.connections)?,
            gid: Gid::new(value.gid),
            // aria2 reports errorCode "0" for downloads that did not fail.
            error_code: value.error_code.filter(|code| code != "0"),
            error_message: value.error_message.filter(|msg| !msg.is_empty()),
            name,
            info_hash: value.info_hash.filter(|hash| !hash.is_empty()),
            dir: value.dir.filter(|dir| !dir.is_empty()),
            files,
            followed_by: value.followed_by.into_iter().map(Gid::new).collect(),
        })
    }
}

impl TryFrom<RawFile> for FileEntry {
    type Error = DaemonError;

    fn try_from(value: RawFile) -> Result<Self, Self::Error> {
        Ok(Self {
            length: parse_count("length", &value.length)?,
            completed_length: parse_count("completedLength", &value.completed_length)?,
            path: value.path,
        })
    }
}

impl TryFrom<RawGlobalStat> for GlobalStats {
    type Error = DaemonError;

    fn try_from(value: RawGlobalStat) -> Result<Self, Self::Error> {
        Ok(Self {
            download_speed: parse_count("downloadSpeed", &value.download_speed)?,
            upload_speed: parse_count("uploadSpeed", &value.upload_speed)?,
            num_active: parse_count("numActive", &value.num_active)?,
            num_waiting: parse_count("numWaiting", &value.num_waiting)?,
            num_stopped: parse_count("numStopped", &value.num_stopped)?,
        })
    }
}

/// Renders [`AddOptions`] as aria2 per-download options.
pub(crate) fn raw_options(options: &AddOptions) -> RawOptions {
    let mut raw = RawOptions::new();
    if let Some(dir) = &options.download_dir {
        raw.insert("dir".into(), dir.clone());
    }
    if let Some(ratio) = options.seed_ratio {
        raw.insert("seed-ratio".into(), format!("{ratio:.1}"));
    }
    if options.check_integrity {
        raw.insert("check-integrity".into(), "true".into());
    }
    raw
}

/// Parses one of aria2's stringly-typed counters. Absent keys decode as empty strings and
/// count as zero.
fn parse_count(field: &str, value: &str) -> Result<u64, DaemonError> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| DaemonError::Protocol(format!("{field} is not a number: {value:?}")))
}
