//! Test fixtures shared by the unit tests of this crate.

use std::{cell::RefCell, collections::VecDeque};

use downpore_types::{
    AddOptions, DaemonError, DownloadDaemon, DownloadSource, DownloadState, DownloadStatus, Gid,
    GlobalStats,
};

use crate::rpc::{RawBittorrent, RawBittorrentInfo, RawFile, RawGlobalStat, RawStatus, RawVersion};

pub(crate) fn make_raw_status(gid: &str, status: &str, total: u64, completed: u64) -> RawStatus {
    RawStatus {
        gid: gid.to_string(),
        status: status.to_string(),
        total_length: total.to_string(),
        completed_length: completed.to_string(),
        download_speed: "4096".to_string(),
        upload_speed: "0".to_string(),
        error_code: Some("0".to_string()),
        error_message: Some(String::new()),
        info_hash: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
        dir: Some("/downloads".to_string()),
        connections: "2".to_string(),
        followed_by: vec![],
        files: vec![RawFile {
            path: "/downloads/test_file.bin".to_string(),
            length: total.to_string(),
            completed_length: completed.to_string(),
        }],
        bittorrent: Some(RawBittorrent {
            info: Some(RawBittorrentInfo {
                name: "test_file.bin".to_string(),
            }),
        }),
    }
}

pub(crate) fn make_test_global_stat() -> RawGlobalStat {
    RawGlobalStat {
        download_speed: "1000".to_string(),
        upload_speed: "500".to_string(),
        num_active: "1".to_string(),
        num_waiting: "2".to_string(),
        num_stopped: "3".to_string(),
    }
}

pub(crate) fn make_test_version() -> RawVersion {
    RawVersion {
        version: "1.37.0".to_string(),
        enabled_features: vec!["BitTorrent".to_string(), "Async DNS".to_string()],
    }
}

pub(crate) fn make_status(gid: &str, state: DownloadState, total: u64, completed: u64) -> DownloadStatus {
    DownloadStatus {
        gid: Gid::new(gid),
        state,
        total_length: total,
        completed_length: completed,
        download_speed: 0,
        upload_speed: 0,
        error_code: None,
        error_message: None,
        name: None,
        info_hash: None,
        dir: None,
        files: vec![],
        followed_by: vec![],
        connections: 0,
    }
}

/// A [`DownloadDaemon`] that replays scripted statuses. The last status repeats once the
/// script runs out.
#[derive(Debug, Default)]
pub(crate) struct ScriptedDaemon {
    pub(crate) gid: String,
    pub(crate) statuses: RefCell<VecDeque<DownloadStatus>>,
    pub(crate) polled: RefCell<Vec<Gid>>,
    pub(crate) removed: RefCell<Vec<(Gid, bool)>>,
    pub(crate) fail_status_with: RefCell<Option<DaemonError>>,
}

impl ScriptedDaemon {
    pub(crate) fn new(gid: &str, statuses: Vec<DownloadStatus>) -> Self {
        Self {
            gid: gid.to_string(),
            statuses: RefCell::new(statuses.into()),
            ..Default::default()
        }
    }
}

impl DownloadDaemon for ScriptedDaemon {
    async fn add(
        &self,
        _source: &DownloadSource,
        _options: &AddOptions,
    ) -> Result<Gid, DaemonError> {
        Ok(Gid::new(self.gid.clone()))
    }

    async fn status(&self, gid: &Gid) -> Result<DownloadStatus, DaemonError> {
        self.polled.borrow_mut().push(gid.clone());
        if let Some(err) = self.fail_status_with.borrow_mut().take() {
            return Err(err);
        }
        let mut statuses = self.statuses.borrow_mut();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        status.ok_or_else(|| DaemonError::Protocol("script exhausted".into()))
    }

    async fn pause(&self, _gid: &Gid) -> Result<(), DaemonError> {
        Ok(())
    }

    async fn resume(&self, _gid: &Gid) -> Result<(), DaemonError> {
        Ok(())
    }

    async fn remove(&self, gid: &Gid, force: bool) -> Result<(), DaemonError> {
        self.removed.borrow_mut().push((gid.clone(), force));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadStatus>, DaemonError> {
        Ok(self.statuses.borrow().iter().cloned().collect())
    }

    async fn stats(&self) -> Result<GlobalStats, DaemonError> {
        Ok(GlobalStats {
            download_speed: 0,
            upload_speed: 0,
            num_active: 0,
            num_waiting: 0,
            num_stopped: 0,
        })
    }
}
