//! Serving a fixture through a download daemon.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use downpore_types::{
    AddOptions, DaemonError, DownloadDaemon, DownloadSource, DownloadState, DownloadStatus, Gid,
};

use crate::TestFixture;

/// Default time between two seeding status lines.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// A fixture being seeded by a daemon.
///
/// The daemon checks the payload already on disk and then seeds it with no share ratio limit,
/// so the download stays active until [`Seeder::stop`] removes it.
#[derive(Debug)]
pub struct Seeder<'a, D: DownloadDaemon> {
    daemon: &'a D,
    gid: Gid,
}

impl<'a, D: DownloadDaemon> Seeder<'a, D> {
    /// Add the fixture's torrent to `daemon` with the payload's directory as download dir.
    pub async fn start(daemon: &'a D, fixture: &TestFixture) -> Result<Self, DaemonError> {
        let dir = fixture.file_path.parent().ok_or_else(|| {
            DaemonError::FileSystem(format!("{} has no parent", fixture.file_path.display()))
        })?;
        let options = AddOptions {
            download_dir: Some(dir.display().to_string()),
            seed_ratio: Some(0.0),
            check_integrity: true,
        };

        let gid = daemon
            .add(&DownloadSource::Torrent(fixture.torrent.bytes.clone()), &options)
            .await?;
        info!(
            "Seeding {} as {gid} (info hash {})",
            fixture.torrent.name, fixture.torrent.info_hash
        );

        Ok(Self { daemon, gid })
    }

    /// Handle of the seeding download.
    pub fn gid(&self) -> &Gid {
        &self.gid
    }

    /// Current status of the seeding download.
    pub async fn status(&self) -> Result<DownloadStatus, DaemonError> {
        self.daemon.status(&self.gid).await
    }

    /// Log the seeding status every `status_interval` until `duration` elapses (forever when
    /// `None`) or `shutdown` resolves.
    ///
    /// Fails if the daemon reports an error for the download. A download that was removed or
    /// stopped behind our back ends the run.
    pub async fn run<F>(
        &self,
        duration: Option<Duration>,
        status_interval: Duration,
        shutdown: F,
    ) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        tokio::pin!(shutdown);

        loop {
            let status = self.status().await?;
            let elapsed = started.elapsed();
            info!(
                "[{:.0}s] {} | peers: {} | upload: {:.1} KB/s | checked: {:.1}%",
                elapsed.as_secs_f64(),
                status.state,
                status.connections,
                status.upload_speed as f64 / 1024.0,
                status.progress_percent()
            );

            match status.state {
                DownloadState::Error => {
                    return Err(DaemonError::DownloadFailed {
                        gid: self.gid.clone(),
                        message: status
                            .error_message
                            .unwrap_or_else(|| "seeding failed".to_string()),
                    });
                }
                DownloadState::Complete | DownloadState::Removed => {
                    warn!("Seeding of {} ended: {}", self.gid, status.state);
                    return Ok(());
                }
                DownloadState::Waiting | DownloadState::Active | DownloadState::Paused => {}
            }

            let wait = match duration {
                Some(duration) if elapsed >= duration => {
                    info!("Seeding completed after {}s", duration.as_secs());
                    return Ok(());
                }
                Some(duration) => status_interval.min(duration - elapsed),
                None => status_interval,
            };

            tokio::select! {
                () = &mut shutdown => {
                    info!("Seeding stopped");
                    return Ok(());
                }
                () = sleep(wait) => {}
            }
        }
    }

    /// Stop seeding and remove the download from the daemon. The payload stays on disk.
    pub async fn stop(self) -> Result<(), DaemonError> {
        info!("Stopping seeding of {}", self.gid);
        self.daemon.remove(&self.gid, true).await
    }
}
