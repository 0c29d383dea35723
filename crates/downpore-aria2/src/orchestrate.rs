//! Add-and-poll orchestration on top of any [`DownloadDaemon`].
//!
//! One download per call. The loop polls `status` at a fixed interval until the download
//! reaches a terminal state or the timeout elapses. Nothing is retried: RPC and connection
//! failures end the loop and propagate to the caller.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use downpore_types::{
    AddOptions, DaemonError, DownloadDaemon, DownloadReport, DownloadSource, DownloadState,
    DownloadStatus, Gid,
};

/// Default time between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on the whole download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Polling knobs for [`download`], [`wait`] and [`wait_for_completion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    /// Time between two status polls.
    pub interval: Duration,
    /// Give up once this much time has passed since the download was added.
    pub timeout: Duration,
    /// Force-remove failed and timed out downloads from the daemon. Partial files stay on disk
    /// either way.
    pub remove_on_failure: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            remove_on_failure: false,
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Complete(DownloadStatus),
    Failed {
        status: DownloadStatus,
        message: String,
    },
    TimedOut(DownloadStatus),
}

/// Add `source` to the daemon and poll it to a terminal state.
///
/// Daemon-reported failures and timeouts are folded into the returned [`DownloadReport`];
/// only RPC and connection failures are returned as `Err`.
pub async fn download<D: DownloadDaemon>(
    daemon: &D,
    source: &DownloadSource,
    options: &AddOptions,
    settings: &PollSettings,
) -> Result<DownloadReport, DaemonError> {
    let started = Instant::now();
    let gid = daemon.add(source, options).await?;
    info!("Download {gid} added, waiting up to {:?}", settings.timeout);

    let outcome = poll(daemon, gid, settings, started).await?;
    let elapsed = started.elapsed().as_secs_f64();

    let report = match outcome {
        Outcome::Complete(status) => {
            info!("Download {} complete after {elapsed:.1}s", status.gid);
            DownloadReport {
                success: true,
                state: Some(status.state),
                elapsed,
                error: None,
                timed_out: false,
                gid: Some(status.gid.clone()),
                status: Some(status),
            }
        }
        Outcome::Failed { status, message } => {
            warn!("Download {} failed: {message}", status.gid);
            discard(daemon, &status, settings).await?;
            DownloadReport {
                success: false,
                state: Some(status.state),
                elapsed,
                error: Some(message),
                timed_out: false,
                gid: Some(status.gid.clone()),
                status: Some(status),
            }
        }
        Outcome::TimedOut(status) => {
            let error = DaemonError::Timeout(settings.timeout).to_string();
            warn!("Download {}: {error}", status.gid);
            discard(daemon, &status, settings).await?;
            DownloadReport {
                success: false,
                state: Some(status.state),
                elapsed,
                error: Some(error),
                timed_out: true,
                gid: Some(status.gid.clone()),
                status: Some(status),
            }
        }
    };

    Ok(report)
}

/// How [`wait`] ended: the last status observed, and why it is not a success if it is not.
///
/// `status` belongs to the GID that was polled last, which differs from the requested one after
/// a magnet metadata handoff.
#[derive(Debug)]
pub struct WaitOutcome {
    /// Last status seen while polling.
    pub status: DownloadStatus,
    /// [`DaemonError::DownloadFailed`] or [`DaemonError::Timeout`], `None` when complete.
    pub failure: Option<DaemonError>,
}

impl WaitOutcome {
    /// The status on completion, the failure otherwise.
    pub fn into_result(self) -> Result<DownloadStatus, DaemonError> {
        match self.failure {
            None => Ok(self.status),
            Some(err) => Err(err),
        }
    }
}

/// Poll an already added download until it reaches a terminal state or `settings.timeout`
/// elapses.
///
/// Daemon-reported failures and timeouts end up in [`WaitOutcome::failure`]; only RPC and
/// connection failures are returned as `Err`.
pub async fn wait<D: DownloadDaemon>(
    daemon: &D,
    gid: &Gid,
    settings: &PollSettings,
) -> Result<WaitOutcome, DaemonError> {
    let outcome = match poll(daemon, gid.clone(), settings, Instant::now()).await? {
        Outcome::Complete(status) => WaitOutcome {
            status,
            failure: None,
        },
        Outcome::Failed { status, message } => {
            discard(daemon, &status, settings).await?;
            WaitOutcome {
                failure: Some(DaemonError::DownloadFailed {
                    gid: status.gid.clone(),
                    message,
                }),
                status,
            }
        }
        Outcome::TimedOut(status) => {
            discard(daemon, &status, settings).await?;
            WaitOutcome {
                status,
                failure: Some(DaemonError::Timeout(settings.timeout)),
            }
        }
    };
    Ok(outcome)
}

/// Poll an already added download until it completes.
///
/// Fails with [`DaemonError::DownloadFailed`] when the daemon reports an error or the download
/// is removed, and with [`DaemonError::Timeout`] once `settings.timeout` elapses.
pub async fn wait_for_completion<D: DownloadDaemon>(
    daemon: &D,
    gid: &Gid,
    settings: &PollSettings,
) -> Result<DownloadStatus, DaemonError> {
    wait(daemon, gid, settings).await?.into_result()
}

async fn poll<D: DownloadDaemon>(
    daemon: &D,
    mut gid: Gid,
    settings: &PollSettings,
    started: Instant,
) -> Result<Outcome, DaemonError> {
    loop {
        let status = daemon.status(&gid).await?;
        debug!(
            "Download {gid}: {} {:.1}% at {} B/s",
            status.state,
            status.progress_percent(),
            status.download_speed
        );

        if status.is_metadata_handoff() {
            // Magnet metadata is a download of its own, the payload continues under a new GID.
            let next = status.followed_by[0].clone();
            info!("Download {gid} fetched metadata, following {next}");
            gid = next;
            continue;
        }

        match status.state {
            DownloadState::Complete => return Ok(Outcome::Complete(status)),
            DownloadState::Error => {
                let message = failure_message(&status);
                return Ok(Outcome::Failed { status, message });
            }
            DownloadState::Removed => {
                return Ok(Outcome::Failed {
                    status,
                    message: "download was removed".to_string(),
                });
            }
            DownloadState::Waiting | DownloadState::Active | DownloadState::Paused => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= settings.timeout {
            return Ok(Outcome::TimedOut(status));
        }
        sleep(settings.interval.min(settings.timeout - elapsed)).await;
    }
}

fn failure_message(status: &DownloadStatus) -> String {
    match (&status.error_message, &status.error_code) {
        (Some(message), _) => message.clone(),
        (None, Some(code)) => format!("aria2 error code {code}"),
        (None, None) => "download failed".to_string(),
    }
}

async fn discard<D: DownloadDaemon>(
    daemon: &D,
    status: &DownloadStatus,
    settings: &PollSettings,
) -> Result<(), DaemonError> {
    if settings.remove_on_failure && status.state != DownloadState::Removed {
        info!("Removing download {} from the daemon", status.gid);
        daemon.remove(&status.gid, true).await?;
    }
    Ok(())
}
