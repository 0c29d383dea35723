//! aria2 RPC client implementation.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::debug;

use downpore_types::{
    AddOptions, DaemonError, DownloadDaemon, DownloadSource, DownloadState, DownloadStatus, Gid,
    GlobalStats, validate_magnet_link,
};

use crate::config::Aria2Config;
use crate::conversions::{Aria2Version, raw_options};
use crate::ops::Aria2Ops;
use crate::rpc::{JsonRpcClient, RpcError};


/// Page size for `tellWaiting` / `tellStopped` when listing.
const LIST_PAGE: u32 = 1000;

/// Aria2Client is a download daemon client that uses aria2's JSON-RPC interface.
#[allow(missing_debug_implementations, private_bounds)]
pub struct Aria2Client<T: Aria2Ops = JsonRpcClient> {
    client: T,
}

impl Aria2Client {
    /// Connect to the daemon described by `config`.
    ///
    /// This method is async as reachability is checked with `aria2.getVersion` before the client
    /// is handed out. An unreachable daemon fails with [`DaemonError::Connection`].
    pub async fn connect(config: &Aria2Config) -> Result<Self, DaemonError> {
        let url = config.rpc_url()?;

        debug!("Connecting to aria2 RPC at {url}");
        let client = JsonRpcClient::new(url, config.secret(), config.request_timeout())
            .map_err(map_rpc_error)?;
        let version = client.get_version().await.map_err(map_rpc_error)?;

        debug!("Connected to aria2 {}", version.version);
        Ok(Self { client })
    }
}

#[allow(private_bounds)]
impl<T: Aria2Ops> Aria2Client<T> {
    /// Create an Aria2Client with a custom transport implementation.
    /// This is primarily useful for testing with mocks.
    #[cfg(test)]
    pub(crate) fn with_client(client: T) -> Self {
        Self { client }
    }

    /// Version and compiled-in features of the daemon.
    pub async fn version(&self) -> Result<Aria2Version, DaemonError> {
        let version = self.client.get_version().await.map_err(map_rpc_error)?;
        Ok(version.into())
    }
}

#[allow(private_bounds)]
impl<T: Aria2Ops> DownloadDaemon for Aria2Client<T> {
    async fn add(
        &self,
        source: &DownloadSource,
        options: &AddOptions,
    ) -> Result<Gid, DaemonError> {
        let raw_options = raw_options(options);
        let gid = match source {
            DownloadSource::Uri(uri) => {
                debug!("Adding download from URI: {uri}");
                self.client.add_uri(vec![uri.clone()], raw_options).await
            }
            DownloadSource::Magnet(link) => {
                if !validate_magnet_link(link) {
                    return Err(DaemonError::InvalidSource(format!(
                        "Invalid magnet link format: {link}"
                    )));
                }
                debug!("Adding download from magnet link: {link}");
                self.client.add_uri(vec![link.clone()], raw_options).await
            }
            DownloadSource::TorrentFile(path) => {
                debug!("Adding download from torrent file: {}", path.display());
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| DaemonError::FileSystem(format!("{}: {e}", path.display())))?;
                self.client
                    .add_torrent(BASE64.encode(bytes), raw_options)
                    .await
            }
            DownloadSource::Torrent(bytes) => {
                debug!("Adding download from {} bytes of metainfo", bytes.len());
                self.client
                    .add_torrent(BASE64.encode(bytes), raw_options)
                    .await
            }
        }
        .map_err(map_rpc_error)?;

        debug!("Added download {gid}");
        Ok(Gid::new(gid))
    }

    async fn status(&self, gid: &Gid) -> Result<DownloadStatus, DaemonError> {
        let raw = self
            .client
            .tell_status(gid.as_str())
            .await
            .map_err(map_rpc_error)?;
        let status = DownloadStatus::try_from(raw)?;
        debug!(
            "Status of {gid}: {} ({:.1}%)",
            status.state,
            status.progress_percent()
        );

        Ok(status)
    }

    async fn pause(&self, gid: &Gid) -> Result<(), DaemonError> {
        debug!("Pausing download {gid}");
        self.client
            .pause(gid.as_str())
            .await
            .map_err(map_rpc_error)?;
        debug!("Pause command sent");
        Ok(())
    }

    async fn resume(&self, gid: &Gid) -> Result<(), DaemonError> {
        debug!("Resuming download {gid}");
        self.client
            .unpause(gid.as_str())
            .await
            .map_err(map_rpc_error)?;
        debug!("Resume command sent");
        Ok(())
    }

    async fn remove(&self, gid: &Gid, force: bool) -> Result<(), DaemonError> {
        debug!("Removing download {gid}, force={force}");
        let raw = self
            .client
            .tell_status(gid.as_str())
            .await
            .map_err(map_rpc_error)?;
        let state = raw.status.parse::<DownloadState>()?;

        // Stopped downloads only exist as results, live ones have to be stopped first.
        let removed = if state.is_terminal() {
            self.client.remove_download_result(gid.as_str()).await
        } else if force {
            self.client.force_remove(gid.as_str()).await
        } else {
            self.client.remove(gid.as_str()).await
        };
        removed.map_err(map_rpc_error)?;

        debug!("Remove command sent");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadStatus>, DaemonError> {
        debug!("Listing downloads");
        let mut raw = self.client.tell_active().await.map_err(map_rpc_error)?;
        raw.extend(
            self.client
                .tell_waiting(0, LIST_PAGE)
                .await
                .map_err(map_rpc_error)?,
        );
        raw.extend(
            self.client
                .tell_stopped(0, LIST_PAGE)
                .await
                .map_err(map_rpc_error)?,
        );

        let downloads = raw
            .into_iter()
            .map(DownloadStatus::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Known downloads: {}", downloads.len());

        Ok(downloads)
    }

    async fn stats(&self) -> Result<GlobalStats, DaemonError> {
        debug!("Getting global statistics");
        let stats = self
            .client
            .get_global_stat()
            .await
            .map_err(map_rpc_error)?;
        debug!("Global statistics: {stats:?}");

        GlobalStats::try_from(stats)
    }
}

/// Maps transport errors to daemon errors.
fn map_rpc_error(err: RpcError) -> DaemonError {
    match err {
        RpcError::Connect(msg) | RpcError::Timeout(msg) | RpcError::Transport(msg) => {
            DaemonError::Connection(msg)
        }
        RpcError::Response { message, .. } if message == "Unauthorized" => {
            DaemonError::Unauthorized
        }
        RpcError::Response { code, message } => DaemonError::Rpc { code, message },
        RpcError::Decode(msg) => DaemonError::Protocol(msg),
    }
}
