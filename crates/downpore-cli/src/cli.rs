use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use downpore_aria2::{Aria2Config, PollSettings};
use downpore_types::DownloadSource;

use crate::CliError;

/// Drive an aria2 daemon over JSON-RPC. Every invocation prints one JSON object on stdout.
#[derive(Debug, Parser)]
#[command(name = "downpore", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Daemon connection overrides
    #[command(flatten)]
    pub(crate) connection: ConnectionArgs,

    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Connection flags. They override `DOWNPORE_RPC_*` from the environment.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct ConnectionArgs {
    /// RPC host of the daemon
    #[arg(long, global = true)]
    pub(crate) host: Option<String>,

    /// RPC port of the daemon
    #[arg(long, global = true)]
    pub(crate) port: Option<u16>,

    /// The daemon's --rpc-secret
    #[arg(long, global = true)]
    pub(crate) secret: Option<String>,

    /// Seconds before a single RPC request is abandoned
    #[arg(long, global = true, value_name = "SECONDS", value_parser = parse_seconds)]
    pub(crate) rpc_timeout: Option<Duration>,
}

impl ConnectionArgs {
    /// Apply the flags on top of `config`.
    pub(crate) fn apply(&self, mut config: Aria2Config) -> Aria2Config {
        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(secret) = &self.secret {
            config = config.with_secret(secret.clone());
        }
        if let Some(timeout) = self.rpc_timeout {
            config = config.with_request_timeout(timeout);
        }
        config
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Add a download and wait for it to finish
    Download {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        poll: PollArgs,

        /// Directory to store the download in
        #[arg(long)]
        download_dir: Option<String>,

        /// Remove a failed or timed out download from the daemon (partial files stay on disk)
        #[arg(long, default_value_t = false)]
        remove_on_failure: bool,
    },

    /// Add a download and return immediately
    Add {
        #[command(flatten)]
        source: SourceArgs,

        /// Directory to store the download in
        #[arg(long)]
        download_dir: Option<String>,
    },

    /// Show the status of a download
    Status {
        #[command(flatten)]
        gid: GidArg,
    },

    /// Wait for an added download to finish
    Wait {
        #[command(flatten)]
        gid: GidArg,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// List the files of a download
    Files {
        #[command(flatten)]
        gid: GidArg,
    },

    /// Pause a download
    Pause {
        #[command(flatten)]
        gid: GidArg,
    },

    /// Resume a paused download
    Resume {
        #[command(flatten)]
        gid: GidArg,
    },

    /// Remove a download, or purge a finished one
    Remove {
        #[command(flatten)]
        gid: GidArg,

        /// Do not wait for peers to be told goodbye
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// List all downloads the daemon knows about
    List,

    /// Show daemon-wide transfer statistics
    Stats,

    /// Generate a test file and seed it until interrupted
    Seed(SeedArgs),
}

/// Where to download from. Exactly one is required.
#[derive(Debug, Clone, Default, Args)]
#[group(required = true, multiple = false)]
pub(crate) struct SourceArgs {
    /// BitTorrent magnet link
    #[arg(long)]
    pub(crate) magnet_link: Option<String>,

    /// Path to a .torrent file
    #[arg(long)]
    pub(crate) torrent_file: Option<PathBuf>,

    /// HTTP(S) or FTP URI
    #[arg(long)]
    pub(crate) uri: Option<String>,
}

impl SourceArgs {
    pub(crate) fn source(&self) -> Result<DownloadSource, CliError> {
        self.magnet_link
            .clone()
            .map(DownloadSource::Magnet)
            .or_else(|| self.torrent_file.clone().map(DownloadSource::TorrentFile))
            .or_else(|| self.uri.clone().map(DownloadSource::Uri))
            .ok_or_else(|| {
                CliError::Usage("one of --magnet-link, --torrent-file or --uri is required".into())
            })
    }
}

#[derive(Debug, Clone, Args)]
pub(crate) struct GidArg {
    /// Download handle returned by `add`
    #[arg(long, visible_alias = "torrent-hash")]
    pub(crate) gid: String,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct PollArgs {
    /// Seconds to wait for the download to finish
    #[arg(long, value_name = "SECONDS", default_value = "3600", value_parser = parse_seconds)]
    pub(crate) timeout: Duration,

    /// Seconds between two status polls
    #[arg(long, value_name = "SECONDS", default_value = "1", value_parser = parse_interval)]
    pub(crate) poll_interval: Duration,
}

impl PollArgs {
    pub(crate) fn settings(&self, remove_on_failure: bool) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            timeout: self.timeout,
            remove_on_failure,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub(crate) struct SeedArgs {
    /// Size of the generated test file in MiB
    #[arg(long, default_value_t = 40)]
    pub(crate) size_mb: u64,

    /// Seed this file instead of generating one
    #[arg(long)]
    pub(crate) existing_file: Option<PathBuf>,

    /// Announce URL to put in the torrent (DHT only when unset)
    #[arg(long)]
    pub(crate) tracker: Option<String>,

    /// Piece length in bytes
    #[arg(long, default_value_t = 32 * 1024)]
    pub(crate) piece_length: usize,

    /// host:port peer hint for the magnet link, can be repeated
    #[arg(long = "peer", value_name = "HOST:PORT")]
    pub(crate) peers: Vec<String>,

    /// Seconds to seed for (until interrupted when unset)
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub(crate) duration: Option<Duration>,

    /// Write the magnet link to this file
    #[arg(long)]
    pub(crate) magnet_file: Option<PathBuf>,

    /// Keep the generated files after seeding
    #[arg(long, default_value_t = false)]
    pub(crate) keep_files: bool,

    /// Seconds between two seeding status lines
    #[arg(long, value_name = "SECONDS", default_value = "5", value_parser = parse_interval)]
    pub(crate) status_interval: Duration,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("{value:?} is not a number of seconds: {e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{value:?}: {e}"))
}

/// Like [`parse_seconds`], but zero is rejected. A zero interval polls the daemon in a busy loop.
fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval = parse_seconds(value)?;
    if interval.is_zero() {
        return Err(format!("{value:?}: interval must be greater than zero"));
    }
    Ok(interval)
}
