//! Torrent and magnet link creation.
//!
//! This is not daemon specific, so it is not part of the [`DownloadDaemon`](crate::DownloadDaemon)
//! trait.

use std::{fs, path::Path, sync::LazyLock};

use metainfo::{Metainfo, MetainfoBuilder, PieceLength};
use regex::Regex;
use serde::Serialize;
use url::form_urlencoded::byte_serialize;

use crate::DaemonError;

static MAGNET_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^magnet:\?xt=urn:btih:(?:[a-fA-F0-9]{40}|[a-zA-Z2-7]{32})(?:&|$)")
        .expect("magnet link pattern is valid")
});

/// Options for [`create_torrent`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorrentOptions {
    /// Announce URL. DHT only when unset.
    pub tracker: Option<String>,
    /// Piece length in bytes. A size-balanced default is picked when unset.
    pub piece_length: Option<usize>,
    /// Free-form comment stored in the metainfo.
    pub comment: Option<String>,
    /// `host:port` peer hints added to the magnet link as `x.pe`.
    pub peers: Vec<String>,
}

/// A created torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentDescriptor {
    /// Name of the torrent's root file or directory.
    pub name: String,
    /// Hex-encoded SHA-1 info hash.
    pub info_hash: String,
    /// Payload size in bytes.
    pub total_size: u64,
    /// Piece length in bytes.
    pub piece_length: u64,
    /// Announce URL, if any.
    pub tracker: Option<String>,
    /// Magnet link for the torrent.
    pub magnet_link: String,
    /// Bencoded metainfo.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Create a torrent for a file or folder.
///
/// The info hash only depends on the payload and the options, so unchanged content yields the
/// same hash across calls.
pub fn create_torrent(
    path: &Path,
    options: &TorrentOptions,
) -> Result<TorrentDescriptor, DaemonError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            DaemonError::Generator(format!("{} has no usable file name", path.display()))
        })?
        .to_owned();
    let total_size = payload_size(path)?;

    let piece_length = options
        .piece_length
        .map_or(PieceLength::OptBalanced, PieceLength::Custom);
    let builder = MetainfoBuilder::new()
        .set_piece_length(piece_length)
        .set_main_tracker(options.tracker.as_deref())
        .set_comment(options.comment.as_deref());

    let bytes = builder
        .build(1, path, |_| {})
        .map_err(|e| DaemonError::Generator(e.to_string()))?;

    let metainfo =
        Metainfo::from_bytes(&bytes).map_err(|e| DaemonError::Generator(e.to_string()))?;
    let info_hash = hex::encode(metainfo.info().info_hash());
    let piece_length = metainfo.info().piece_length() as u64;

    let magnet_link = magnet_link(
        &info_hash,
        &name,
        total_size,
        options.tracker.as_deref(),
        &options.peers,
    );

    Ok(TorrentDescriptor {
        name,
        info_hash,
        total_size,
        piece_length,
        tracker: options.tracker.clone(),
        magnet_link,
        bytes,
    })
}

/// Create a torrent for a file or folder and write the `.torrent` to `output_file`.
pub fn create_torrent_file(
    path: &Path,
    output_file: &Path,
    options: &TorrentOptions,
) -> Result<TorrentDescriptor, DaemonError> {
    let descriptor = create_torrent(path, options)?;
    fs::write(output_file, &descriptor.bytes)
        .map_err(|e| DaemonError::FileSystem(format!("{}: {e}", output_file.display())))?;
    Ok(descriptor)
}

/// Build a magnet link from its parts.
pub fn magnet_link(
    info_hash: &str,
    name: &str,
    total_size: u64,
    tracker: Option<&str>,
    peers: &[String],
) -> String {
    let mut link = format!(
        "magnet:?xt=urn:btih:{info_hash}&dn={}&xl={total_size}",
        encode(name)
    );
    if let Some(tracker) = tracker {
        link.push_str("&tr=");
        link.push_str(&encode(tracker));
    }
    for peer in peers {
        link.push_str("&x.pe=");
        link.push_str(&encode(peer));
    }
    link
}

/// Whether `link` is a BitTorrent magnet link with a hex or base32 info hash.
pub fn validate_magnet_link(link: &str) -> bool {
    MAGNET_LINK.is_match(link)
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

fn payload_size(path: &Path) -> Result<u64, DaemonError> {
    let metadata = fs::metadata(path)
        .map_err(|e| DaemonError::FileSystem(format!("{}: {e}", path.display())))?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let entries = fs::read_dir(path)
        .map_err(|e| DaemonError::FileSystem(format!("{}: {e}", path.display())))?;
    let mut total = 0;
    for entry in entries {
        let entry = entry.map_err(|e| DaemonError::FileSystem(e.to_string()))?;
        total += payload_size(&entry.path())?;
    }
    Ok(total)
}
