//! # Test fixtures for downpore
//!
//! Random payload files, their torrents and a [`Seeder`] that serves them through a download
//! daemon. Fixtures live in a [`FixtureDir`] that is removed on drop unless kept.
//!
//! usage:
//!
//! ```rust,ignore
//! use downpore_fixture::{FixtureDir, Seeder, create_fixture};
//! use downpore_types::TorrentOptions;
//!
//! let dir = FixtureDir::new()?;
//! let fixture = create_fixture(dir.path(), 40 * 1024 * 1024, &TorrentOptions::default())?;
//! let seeder = Seeder::start(&client, &fixture).await?;
//! println!("{}", fixture.magnet_link());
//! ```

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use rand::RngCore;
use serde::Serialize;
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use tracing::debug;

use downpore_types::{DaemonError, TorrentDescriptor, TorrentOptions, create_torrent_file};

#[cfg(test)]
use {
    downpore_aria2 as _, httpmock as _, libc as _, test_log as _, tracing_subscriber as _,
};

mod seeder;

pub use seeder::{DEFAULT_STATUS_INTERVAL, Seeder};

/// Prefix of every fixture directory.
pub const FIXTURE_DIR_PREFIX: &str = "downpore_test_";

/// Random data is produced and written in chunks of this size.
const CHUNK_SIZE: usize = 1024 * 1024;

/// A temporary directory holding fixtures. Removed with its contents on drop.
#[derive(Debug)]
pub struct FixtureDir {
    dir: TempDir,
}

impl FixtureDir {
    /// Create a fresh directory under the system temp dir.
    pub fn new() -> Result<Self, DaemonError> {
        let dir = tempfile::Builder::new()
            .prefix(FIXTURE_DIR_PREFIX)
            .tempdir()
            .map_err(|e| DaemonError::FileSystem(format!("creating fixture directory: {e}")))?;
        debug!("Created fixture directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Disable removal on drop and return the path.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}

/// A generated payload and its torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFixture {
    /// The payload file.
    pub file_path: PathBuf,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Hex SHA-1 of the payload, to verify downloaded copies against.
    pub content_hash: String,
    /// The `.torrent` written next to the payload.
    pub torrent_path: PathBuf,
    /// The torrent itself.
    pub torrent: TorrentDescriptor,
}

impl TestFixture {
    /// Magnet link for the payload.
    pub fn magnet_link(&self) -> &str {
        &self.torrent.magnet_link
    }
}

/// Write `size_bytes` pseudo-random bytes to a new, uniquely named file in `dir`.
pub fn generate_file(dir: &Path, size_bytes: u64) -> Result<PathBuf, DaemonError> {
    let (file, path) = tempfile::Builder::new()
        .prefix(&format!("test_file_{}_", size_label(size_bytes)))
        .suffix(".bin")
        .tempfile_in(dir)
        .and_then(|f| f.keep().map_err(|e| e.error))
        .map_err(|e| DaemonError::FileSystem(format!("{}: {e}", dir.display())))?;

    let fs_error = |e: std::io::Error| DaemonError::FileSystem(format!("{}: {e}", path.display()));
    let mut writer = BufWriter::new(file);
    let mut rng = rand::rng();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut remaining = size_bytes;
    while remaining > 0 {
        let len = remaining.min(CHUNK_SIZE as u64) as usize;
        rng.fill_bytes(&mut chunk[..len]);
        writer.write_all(&chunk[..len]).map_err(fs_error)?;
        remaining -= len as u64;
    }
    writer.flush().map_err(fs_error)?;

    debug!("Generated {size_bytes} bytes at {}", path.display());
    Ok(path)
}

/// Hex-encoded SHA-1 of the file at `path`.
pub fn content_hash(path: &Path) -> Result<String, DaemonError> {
    let fs_error = |e: std::io::Error| DaemonError::FileSystem(format!("{}: {e}", path.display()));
    let mut file = File::open(path).map_err(fs_error)?;

    let mut hasher = Sha1::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut chunk).map_err(fs_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Generate a payload of `size_bytes` in `dir` and wrap it into a torrent.
pub fn create_fixture(
    dir: &Path,
    size_bytes: u64,
    options: &TorrentOptions,
) -> Result<TestFixture, DaemonError> {
    let file_path = generate_file(dir, size_bytes)?;
    fixture_for_file(&file_path, options)
}

/// Wrap an existing payload into a torrent. The `.torrent` is written beside it.
pub fn fixture_for_file(
    file_path: &Path,
    options: &TorrentOptions,
) -> Result<TestFixture, DaemonError> {
    let size_bytes = std::fs::metadata(file_path)
        .map_err(|e| DaemonError::FileSystem(format!("{}: {e}", file_path.display())))?
        .len();
    let content_hash = content_hash(file_path)?;
    let torrent_path = file_path.with_extension("torrent");
    let torrent = create_torrent_file(file_path, &torrent_path, options)?;

    debug!(
        "Fixture {} ({size_bytes} bytes), info hash {}",
        file_path.display(),
        torrent.info_hash
    );
    Ok(TestFixture {
        file_path: file_path.to_path_buf(),
        size_bytes,
        content_hash,
        torrent_path,
        torrent,
    })
}

fn size_label(size_bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if size_bytes >= MIB && size_bytes % MIB == 0 {
        format!("{}mb", size_bytes / MIB)
    } else {
        format!("{size_bytes}b")
    }
}
