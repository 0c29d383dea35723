//! Subcommand execution. Every command produces exactly one JSON object.

use std::{fs, future::Future, io::Write};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info};

use downpore_aria2::{WaitOutcome, download, wait};
use downpore_fixture::{FixtureDir, Seeder, TestFixture, create_fixture, fixture_for_file};
use downpore_types::{AddOptions, DownloadDaemon, Gid, TorrentOptions};

use crate::{
    CliError,
    cli::{Command, SeedArgs},
};

const MIB: u64 = 1024 * 1024;

/// Run `command` against `daemon` and write its JSON result to `out`.
///
/// Returns whether the command succeeded. `Err` means nothing was written yet.
pub(crate) async fn execute<D, W, S>(
    daemon: &D,
    command: Command,
    out: &mut W,
    shutdown: S,
) -> Result<bool, CliError>
where
    D: DownloadDaemon,
    W: Write,
    S: Future<Output = ()>,
{
    let (success, body) = match command {
        Command::Download {
            source,
            poll,
            download_dir,
            remove_on_failure,
        } => {
            let options = AddOptions {
                download_dir,
                ..Default::default()
            };
            let report = download(
                daemon,
                &source.source()?,
                &options,
                &poll.settings(remove_on_failure),
            )
            .await?;
            (report.success, serde_json::to_value(&report)?)
        }
        Command::Add {
            source,
            download_dir,
        } => {
            let options = AddOptions {
                download_dir,
                ..Default::default()
            };
            let gid = daemon.add(&source.source()?, &options).await?;
            let status = daemon.status(&gid).await?;
            (true, json!({"success": true, "gid": gid, "status": status}))
        }
        Command::Status { gid } => {
            let status = daemon.status(&Gid::new(gid.gid)).await?;
            (true, json!({"success": true, "status": status}))
        }
        Command::Wait { gid, poll } => {
            let WaitOutcome { status, failure } =
                wait(daemon, &Gid::new(gid.gid), &poll.settings(false)).await?;
            match failure {
                None => (
                    true,
                    json!({"success": true, "completed": true, "final_status": status}),
                ),
                Some(err) => (
                    false,
                    json!({
                        "success": false,
                        "completed": false,
                        "final_status": status,
                        "error": err.to_string(),
                    }),
                ),
            }
        }
        Command::Files { gid } => {
            let status = daemon.status(&Gid::new(gid.gid)).await?;
            (
                true,
                json!({"success": true, "gid": status.gid, "files": status.files}),
            )
        }
        Command::Pause { gid } => {
            let gid = Gid::new(gid.gid);
            daemon.pause(&gid).await?;
            (true, json!({"success": true, "gid": gid}))
        }
        Command::Resume { gid } => {
            let gid = Gid::new(gid.gid);
            daemon.resume(&gid).await?;
            (true, json!({"success": true, "gid": gid}))
        }
        Command::Remove { gid, force } => {
            let gid = Gid::new(gid.gid);
            daemon.remove(&gid, force).await?;
            (true, json!({"success": true, "removed": gid}))
        }
        Command::List => {
            let downloads = daemon.list().await?;
            (true, json!({"success": true, "downloads": downloads}))
        }
        Command::Stats => {
            let stats = daemon.stats().await?;
            (true, json!({"success": true, "stats": stats}))
        }
        Command::Seed(args) => return seed(daemon, &args, out, shutdown).await,
    };

    emit(out, &body)?;
    Ok(success)
}

#[derive(Debug, Serialize)]
struct SeedStarted<'a> {
    success: bool,
    gid: &'a Gid,
    magnet_link: &'a str,
    fixture: &'a TestFixture,
}

/// Prints the fixture once seeding has started. Failures after that point are logged only, so
/// stdout still carries a single object.
async fn seed<D, W, S>(
    daemon: &D,
    args: &SeedArgs,
    out: &mut W,
    shutdown: S,
) -> Result<bool, CliError>
where
    D: DownloadDaemon,
    W: Write,
    S: Future<Output = ()>,
{
    let options = torrent_options(args);
    let (fixture, dir) = match &args.existing_file {
        Some(path) => (fixture_for_file(path, &options)?, None),
        None => {
            let size_bytes = fixture_size(args.size_mb)?;
            info!("Creating {}MB test file", args.size_mb);
            let dir = FixtureDir::new()?;
            let fixture = create_fixture(dir.path(), size_bytes, &options)?;
            (fixture, Some(dir))
        }
    };

    if let Some(path) = &args.magnet_file {
        fs::write(path, fixture.magnet_link()).map_err(|e| {
            CliError::Output(format!("writing magnet link to {}: {e}", path.display()))
        })?;
        info!("Magnet link written to {}", path.display());
    }

    let seeder = Seeder::start(daemon, &fixture).await?;
    emit(
        out,
        &SeedStarted {
            success: true,
            gid: seeder.gid(),
            magnet_link: fixture.magnet_link(),
            fixture: &fixture,
        },
    )?;

    let seeded = seeder
        .run(args.duration, args.status_interval, shutdown)
        .await;
    let stopped = seeder.stop().await;

    match dir {
        Some(dir) if args.keep_files => {
            info!("Test files kept at {}", dir.keep().display());
        }
        Some(dir) => {
            info!("Cleaning up {}", dir.path().display());
        }
        None => {}
    }

    match seeded.and(stopped) {
        Ok(()) => Ok(true),
        Err(err) => {
            error!("Seeding failed: {err}");
            Ok(false)
        }
    }
}

/// Generated payloads carry their size in the torrent comment, existing files carry none.
fn torrent_options(args: &SeedArgs) -> TorrentOptions {
    TorrentOptions {
        tracker: args.tracker.clone(),
        piece_length: Some(args.piece_length),
        comment: args
            .existing_file
            .is_none()
            .then(|| format!("downpore test torrent - {}MB", args.size_mb)),
        peers: args.peers.clone(),
    }
}

fn fixture_size(size_mb: u64) -> Result<u64, CliError> {
    size_mb
        .checked_mul(MIB)
        .ok_or_else(|| CliError::Usage(format!("--size-mb {size_mb} is too large")))
}

/// The object printed for any failure that happens before a result was written.
pub(crate) fn failure_body(err: &CliError) -> Value {
    json!({
        "success": false,
        "state": null,
        "elapsed": null,
        "error": err.to_string(),
    })
}

/// Write `body` as a single line of JSON.
pub(crate) fn emit<W: Write, T: Serialize + ?Sized>(out: &mut W, body: &T) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, body)?;
    writeln!(out).map_err(|e| CliError::Output(e.to_string()))?;
    out.flush().map_err(|e| CliError::Output(e.to_string()))
}
