//! # downpore
//!
//! Drives an aria2 daemon over JSON-RPC for automation playbooks. Each invocation prints exactly
//! one JSON object on stdout and exits non-zero when the operation did not succeed. Logs go to
//! stderr, filtered by `RUST_LOG`.
//!
//! ## Usage
//!
//! ```sh,ignore
//! aria2c --enable-rpc --rpc-listen-port=6800 --rpc-secret=changeme123 &
//! downpore --secret changeme123 download --magnet-link 'magnet:?xt=urn:btih:...' --timeout 600
//! ```

use std::{
    ffi::OsString,
    future::Future,
    io::{self, Write},
    process::ExitCode,
};

use clap::{Parser, error::ErrorKind};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;

use downpore_aria2::{Aria2Client, Aria2Config};
use downpore_types::DaemonError;

mod cli;
mod commands;

use cli::Cli;

/// Every way a command can fail before printing its result.
#[derive(Error, Debug)]
pub(crate) enum CliError {
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error("{0}")]
    Usage(String),

    #[error("writing output: {0}")]
    Output(String),

    #[error("encoding output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("installing signal handlers: {0}")]
    Signal(#[from] io::Error),
}

/// Initializes the tracing subscriber. stdout is reserved for the JSON result.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>, CliError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {},
            _ = sigterm.recv() => {},
        }
    })
}

/// Resolves on the first Ctrl-C.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>, CliError> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

/// Parse the command line. Help and version requests are printed by clap and exit, any other
/// parse error becomes [`CliError::Usage`] so it is reported as JSON like every other failure.
fn parse_cli<I, T>(args: I) -> Result<Cli, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => CliError::Usage(err.to_string().trim_end().to_owned()),
    })
}

async fn run(cli: Cli, out: &mut impl Write) -> Result<bool, CliError> {
    let config = cli.connection.apply(Aria2Config::from_env());
    let shutdown = shutdown_signal()?;
    let client = Aria2Client::connect(&config).await?;
    commands::execute(&client, cli.command, out, shutdown).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut stdout = io::stdout().lock();
    let result = match parse_cli(std::env::args_os()) {
        Ok(cli) => run(cli, &mut stdout).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            if let Err(e) = commands::emit(&mut stdout, &commands::failure_body(&err)) {
                error!("{e}");
            }
            ExitCode::FAILURE
        }
    }
}
