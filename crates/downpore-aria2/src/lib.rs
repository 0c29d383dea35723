//! # Download client and orchestration using aria2 JSON-RPC.
//!
//! usage:
//!
//! ```rust,ignore
//! use downpore_aria2::{Aria2Client, Aria2Config, PollSettings, download};
//! use downpore_types::{AddOptions, DownloadSource};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Aria2Config::from_env().with_secret("changeme123");
//!     let client = Aria2Client::connect(&config).await?;
//!     let source = DownloadSource::Magnet("magnet:?xt=urn:btih:...".into());
//!     let report = download(&client, &source, &AddOptions::default(), &PollSettings::default()).await?;
//!     println!("{}", serde_json::to_string(&report)?);
//!     Ok(())
//! }
//! ```
//!

#[cfg(test)]
use {test_log as _, tracing_subscriber as _};

mod client;
pub mod config;
mod conversions;
mod ops;
pub mod orchestrate;
mod rpc;

#[cfg(test)]
mod testutil;

pub use client::Aria2Client;
pub use config::Aria2Config;
pub use conversions::Aria2Version;
pub use orchestrate::{PollSettings, WaitOutcome, download, wait, wait_for_completion};
pub use rpc::JsonRpcClient;
