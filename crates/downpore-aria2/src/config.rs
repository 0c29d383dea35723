//! Connection parameters for the aria2 RPC endpoint.

use std::{env, fmt, time::Duration};

use url::Url;

use downpore_types::DaemonError;

/// Host used when none is configured. Tunnels to remote daemons end here.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// aria2's default `--rpc-listen-port`.
pub const DEFAULT_PORT: u16 = 6800;
/// Upper bound for a single RPC round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable connection configuration for an aria2 daemon.
///
/// Values are set with the `with_*` builders before the configuration is handed to
/// [`Aria2Client::connect`](crate::Aria2Client::connect), and only read afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Aria2Config {
    host: String,
    port: u16,
    secret: Option<String>,
    request_timeout: Duration,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            secret: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Aria2Config {
    /// Configuration for `host:port` with no secret.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Reads the configuration from `DOWNPORE_RPC_HOST`, `DOWNPORE_RPC_PORT`,
    /// `DOWNPORE_RPC_SECRET` and `DOWNPORE_RPC_TIMEOUT_SECS`. Unset or unparsable values fall
    /// back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("DOWNPORE_RPC_HOST")
                .filter(|h| !h.is_empty())
                .unwrap_or(defaults.host),
            port: lookup("DOWNPORE_RPC_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            secret: lookup("DOWNPORE_RPC_SECRET").filter(|s| !s.is_empty()),
            request_timeout: lookup("DOWNPORE_RPC_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Replaces the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Replaces the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the `--rpc-secret` the daemon was started with.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Replaces the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The daemon host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The daemon RPC port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The RPC secret, if any.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// The per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// `http://{host}:{port}/jsonrpc`.
    pub fn rpc_url(&self) -> Result<Url, DaemonError> {
        Url::parse(&format!("http://{}:{}/jsonrpc", self.host, self.port))
            .map_err(|e| DaemonError::Config(format!("Invalid RPC URL: {e}")))
    }
}

impl fmt::Debug for Aria2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret.
        f.debug_struct("Aria2Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
