//! JSON-RPC 2.0 transport for aria2.
//!
//! Every method here maps one-to-one onto an `aria2.*` RPC method. Values come back in aria2's
//! wire shape (numbers as decimal strings); [`crate::conversions`] turns them into
//! [`downpore_types`] values.

use std::{
    collections::BTreeMap,
    error::Error as StdError,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::trace;
use url::Url;

/// Keys requested from `aria2.tellStatus` and the `tell*` listing methods.
pub(crate) const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "uploadSpeed",
    "errorCode",
    "errorMessage",
    "infoHash",
    "dir",
    "connections",
    "followedBy",
    "files",
    "bittorrent",
];

/// Per-download options in aria2's `{"option-name": "value"}` form.
pub(crate) type RawOptions = BTreeMap<String, String>;

/// Transport-level failure, before mapping to [`downpore_types::DaemonError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RpcError {
    /// TCP connection could not be established.
    Connect(String),
    /// The request did not finish within the configured timeout.
    Timeout(String),
    /// Any other HTTP-level failure.
    Transport(String),
    /// The daemon answered with a JSON-RPC error object.
    Response { code: i64, message: String },
    /// The answer was not a JSON-RPC response of the expected shape.
    Decode(String),
}

impl RpcError {
    fn from_transport(err: reqwest::Error) -> Self {
        let detail = error_chain(&err);
        if err.is_connect() {
            Self::Connect(detail)
        } else if err.is_timeout() {
            Self::Timeout(detail)
        } else {
            Self::Transport(detail)
        }
    }
}

/// Joins an error and its sources, so "Connection refused" is not lost behind reqwest's
/// "error sending request".
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// `aria2.tellStatus` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawStatus {
    pub(crate) gid: String,
    pub(crate) status: String,
    pub(crate) total_length: String,
    pub(crate) completed_length: String,
    pub(crate) download_speed: String,
    pub(crate) upload_speed: String,
    pub(crate) error_code: Option<String>,
    pub(crate) error_message: Option<String>,
    pub(crate) info_hash: Option<String>,
    pub(crate) dir: Option<String>,
    pub(crate) connections: String,
    pub(crate) followed_by: Vec<String>,
    pub(crate) files: Vec<RawFile>,
    pub(crate) bittorrent: Option<RawBittorrent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawFile {
    pub(crate) path: String,
    pub(crate) length: String,
    pub(crate) completed_length: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct RawBittorrent {
    pub(crate) info: Option<RawBittorrentInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct RawBittorrentInfo {
    pub(crate) name: String,
}

/// `aria2.getGlobalStat` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawGlobalStat {
    pub(crate) download_speed: String,
    pub(crate) upload_speed: String,
    pub(crate) num_active: String,
    pub(crate) num_waiting: String,
    pub(crate) num_stopped: String,
}

/// `aria2.getVersion` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawVersion {
    pub(crate) version: String,
    pub(crate) enabled_features: Vec<String>,
}

/// HTTP transport speaking aria2's JSON-RPC dialect. This is the default transport of
/// [`Aria2Client`](crate::Aria2Client).
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub(crate) fn new(
        endpoint: Url,
        secret: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(RpcError::from_transport)?;

        Ok(Self {
            http,
            endpoint,
            token: secret.map(|s| format!("token:{s}")),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, RpcError> {
        let id = format!("downpore-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut all_params = Vec::with_capacity(params.len() + 1);
        if let Some(token) = &self.token {
            all_params.push(Value::String(token.clone()));
        }
        all_params.extend(params);

        trace!(%id, method, "sending request");
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params: all_params,
        };
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(RpcError::from_transport)?;

        // aria2 reports RPC errors with non-2xx codes, the body is decoded either way.
        let status = response.status();
        let bytes = response.bytes().await.map_err(RpcError::from_transport)?;
        let body: RpcResponse<R> = serde_json::from_slice(&bytes)
            .map_err(|e| RpcError::Decode(format!("{method} (HTTP {status}): {e}")))?;

        match body {
            RpcResponse {
                error: Some(error), ..
            } => Err(RpcError::Response {
                code: error.code,
                message: error.message,
            }),
            RpcResponse {
                result: Some(result),
                ..
            } => Ok(result),
            RpcResponse { .. } => Err(RpcError::Decode(format!(
                "{method}: response carries neither result nor error"
            ))),
        }
    }

    pub(crate) async fn get_version(&self) -> Result<RawVersion, RpcError> {
        self.call("aria2.getVersion", vec![]).await
    }

    pub(crate) async fn add_uri(
        &self,
        uris: Vec<String>,
        options: RawOptions,
    ) -> Result<String, RpcError> {
        self.call("aria2.addUri", vec![json!(uris), json!(options)])
            .await
    }

    pub(crate) async fn add_torrent(
        &self,
        torrent_base64: String,
        options: RawOptions,
    ) -> Result<String, RpcError> {
        self.call(
            "aria2.addTorrent",
            vec![json!(torrent_base64), json!([]), json!(options)],
        )
        .await
    }

    pub(crate) async fn tell_status(&self, gid: &str) -> Result<RawStatus, RpcError> {
        self.call("aria2.tellStatus", vec![json!(gid), json!(STATUS_KEYS)])
            .await
    }

    pub(crate) async fn pause(&self, gid: &str) -> Result<String, RpcError> {
        self.call("aria2.pause", vec![json!(gid)]).await
    }

    pub(crate) async fn unpause(&self, gid: &str) -> Result<String, RpcError> {
        self.call("aria2.unpause", vec![json!(gid)]).await
    }

    pub(crate) async fn remove(&self, gid: &str) -> Result<String, RpcError> {
        self.call("aria2.remove", vec![json!(gid)]).await
    }

    pub(crate) async fn force_remove(&self, gid: &str) -> Result<String, RpcError> {
        self.call("aria2.forceRemove", vec![json!(gid)]).await
    }

    pub(crate) async fn remove_download_result(&self, gid: &str) -> Result<String, RpcError> {
        self.call("aria2.removeDownloadResult", vec![json!(gid)])
            .await
    }

    pub(crate) async fn tell_active(&self) -> Result<Vec<RawStatus>, RpcError> {
        self.call("aria2.tellActive", vec![json!(STATUS_KEYS)])
            .await
    }

    pub(crate) async fn tell_waiting(
        &self,
        offset: i64,
        num: u32,
    ) -> Result<Vec<RawStatus>, RpcError> {
        self.call(
            "aria2.tellWaiting",
            vec![json!(offset), json!(num), json!(STATUS_KEYS)],
        )
        .await
    }

    pub(crate) async fn tell_stopped(
        &self,
        offset: i64,
        num: u32,
    ) -> Result<Vec<RawStatus>, RpcError> {
        self.call(
            "aria2.tellStopped",
            vec![json!(offset), json!(num), json!(STATUS_KEYS)],
        )
        .await
    }

    pub(crate) async fn get_global_stat(&self) -> Result<RawGlobalStat, RpcError> {
        self.call("aria2.getGlobalStat", vec![]).await
    }
}
