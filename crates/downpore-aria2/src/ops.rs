//! Internal trait abstracting aria2 RPC operations.
//!
//! This module provides the [`Aria2Ops`] trait which abstracts the JSON-RPC transport,
//! enabling mocking in tests.

use crate::rpc::{JsonRpcClient, RawGlobalStat, RawOptions, RawStatus, RawVersion, RpcError};

/// Internal trait that abstracts the aria2 transport operations.
/// This allows for mocking in tests.
#[cfg_attr(test, mockall::automock)]
#[allow(async_fn_in_trait)]
pub(crate) trait Aria2Ops {
    async fn get_version(&self) -> Result<RawVersion, RpcError>;
    async fn add_uri(&self, uris: Vec<String>, options: RawOptions) -> Result<String, RpcError>;
    async fn add_torrent(
        &self,
        torrent_base64: String,
        options: RawOptions,
    ) -> Result<String, RpcError>;
    async fn tell_status(&self, gid: &str) -> Result<RawStatus, RpcError>;
    async fn pause(&self, gid: &str) -> Result<String, RpcError>;
    async fn unpause(&self, gid: &str) -> Result<String, RpcError>;
    async fn remove(&self, gid: &str) -> Result<String, RpcError>;
    async fn force_remove(&self, gid: &str) -> Result<String, RpcError>;
    async fn remove_download_result(&self, gid: &str) -> Result<String, RpcError>;
    async fn tell_active(&self) -> Result<Vec<RawStatus>, RpcError>;
    async fn tell_waiting(&self, offset: i64, num: u32) -> Result<Vec<RawStatus>, RpcError>;
    async fn tell_stopped(&self, offset: i64, num: u32) -> Result<Vec<RawStatus>, RpcError>;
    async fn get_global_stat(&self) -> Result<RawGlobalStat, RpcError>;
}

impl Aria2Ops for JsonRpcClient {
    async fn get_version(&self) -> Result<RawVersion, RpcError> {
        JsonRpcClient::get_version(self).await
    }

    async fn add_uri(&self, uris: Vec<String>, options: RawOptions) -> Result<String, RpcError> {
        JsonRpcClient::add_uri(self, uris, options).await
    }

    async fn add_torrent(
        &self,
        torrent_base64: String,
        options: RawOptions,
    ) -> Result<String, RpcError> {
        JsonRpcClient::add_torrent(self, torrent_base64, options).await
    }

    async fn tell_status(&self, gid: &str) -> Result<RawStatus, RpcError> {
        JsonRpcClient::tell_status(self, gid).await
    }

    async fn pause(&self, gid: &str) -> Result<String, RpcError> {
        JsonRpcClient::pause(self, gid).await
    }

    async fn unpause(&self, gid: &str) -> Result<String, RpcError> {
        JsonRpcClient::unpause(self, gid).await
    }

    async fn remove(&self, gid: &str) -> Result<String, RpcError> {
        JsonRpcClient::remove(self, gid).await
    }

    async fn force_remove(&self, gid: &str) -> Result<String, RpcError> {
        JsonRpcClient::force_remove(self, gid).await
    }

    async fn remove_download_result(&self, gid: &str) -> Result<String, RpcError> {
        JsonRpcClient::remove_download_result(self, gid).await
    }

    async fn tell_active(&self) -> Result<Vec<RawStatus>, RpcError> {
        JsonRpcClient::tell_active(self).await
    }

    async fn tell_waiting(&self, offset: i64, num: u32) -> Result<Vec<RawStatus>, RpcError> {
        JsonRpcClient::tell_waiting(self, offset, num).await
    }

    async fn tell_stopped(&self, offset: i64, num: u32) -> Result<Vec<RawStatus>, RpcError> {
        JsonRpcClient::tell_stopped(self, offset, num).await
    }

    async fn get_global_stat(&self) -> Result<RawGlobalStat, RpcError> {
        JsonRpcClient::get_global_stat(self).await
    }
}
