//! JSON-RPC transport for EVM nodes
//!
//! One [`RpcClient`] per chain, created on first use and kept for the lifetime
//! of the process by [`RpcClientCache`].

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::chains::ChainConfig;
use crate::error::{Error, Result};
use crate::units;

/// Process-wide client cache
static RPC_CLIENTS: Lazy<Arc<RpcClientCache>> = Lazy::new(|| Arc::new(RpcClientCache::new()));

/// JSON-RPC client bound to one chain endpoint
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    chain_id: u64,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(chain: &ChainConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chain-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: chain.rpc_url.clone(),
            chain_id: chain.chain_id,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Issue one JSON-RPC call and return its `result` member.
    ///
    /// Transport failures, non-2xx statuses and JSON-RPC `error` objects all map
    /// to [`Error::Upstream`]. A `null` result is returned as `Value::Null`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(chain_id = self.chain_id, method, id, "rpc request");

        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::upstream(format!(
                "{} returned HTTP {}: {}",
                method,
                status.as_u16(),
                truncate(&text, 300)
            )));
        }

        let mut envelope: Value = serde_json::from_str(&text).map_err(|e| {
            Error::upstream(format!("{} returned a non-JSON body: {}", method, e))
        })?;

        if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::upstream(format!(
                "{} failed with code {}: {}",
                method, code, message
            )));
        }

        Ok(envelope
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> Result<u64> {
        let value = self.request("eth_blockNumber", json!([])).await?;
        units::parse_quantity_u64(expect_str(&value, "eth_blockNumber")?)
    }

    /// `eth_chainId`
    pub async fn remote_chain_id(&self) -> Result<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        units::parse_quantity_u64(expect_str(&value, "eth_chainId")?)
    }

    /// `eth_gasPrice`, in wei
    pub async fn gas_price(&self) -> Result<u128> {
        let value = self.request("eth_gasPrice", json!([])).await?;
        units::parse_quantity(expect_str(&value, "eth_gasPrice")?)
    }

    /// `eth_maxPriorityFeePerGas`, in wei
    pub async fn max_priority_fee(&self) -> Result<u128> {
        let value = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
        units::parse_quantity(expect_str(&value, "eth_maxPriorityFeePerGas")?)
    }

    /// `eth_getBalance`, in wei
    pub async fn balance(&self, address: &str, block: &str) -> Result<u128> {
        let value = self
            .request("eth_getBalance", json!([address, block]))
            .await?;
        units::parse_quantity(expect_str(&value, "eth_getBalance")?)
    }

    /// `eth_getCode`
    pub async fn code(&self, address: &str, block: &str) -> Result<String> {
        let value = self.request("eth_getCode", json!([address, block])).await?;
        expect_str(&value, "eth_getCode").map(str::to_string)
    }

    /// `eth_getStorageAt`, the raw 32-byte word
    pub async fn storage_at(&self, address: &str, slot: &str, block: &str) -> Result<String> {
        let value = self
            .request("eth_getStorageAt", json!([address, slot, block]))
            .await?;
        expect_str(&value, "eth_getStorageAt").map(str::to_string)
    }
}

fn expect_str<'a>(value: &'a Value, method: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::upstream(format!("{} returned an unexpected result: {}", method, value)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Keyed get-or-create cache of RPC clients (chain ID → client).
///
/// Entries are never evicted; the cache lives until the process exits.
#[derive(Debug, Default)]
pub struct RpcClientCache {
    clients: Mutex<HashMap<u64, Arc<RpcClient>>>,
}

impl RpcClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by the server.
    pub fn global() -> Arc<RpcClientCache> {
        RPC_CLIENTS.clone()
    }

    /// Return the cached client for `chain`, creating it on first use.
    pub fn get_or_create(&self, chain: &ChainConfig, timeout: Duration) -> Result<Arc<RpcClient>> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&chain.chain_id) {
            return Ok(client.clone());
        }

        tracing::info!(chain_id = chain.chain_id, url = %chain.rpc_url, "creating RPC client");
        let client = Arc::new(RpcClient::new(chain, timeout)?);
        clients.insert(chain.chain_id, client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(url: &str, chain_id: u64) -> ChainConfig {
        ChainConfig {
            chain_id,
            name: "Test".to_string(),
            short_name: "test".to_string(),
            native_symbol: "ETH".to_string(),
            rpc_url: url.to_string(),
            testnet: true,
        }
    }

    #[test]
    fn test_cache_get_or_create_reuses_client() {
        let cache = RpcClientCache::new();
        assert!(cache.is_empty());

        let a = cache
            .get_or_create(&chain("http://localhost:1", 1), Duration::from_secs(5))
            .unwrap();
        let b = cache
            .get_or_create(&chain("http://localhost:2", 1), Duration::from_secs(5))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // First URL wins; entries are never rebuilt
        assert_eq!(b.url(), "http://localhost:1");

        cache
            .get_or_create(&chain("http://localhost:3", 2), Duration::from_secs(5))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_request_returns_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .create_async()
            .await;

        let client = RpcClient::new(&chain(&server.url(), 1), Duration::from_secs(5)).unwrap();
        assert_eq!(client.block_number().await.unwrap(), 16);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_sends_method_and_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "eth_getBalance",
                "params": ["0x00000000000000000000000000000000000000aa", "latest"]
            })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0xde0b6b3a7640000"}"#)
            .create_async()
            .await;

        let client = RpcClient::new(&chain(&server.url(), 1), Duration::from_secs(5)).unwrap();
        let wei = client
            .balance("0x00000000000000000000000000000000000000aa", "latest")
            .await
            .unwrap();
        assert_eq!(wei, 1_000_000_000_000_000_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rpc_error_object_is_upstream_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#)
            .create_async()
            .await;

        let client = RpcClient::new(&chain(&server.url(), 1), Duration::from_secs(5)).unwrap();
        let err = client.request("eth_foo", json!([])).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_failure");
        assert!(err.to_string().contains("method not found"));
    }

    #[tokio::test]
    async fn test_http_error_is_upstream_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = RpcClient::new(&chain(&server.url(), 1), Duration::from_secs(5)).unwrap();
        let err = client.block_number().await.unwrap_err();
        assert_eq!(err.kind(), "upstream_failure");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_null_result_passes_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = RpcClient::new(&chain(&server.url(), 1), Duration::from_secs(5)).unwrap();
        let value = client
            .request("eth_getTransactionByHash", json!(["0x00"]))
            .await
            .unwrap();
        assert!(value.is_null());
    }
}
