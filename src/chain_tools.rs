//! MCP tools backed by the chain JSON-RPC node

use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::chains::{ChainConfig, ChainRegistry};
use crate::error::{Error, Result};
use crate::response;
use crate::rpc::{RpcClient, RpcClientCache};
use crate::schema::{self, invalid_params, parse_params, JsonObject};
use crate::units;

type ToolResult = std::result::Result<CallToolResult, rmcp::ErrorData>;

/// EIP-1967 implementation slot: `keccak256("eip1967.proxy.implementation") - 1`
pub const EIP1967_IMPLEMENTATION_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";
/// EIP-1967 admin slot: `keccak256("eip1967.proxy.admin") - 1`
pub const EIP1967_ADMIN_SLOT: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";
/// EIP-1967 beacon slot: `keccak256("eip1967.proxy.beacon") - 1`
pub const EIP1967_BEACON_SLOT: &str =
    "0xa3f0ad74e5423aebfd80d3ef4346578335a9a72aeaee59ff6cb3582b35133d50";

/// Shared state for chain tools: chain lookup plus the client cache
#[derive(Clone)]
pub struct ChainContext {
    pub registry: Arc<ChainRegistry>,
    pub clients: Arc<RpcClientCache>,
    pub timeout: Duration,
}

impl ChainContext {
    pub fn new(registry: ChainRegistry, clients: Arc<RpcClientCache>, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            clients,
            timeout,
        }
    }

    /// Resolve the chain selector and fetch its client.
    pub fn client(&self, chain: Option<&str>) -> Result<(ChainConfig, Arc<RpcClient>)> {
        let config = self.registry.resolve(chain)?.clone();
        let client = self.clients.get_or_create(&config, self.timeout)?;
        Ok((config, client))
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ChainParams {
    /// Chain ID or name (e.g. '1', 'ethereum', 'base'); defaults to the configured chain
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BalanceParams {
    /// Account address (0x-prefixed, 20 bytes)
    pub address: String,
    /// Block number, 0x quantity or tag (latest, safe, finalized, ...); default latest
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BlockParams {
    /// Block number, tag or 32-byte block hash; default latest
    #[serde(default)]
    pub block: Option<String>,
    /// Return full transaction objects instead of hashes
    #[serde(default)]
    pub full_transactions: bool,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TxHashParams {
    /// Transaction hash (0x-prefixed, 32 bytes)
    pub hash: String,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StorageParams {
    /// Contract address
    pub address: String,
    /// Storage slot as a decimal index or 0x word
    pub slot: String,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CallParams {
    /// Contract address to call
    pub to: String,
    /// ABI-encoded calldata (0x-prefixed)
    pub data: String,
    /// Optional sender address
    #[serde(default)]
    pub from: Option<String>,
    /// Optional value in wei (decimal)
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EstimateGasParams {
    /// Destination address
    pub to: String,
    /// Optional calldata (0x-prefixed)
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    /// Optional value in wei (decimal)
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogsParams {
    /// Emitting contract address
    #[serde(default)]
    pub address: Option<String>,
    /// Topic filters; null entries match anything
    #[serde(default)]
    pub topics: Vec<Option<String>>,
    /// Start block (number or tag); default latest
    #[serde(default)]
    pub from_block: Option<String>,
    /// End block (number or tag); default latest
    #[serde(default)]
    pub to_block: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddressParams {
    /// Contract or account address
    pub address: String,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RawTxParams {
    /// Signed, RLP-encoded transaction (0x-prefixed)
    pub signed_transaction: String,
    #[serde(default)]
    pub chain: Option<String>,
}

/// Get all JSON-RPC backed tools
pub fn get_chain_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "get_chain_overview".to_string(),
            "Summarize a chain: the node's reported chain ID, latest block number and current gas price, fetched concurrently. Each field reports its own error if that call fails.".to_string(),
            schema::input_schema::<ChainParams>(),
        ),
        Tool::new(
            "get_block_number".to_string(),
            "Get the latest block number of a chain.".to_string(),
            schema::input_schema::<ChainParams>(),
        ),
        Tool::new(
            "get_balance".to_string(),
            "Get the native currency balance of an address, in wei and in whole units.".to_string(),
            schema::input_schema::<BalanceParams>(),
        ),
        Tool::new(
            "get_block".to_string(),
            "Get a block by number, tag or hash. Set full_transactions to include transaction bodies.".to_string(),
            schema::input_schema::<BlockParams>(),
        ),
        Tool::new(
            "get_transaction".to_string(),
            "Get a transaction by hash.".to_string(),
            schema::input_schema::<TxHashParams>(),
        ),
        Tool::new(
            "get_transaction_receipt".to_string(),
            "Get the receipt of a mined transaction: status, gas used, logs and created contract address.".to_string(),
            schema::input_schema::<TxHashParams>(),
        ),
        Tool::new(
            "get_code".to_string(),
            "Get the deployed bytecode at an address and whether the address is a contract.".to_string(),
            schema::input_schema::<AddressParams>(),
        ),
        Tool::new(
            "get_storage_at".to_string(),
            "Read one 32-byte storage slot of a contract.".to_string(),
            schema::input_schema::<StorageParams>(),
        ),
        Tool::new(
            "call_contract".to_string(),
            "Execute a read-only eth_call against a contract with ABI-encoded calldata and return the raw result.".to_string(),
            schema::input_schema::<CallParams>(),
        ),
        Tool::new(
            "estimate_gas".to_string(),
            "Estimate the gas a transaction would consume.".to_string(),
            schema::input_schema::<EstimateGasParams>(),
        ),
        Tool::new(
            "get_logs".to_string(),
            "Query event logs by contract address, topics and block range.".to_string(),
            schema::input_schema::<LogsParams>(),
        ),
        Tool::new(
            "get_gas_price".to_string(),
            "Get the current gas price and suggested priority fee, in wei and gwei.".to_string(),
            schema::input_schema::<ChainParams>(),
        ),
        Tool::new(
            "detect_proxy".to_string(),
            "Detect an EIP-1967 proxy by reading its implementation, admin and beacon storage slots concurrently.".to_string(),
            schema::input_schema::<AddressParams>(),
        ),
        Tool::new(
            "send_raw_transaction".to_string(),
            "Broadcast a signed raw transaction. Only available when writes are enabled in the server configuration.".to_string(),
            schema::input_schema::<RawTxParams>(),
        ),
    ]
}

/// Dispatch a chain tool call. Returns `None` for names this module does not own.
pub async fn dispatch(ctx: &ChainContext, name: &str, args: &Option<JsonObject>) -> Option<ToolResult> {
    let result = match name {
        "get_chain_overview" => handle_chain_overview(ctx, args).await,
        "get_block_number" => handle_block_number(ctx, args).await,
        "get_balance" => handle_get_balance(ctx, args).await,
        "get_block" => handle_get_block(ctx, args).await,
        "get_transaction" => handle_tx_lookup(ctx, args, "eth_getTransactionByHash").await,
        "get_transaction_receipt" => handle_tx_lookup(ctx, args, "eth_getTransactionReceipt").await,
        "get_code" => handle_get_code(ctx, args).await,
        "get_storage_at" => handle_get_storage_at(ctx, args).await,
        "call_contract" => handle_call_contract(ctx, args).await,
        "estimate_gas" => handle_estimate_gas(ctx, args).await,
        "get_logs" => handle_get_logs(ctx, args).await,
        "get_gas_price" => handle_gas_price(ctx, args).await,
        "detect_proxy" => handle_detect_proxy(ctx, args).await,
        "send_raw_transaction" => handle_send_raw_transaction(ctx, args).await,
        _ => return None,
    };
    Some(result)
}

fn chain_header(chain: &ChainConfig) -> Value {
    json!({ "chain_id": chain.chain_id, "name": chain.name })
}

fn parse_wei(field: &str, value: Option<&str>) -> Result<Option<String>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u128>()
                .map(|wei| format!("0x{:x}", wei))
                .map_err(|_| Error::invalid(format!("'{}' must be a decimal wei amount", field)))
        })
        .transpose()
}

/// Handle get_chain_overview tool call
pub async fn handle_chain_overview(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: ChainParams = parse_params(args)?;
    let (chain, client) = match ctx.client(params.chain.as_deref()) {
        Ok(pair) => pair,
        Err(e) => return Ok(response::error_result(&e)),
    };

    let (remote_id, block, gas) = futures::join!(
        client.remote_chain_id(),
        client.block_number(),
        client.gas_price()
    );

    let gas = gas.map(|wei| json!({ "wei": wei.to_string(), "gwei": units::format_gwei(wei) }));
    Ok(response::json_result(&json!({
        "chain": chain_header(&chain),
        "rpc_url": client.url(),
        "remote_chain_id": response::inline(remote_id),
        "block_number": response::inline(block),
        "gas_price": response::inline(gas),
    })))
}

/// Handle get_block_number tool call
pub async fn handle_block_number(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: ChainParams = parse_params(args)?;
    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let block = client.block_number().await?;
        Ok(json!({ "chain": chain_header(&chain), "block_number": block }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle get_balance tool call
pub async fn handle_get_balance(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: BalanceParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let block = schema::parse_block_tag(params.block.as_deref()).map_err(invalid_params)?;

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let wei = client.balance(&address, &block).await?;
        Ok(json!({
            "chain": chain_header(&chain),
            "address": address,
            "block": block,
            "balance_wei": wei.to_string(),
            "balance": units::format_ether(wei),
            "symbol": chain.native_symbol,
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle get_block tool call
pub async fn handle_get_block(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: BlockParams = parse_params(args)?;
    let by_hash = params
        .block
        .as_deref()
        .map(|b| b.trim().len() == 66 && b.trim().starts_with("0x"))
        .unwrap_or(false);

    let (method, selector) = if by_hash {
        let hash = schema::validate_hash("block", params.block.as_deref().unwrap_or_default())
            .map_err(invalid_params)?;
        ("eth_getBlockByHash", hash)
    } else {
        let tag = schema::parse_block_tag(params.block.as_deref()).map_err(invalid_params)?;
        ("eth_getBlockByNumber", tag)
    };

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let block = client
            .request(method, json!([selector, params.full_transactions]))
            .await?;
        if block.is_null() {
            return Err(Error::not_found(format!("block {}", selector)));
        }
        Ok(json!({ "chain": chain_header(&chain), "block": shape_block(block) }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Add decoded numeric fields next to the raw hex ones
fn shape_block(mut block: Value) -> Value {
    if let Some(obj) = block.as_object_mut() {
        for field in ["number", "timestamp", "gasUsed", "gasLimit", "baseFeePerGas"] {
            let decoded = obj
                .get(field)
                .and_then(Value::as_str)
                .and_then(|v| units::parse_quantity(v).ok());
            if let Some(n) = decoded {
                obj.insert(format!("{}_decoded", field), Value::String(n.to_string()));
            }
        }
        if let Some(txs) = obj.get("transactions").and_then(Value::as_array) {
            let count = txs.len();
            obj.insert("transaction_count".to_string(), json!(count));
        }
    }
    block
}

/// Handle get_transaction / get_transaction_receipt tool calls
pub async fn handle_tx_lookup(
    ctx: &ChainContext,
    args: &Option<JsonObject>,
    method: &'static str,
) -> ToolResult {
    let params: TxHashParams = parse_params(args)?;
    let hash = schema::validate_hash("hash", &params.hash).map_err(invalid_params)?;

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let value = client.request(method, json!([hash])).await?;
        if value.is_null() {
            return Err(Error::not_found(format!("transaction {}", hash)));
        }
        let key = if method == "eth_getTransactionReceipt" {
            "receipt"
        } else {
            "transaction"
        };
        let mut body = json!({ "chain": chain_header(&chain) });
        body[key] = shape_transaction(value);
        Ok(body)
    }
    .await;
    Ok(response::from_result(outcome))
}

fn shape_transaction(mut tx: Value) -> Value {
    if let Some(obj) = tx.as_object_mut() {
        if let Some(wei) = obj
            .get("value")
            .and_then(Value::as_str)
            .and_then(|v| units::parse_quantity(v).ok())
        {
            obj.insert("value_decoded".to_string(), json!(units::format_ether(wei)));
        }
        if let Some(status) = obj.get("status").and_then(Value::as_str) {
            let succeeded = status == "0x1";
            obj.insert("succeeded".to_string(), json!(succeeded));
        }
        for field in ["blockNumber", "gasUsed", "gas", "nonce"] {
            let decoded = obj
                .get(field)
                .and_then(Value::as_str)
                .and_then(|v| units::parse_quantity(v).ok());
            if let Some(n) = decoded {
                obj.insert(format!("{}_decoded", field), Value::String(n.to_string()));
            }
        }
    }
    tx
}

/// Handle get_code tool call
pub async fn handle_get_code(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: AddressParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let block = schema::parse_block_tag(params.block.as_deref()).map_err(invalid_params)?;

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let code = client.code(&address, &block).await?;
        let size = code.trim_start_matches("0x").len() / 2;
        Ok(json!({
            "chain": chain_header(&chain),
            "address": address,
            "is_contract": size > 0,
            "size_bytes": size,
            "code": code,
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle get_storage_at tool call
pub async fn handle_get_storage_at(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: StorageParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let slot = schema::parse_storage_slot(&params.slot).map_err(invalid_params)?;
    let block = schema::parse_block_tag(params.block.as_deref()).map_err(invalid_params)?;

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let word = client.storage_at(&address, &slot, &block).await?;
        Ok(json!({
            "chain": chain_header(&chain),
            "address": address,
            "slot": slot,
            "value": word,
            "as_address": word_to_address(&word),
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Interpret the low 20 bytes of a storage word as an address; `None` for zero.
pub fn word_to_address(word: &str) -> Option<String> {
    let body = word.trim_start_matches("0x");
    if body.is_empty() || body.chars().all(|c| c == '0') {
        return None;
    }
    let padded = format!("{:0>64}", body);
    Some(format!("0x{}", &padded[padded.len() - 40..]))
}

/// Handle call_contract tool call
pub async fn handle_call_contract(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: CallParams = parse_params(args)?;
    let to = schema::validate_address("to", &params.to).map_err(invalid_params)?;
    let data = schema::validate_hex_data("data", &params.data).map_err(invalid_params)?;
    let from = params
        .from
        .as_deref()
        .map(|f| schema::validate_address("from", f))
        .transpose()
        .map_err(invalid_params)?;
    let value = parse_wei("value", params.value.as_deref()).map_err(invalid_params)?;
    let block = schema::parse_block_tag(params.block.as_deref()).map_err(invalid_params)?;

    let mut call = json!({ "to": to, "data": data });
    if let Some(from) = from {
        call["from"] = json!(from);
    }
    if let Some(value) = value {
        call["value"] = json!(value);
    }

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let result = client.request("eth_call", json!([call, block])).await?;
        Ok(json!({ "chain": chain_header(&chain), "to": to, "block": block, "result": result }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle estimate_gas tool call
pub async fn handle_estimate_gas(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: EstimateGasParams = parse_params(args)?;
    let to = schema::validate_address("to", &params.to).map_err(invalid_params)?;
    let data = params
        .data
        .as_deref()
        .map(|d| schema::validate_hex_data("data", d))
        .transpose()
        .map_err(invalid_params)?;
    let from = params
        .from
        .as_deref()
        .map(|f| schema::validate_address("from", f))
        .transpose()
        .map_err(invalid_params)?;
    let value = parse_wei("value", params.value.as_deref()).map_err(invalid_params)?;

    let mut tx = json!({ "to": to });
    if let Some(data) = data {
        tx["data"] = json!(data);
    }
    if let Some(from) = from {
        tx["from"] = json!(from);
    }
    if let Some(value) = value {
        tx["value"] = json!(value);
    }

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let raw = client.request("eth_estimateGas", json!([tx])).await?;
        let gas = raw
            .as_str()
            .map(units::parse_quantity_u64)
            .transpose()?
            .ok_or_else(|| Error::upstream(format!("eth_estimateGas returned {}", raw)))?;
        Ok(json!({ "chain": chain_header(&chain), "gas": gas }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle get_logs tool call
pub async fn handle_get_logs(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: LogsParams = parse_params(args)?;
    let address = params
        .address
        .as_deref()
        .map(|a| schema::validate_address("address", a))
        .transpose()
        .map_err(invalid_params)?;
    let topics = params
        .topics
        .iter()
        .map(|t| {
            t.as_deref()
                .map(|topic| schema::validate_hash("topics", topic))
                .transpose()
        })
        .collect::<Result<Vec<Option<String>>>>()
        .map_err(invalid_params)?;
    let from_block = schema::parse_block_tag(params.from_block.as_deref()).map_err(invalid_params)?;
    let to_block = schema::parse_block_tag(params.to_block.as_deref()).map_err(invalid_params)?;

    let mut filter = json!({ "fromBlock": from_block, "toBlock": to_block });
    if let Some(address) = &address {
        filter["address"] = json!(address);
    }
    if !topics.is_empty() {
        filter["topics"] = json!(topics);
    }

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        let logs = client.request("eth_getLogs", json!([filter])).await?;
        let count = logs.as_array().map(Vec::len).unwrap_or(0);
        Ok(json!({ "chain": chain_header(&chain), "count": count, "logs": logs }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle get_gas_price tool call
pub async fn handle_gas_price(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: ChainParams = parse_params(args)?;
    let (chain, client) = match ctx.client(params.chain.as_deref()) {
        Ok(pair) => pair,
        Err(e) => return Ok(response::error_result(&e)),
    };

    let (gas_price, priority_fee) = futures::join!(client.gas_price(), client.max_priority_fee());
    let as_units = |wei: u128| json!({ "wei": wei.to_string(), "gwei": units::format_gwei(wei) });

    Ok(response::json_result(&json!({
        "chain": chain_header(&chain),
        "gas_price": response::inline(gas_price.map(as_units)),
        "max_priority_fee": response::inline(priority_fee.map(as_units)),
    })))
}

/// Handle detect_proxy tool call
pub async fn handle_detect_proxy(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: AddressParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let block = schema::parse_block_tag(params.block.as_deref()).map_err(invalid_params)?;
    let (chain, client) = match ctx.client(params.chain.as_deref()) {
        Ok(pair) => pair,
        Err(e) => return Ok(response::error_result(&e)),
    };

    let (implementation, admin, beacon) = futures::join!(
        client.storage_at(&address, EIP1967_IMPLEMENTATION_SLOT, &block),
        client.storage_at(&address, EIP1967_ADMIN_SLOT, &block),
        client.storage_at(&address, EIP1967_BEACON_SLOT, &block)
    );

    let slot = |read: Result<String>| -> Value {
        response::inline(read.map(|word| {
            json!({ "raw": word, "address": word_to_address(&word) })
        }))
    };
    let resolved = |read: &Result<String>| -> bool {
        read.as_ref()
            .map(|word| word_to_address(word).is_some())
            .unwrap_or(false)
    };
    let is_proxy = resolved(&implementation) || resolved(&beacon);
    let proxy_kind = if resolved(&implementation) {
        Some("eip1967")
    } else if resolved(&beacon) {
        Some("eip1967-beacon")
    } else {
        None
    };

    Ok(response::json_result(&json!({
        "chain": chain_header(&chain),
        "address": address,
        "is_proxy": is_proxy,
        "proxy_kind": proxy_kind,
        "implementation": slot(implementation),
        "admin": slot(admin),
        "beacon": slot(beacon),
    })))
}

/// Handle send_raw_transaction tool call
pub async fn handle_send_raw_transaction(ctx: &ChainContext, args: &Option<JsonObject>) -> ToolResult {
    let params: RawTxParams = parse_params(args)?;
    let raw = schema::validate_hex_data("signed_transaction", &params.signed_transaction)
        .map_err(invalid_params)?;
    if raw.len() <= 2 {
        return Err(rmcp::ErrorData::invalid_params(
            "'signed_transaction' must not be empty",
            None,
        ));
    }

    let outcome: Result<Value> = async {
        let (chain, client) = ctx.client(params.chain.as_deref())?;
        tracing::info!(chain_id = chain.chain_id, "broadcasting raw transaction");
        let hash = client.request("eth_sendRawTransaction", json!([raw])).await?;
        Ok(json!({ "chain": chain_header(&chain), "transaction_hash": hash }))
    }
    .await;
    Ok(response::from_result(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::result_text;
    use std::collections::HashMap;

    const ADDR: &str = "0x00000000000000000000000000000000000000aa";

    fn context_for(url: &str) -> ChainContext {
        let mut overrides = HashMap::new();
        overrides.insert("31337".to_string(), url.to_string());
        let registry = ChainRegistry::new(&overrides, "31337");
        ChainContext::new(
            registry,
            Arc::new(RpcClientCache::new()),
            Duration::from_secs(5),
        )
    }

    fn args(value: Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    fn body(result: &CallToolResult) -> Value {
        serde_json::from_str(&result_text(result)).unwrap()
    }

    #[test]
    fn test_get_chain_tools_names() {
        let tools = get_chain_tools();
        let names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
        for expected in [
            "get_chain_overview",
            "get_balance",
            "get_block",
            "detect_proxy",
            "send_raw_transaction",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(tools.len(), 14);
    }

    #[test]
    fn test_word_to_address() {
        let word = format!("0x{}{}", "0".repeat(24), "ab".repeat(20));
        assert_eq!(word_to_address(&word).unwrap(), format!("0x{}", "ab".repeat(20)));
        assert_eq!(word_to_address(&format!("0x{}", "0".repeat(64))), None);
        assert_eq!(word_to_address("0x"), None);
    }

    #[tokio::test]
    async fn test_get_balance_shapes_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1bc16d674ec80000"}"#)
            .create_async()
            .await;

        let ctx = context_for(&server.url());
        let result = handle_get_balance(&ctx, &args(json!({ "address": ADDR })))
            .await
            .unwrap();
        let value = body(&result);
        assert_eq!(value["balance_wei"], "2000000000000000000");
        assert_eq!(value["balance"], "2");
        assert_eq!(value["chain"]["chain_id"], 31337);
    }

    #[tokio::test]
    async fn test_get_balance_rejects_bad_address() {
        let ctx = context_for("http://127.0.0.1:9");
        let err = handle_get_balance(&ctx, &args(json!({ "address": "0x12" })))
            .await
            .unwrap_err();
        assert!(err.message.contains("address"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported_as_data() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let ctx = context_for(&server.url());
        let result = handle_block_number(&ctx, &None).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["error"]["kind"], "upstream_failure");
    }

    #[tokio::test]
    async fn test_unknown_chain_is_reported_as_data() {
        let ctx = context_for("http://127.0.0.1:9");
        let result = handle_block_number(&ctx, &args(json!({ "chain": "nowhere" })))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_detect_proxy_reads_three_slots() {
        let mut server = mockito::Server::new_async().await;
        let implementation = format!("0x{}{}", "0".repeat(24), "11".repeat(20));
        let zero = format!("0x{}", "0".repeat(64));

        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "params": [ADDR, EIP1967_IMPLEMENTATION_SLOT, "latest"]
            })))
            .with_body(json!({"jsonrpc":"2.0","id":1,"result": implementation}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "params": [ADDR, EIP1967_ADMIN_SLOT, "latest"]
            })))
            .with_body(json!({"jsonrpc":"2.0","id":2,"result": zero}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "params": [ADDR, EIP1967_BEACON_SLOT, "latest"]
            })))
            .with_status(500)
            .create_async()
            .await;

        let ctx = context_for(&server.url());
        let result = handle_detect_proxy(&ctx, &args(json!({ "address": ADDR })))
            .await
            .unwrap();
        let value = body(&result);

        assert_eq!(value["is_proxy"], true);
        assert_eq!(value["proxy_kind"], "eip1967");
        assert_eq!(
            value["implementation"]["address"],
            format!("0x{}", "11".repeat(20))
        );
        assert!(value["admin"]["address"].is_null());
        // The failed beacon read is isolated to its own field
        assert_eq!(value["beacon"]["error"]["kind"], "upstream_failure");
    }

    #[tokio::test]
    async fn test_get_transaction_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let ctx = context_for(&server.url());
        let hash = format!("0x{}", "cd".repeat(32));
        let result = handle_tx_lookup(&ctx, &args(json!({ "hash": hash })), "eth_getTransactionByHash")
            .await
            .unwrap();
        assert_eq!(body(&result)["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_get_code_reports_contract() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x6080604052"}"#)
            .create_async()
            .await;

        let ctx = context_for(&server.url());
        let result = handle_get_code(&ctx, &args(json!({ "address": ADDR })))
            .await
            .unwrap();
        let value = body(&result);
        assert_eq!(value["is_contract"], true);
        assert_eq!(value["size_bytes"], 5);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_foreign_tools() {
        let ctx = context_for("http://127.0.0.1:9");
        assert!(dispatch(&ctx, "kb_search", &None).await.is_none());
    }
}
