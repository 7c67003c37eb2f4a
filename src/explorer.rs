//! Block explorer integration (Etherscan-compatible v2 API)
//!
//! One endpoint serves every chain; the target network is selected with the
//! `chainid` query parameter.

use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::chain_tools::ChainContext;
use crate::config::ExplorerConfig;
use crate::error::{Error, Result};
use crate::response;
use crate::schema::{self, invalid_params, parse_params, JsonObject};
use crate::units;

type ToolResult = std::result::Result<CallToolResult, rmcp::ErrorData>;

const MAX_PAGE_SIZE: u32 = 1000;
const DEFAULT_PAGE_SIZE: u32 = 25;

/// HTTP client for the explorer REST API
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chain-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn base_query(&self, chain_id: u64, module: &str, action: &str) -> Vec<(String, String)> {
        let mut query = vec![
            ("chainid".to_string(), chain_id.to_string()),
            ("module".to_string(), module.to_string()),
            ("action".to_string(), action.to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey".to_string(), key.clone()));
        }
        query
    }

    /// GET one API action and return the raw `{status, message, result}` envelope.
    pub async fn get_raw(
        &self,
        chain_id: u64,
        module: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        let mut query = self.base_query(chain_id, module, action);
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));

        tracing::debug!(chain_id, module, action, "explorer request");
        let response = self.http.get(&self.api_url).query(&query).send().await?;
        read_envelope(response, module, action).await
    }

    /// GET one API action and return its `result`, mapping API-level errors to
    /// [`Error::Upstream`].
    pub async fn get(
        &self,
        chain_id: u64,
        module: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        let envelope = self.get_raw(chain_id, module, action, params).await?;
        unwrap_result(envelope, module, action)
    }

    /// POST a form-encoded action; `chainid`, `module` and `action` travel in the query string.
    pub async fn post(
        &self,
        chain_id: u64,
        module: &str,
        action: &str,
        form: &[(&str, String)],
    ) -> Result<Value> {
        let query = self.base_query(chain_id, module, action);

        tracing::debug!(chain_id, module, action, "explorer submission");
        let response = self
            .http
            .post(&self.api_url)
            .query(&query)
            .form(form)
            .send()
            .await?;
        let envelope = read_envelope(response, module, action).await?;
        unwrap_result(envelope, module, action)
    }
}

async fn read_envelope(response: reqwest::Response, module: &str, action: &str) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(Error::upstream(format!(
            "explorer {}/{} returned HTTP {}: {}",
            module,
            action,
            status.as_u16(),
            text.chars().take(300).collect::<String>()
        )));
    }
    serde_json::from_str(&text).map_err(|e| {
        Error::upstream(format!(
            "explorer {}/{} returned a non-JSON body: {}",
            module, action, e
        ))
    })
}

/// Interpret the explorer envelope. `status == "1"` is success; an empty
/// listing ("No transactions found") is reported as an empty array.
fn unwrap_result(mut envelope: Value, module: &str, action: &str) -> Result<Value> {
    let status = envelope
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let message = envelope
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let result = envelope.get_mut("result").map(Value::take).unwrap_or(Value::Null);

    if status == "1" {
        return Ok(result);
    }
    if message.starts_with("No transactions found") || message.starts_with("No records found") {
        return Ok(json!([]));
    }

    let detail = match &result {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Err(Error::upstream(format!(
        "explorer {}/{} failed: {} {}",
        module, action, message, detail
    )))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AccountHistoryParams {
    /// Account address
    pub address: String,
    /// Token contract to restrict transfers to (token transfers only)
    #[serde(default)]
    pub contract_address: Option<String>,
    /// First block to include (decimal)
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Last block to include (decimal)
    #[serde(default)]
    pub end_block: Option<u64>,
    /// Page number, starting at 1
    #[serde(default)]
    pub page: Option<u32>,
    /// Results per page (default 25, max 1000)
    #[serde(default)]
    pub offset: Option<u32>,
    /// 'asc' or 'desc' (default 'desc')
    #[serde(default)]
    pub sort: Option<String>,
    /// Chain ID or name; defaults to the configured chain
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContractParams {
    /// Contract address
    pub address: String,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifyContractParams {
    /// Deployed contract address
    pub address: String,
    /// Flattened Solidity source, or the standard-json-input document
    pub source_code: String,
    /// Contract name; for standard JSON input use 'path/File.sol:Name'
    pub contract_name: String,
    /// Compiler version, e.g. 'v0.8.24+commit.e11b9ed9'
    pub compiler_version: String,
    /// 'solidity-single-file' (default) or 'solidity-standard-json-input'
    #[serde(default)]
    pub code_format: Option<String>,
    #[serde(default)]
    pub optimization_used: bool,
    /// Optimizer runs (default 200)
    #[serde(default)]
    pub runs: Option<u32>,
    /// ABI-encoded constructor arguments, with or without 0x
    #[serde(default)]
    pub constructor_arguments: Option<String>,
    #[serde(default)]
    pub evm_version: Option<String>,
    /// Explorer license type number (1 = none, 3 = MIT, ...)
    #[serde(default)]
    pub license_type: Option<u32>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerificationStatusParams {
    /// GUID returned by verify_contract
    pub guid: String,
    #[serde(default)]
    pub chain: Option<String>,
}

/// Get all explorer-backed tools
pub fn get_explorer_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "explorer_get_transactions".to_string(),
            "List normal transactions of an address from the block explorer, newest first by default, with paging.".to_string(),
            schema::input_schema::<AccountHistoryParams>(),
        ),
        Tool::new(
            "explorer_get_token_transfers".to_string(),
            "List ERC-20 token transfers of an address from the block explorer, optionally restricted to one token contract.".to_string(),
            schema::input_schema::<AccountHistoryParams>(),
        ),
        Tool::new(
            "explorer_get_contract_abi".to_string(),
            "Fetch the ABI of a verified contract and summarize its functions and events.".to_string(),
            schema::input_schema::<ContractParams>(),
        ),
        Tool::new(
            "explorer_get_source_code".to_string(),
            "Fetch the verified source code and compiler metadata of a contract, including proxy implementation info.".to_string(),
            schema::input_schema::<ContractParams>(),
        ),
        Tool::new(
            "cross_check_balance".to_string(),
            "Fetch an address balance from the block explorer and from the JSON-RPC node concurrently and report whether they agree.".to_string(),
            schema::input_schema::<ContractParams>(),
        ),
        Tool::new(
            "verify_contract".to_string(),
            "Submit contract source code for verification on the block explorer. Returns a GUID for check_verification_status.".to_string(),
            schema::input_schema::<VerifyContractParams>(),
        ),
        Tool::new(
            "check_verification_status".to_string(),
            "Check the status of a verification submission by GUID.".to_string(),
            schema::input_schema::<VerificationStatusParams>(),
        ),
    ]
}

/// Dispatch an explorer tool call. Returns `None` for names this module does not own.
pub async fn dispatch(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    name: &str,
    args: &Option<JsonObject>,
) -> Option<ToolResult> {
    let result = match name {
        "explorer_get_transactions" => handle_account_history(explorer, chains, args, "txlist").await,
        "explorer_get_token_transfers" => handle_account_history(explorer, chains, args, "tokentx").await,
        "explorer_get_contract_abi" => handle_contract_abi(explorer, chains, args).await,
        "explorer_get_source_code" => handle_source_code(explorer, chains, args).await,
        "cross_check_balance" => handle_cross_check_balance(explorer, chains, args).await,
        "verify_contract" => handle_verify_contract(explorer, chains, args).await,
        "check_verification_status" => handle_verification_status(explorer, chains, args).await,
        _ => return None,
    };
    Some(result)
}

fn parse_sort(value: Option<&str>) -> Result<&'static str> {
    match value.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("desc") => Ok("desc"),
        Some("asc") => Ok("asc"),
        Some(other) => Err(Error::invalid(format!("'sort' must be 'asc' or 'desc', got '{}'", other))),
    }
}

/// Handle explorer_get_transactions / explorer_get_token_transfers tool calls
pub async fn handle_account_history(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    args: &Option<JsonObject>,
    action: &'static str,
) -> ToolResult {
    let params: AccountHistoryParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let contract = params
        .contract_address
        .as_deref()
        .map(|c| schema::validate_address("contract_address", c))
        .transpose()
        .map_err(invalid_params)?;
    let sort = parse_sort(params.sort.as_deref()).map_err(invalid_params)?;
    let page = params.page.unwrap_or(1).max(1);
    let offset = params.offset.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let mut query = vec![
        ("address", address.clone()),
        ("startblock", params.start_block.unwrap_or(0).to_string()),
        ("endblock", params.end_block.unwrap_or(99_999_999).to_string()),
        ("page", page.to_string()),
        ("offset", offset.to_string()),
        ("sort", sort.to_string()),
    ];
    if let Some(contract) = &contract {
        query.push(("contractaddress", contract.clone()));
    }

    let outcome: Result<Value> = async {
        let chain = chains.registry.resolve(params.chain.as_deref())?;
        let result = explorer.get(chain.chain_id, "account", action, &query).await?;
        let count = result.as_array().map(Vec::len).unwrap_or(0);
        let key = if action == "tokentx" { "transfers" } else { "transactions" };
        let mut body = json!({
            "chain": { "chain_id": chain.chain_id, "name": chain.name },
            "address": address,
            "page": page,
            "offset": offset,
            "count": count,
        });
        body[key] = result;
        Ok(body)
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Summarize an ABI: function signatures and event names
pub fn summarize_abi(abi: &Value) -> Value {
    let entries = abi.as_array().map(Vec::as_slice).unwrap_or(&[]);
    let signature = |entry: &Value| -> String {
        let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
        let inputs: Vec<&str> = entry
            .get("inputs")
            .and_then(Value::as_array)
            .map(|inputs| {
                inputs
                    .iter()
                    .filter_map(|i| i.get("type").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        format!("{}({})", name, inputs.join(","))
    };
    let of_kind = |kind: &str| -> Vec<String> {
        entries
            .iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some(kind))
            .map(signature)
            .collect()
    };
    json!({
        "functions": of_kind("function"),
        "events": of_kind("event"),
        "errors": of_kind("error"),
    })
}

/// Handle explorer_get_contract_abi tool call
pub async fn handle_contract_abi(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    args: &Option<JsonObject>,
) -> ToolResult {
    let params: ContractParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;

    let outcome: Result<Value> = async {
        let chain = chains.registry.resolve(params.chain.as_deref())?;
        let raw = explorer
            .get(chain.chain_id, "contract", "getabi", &[("address", address.clone())])
            .await?;
        // The ABI arrives as a JSON document encoded in a string
        let abi: Value = match &raw {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| Error::Decode(format!("contract ABI is not valid JSON: {}", e)))?,
            other => other.clone(),
        };
        Ok(json!({
            "chain": { "chain_id": chain.chain_id, "name": chain.name },
            "address": address,
            "summary": summarize_abi(&abi),
            "abi": abi,
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle explorer_get_source_code tool call
pub async fn handle_source_code(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    args: &Option<JsonObject>,
) -> ToolResult {
    let params: ContractParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;

    let outcome: Result<Value> = async {
        let chain = chains.registry.resolve(params.chain.as_deref())?;
        let result = explorer
            .get(chain.chain_id, "contract", "getsourcecode", &[("address", address.clone())])
            .await?;
        let entry = result
            .as_array()
            .and_then(|entries| entries.first())
            .cloned()
            .ok_or_else(|| Error::not_found(format!("source code for {}", address)))?;

        let field = |name: &str| entry.get(name).and_then(Value::as_str).unwrap_or("").to_string();
        let source = field("SourceCode");
        if source.is_empty() {
            return Err(Error::not_found(format!("verified source code for {}", address)));
        }
        let implementation = field("Implementation");
        Ok(json!({
            "chain": { "chain_id": chain.chain_id, "name": chain.name },
            "address": address,
            "contract_name": field("ContractName"),
            "compiler_version": field("CompilerVersion"),
            "optimization_used": field("OptimizationUsed") == "1",
            "runs": field("Runs"),
            "evm_version": field("EVMVersion"),
            "license": field("LicenseType"),
            "is_proxy": field("Proxy") == "1",
            "implementation": if implementation.is_empty() { Value::Null } else { json!(implementation) },
            "constructor_arguments": field("ConstructorArguments"),
            "source_code": source,
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle cross_check_balance tool call
pub async fn handle_cross_check_balance(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    args: &Option<JsonObject>,
) -> ToolResult {
    let params: ContractParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let (chain, client) = match chains.client(params.chain.as_deref()) {
        Ok(pair) => pair,
        Err(e) => return Ok(response::error_result(&e)),
    };

    let explorer_call = async {
        let raw = explorer
            .get(
                chain.chain_id,
                "account",
                "balance",
                &[("address", address.clone()), ("tag", "latest".to_string())],
            )
            .await?;
        raw.as_str()
            .and_then(|s| s.parse::<u128>().ok())
            .ok_or_else(|| Error::Decode(format!("explorer balance is not a decimal amount: {}", raw)))
    };
    let (from_explorer, from_rpc) = futures::join!(explorer_call, client.balance(&address, "latest"));

    let agree = match (&from_explorer, &from_rpc) {
        (Ok(a), Ok(b)) => Some(a == b),
        _ => None,
    };
    let shape = |wei: u128| json!({ "wei": wei.to_string(), "formatted": units::format_ether(wei) });

    Ok(response::json_result(&json!({
        "chain": { "chain_id": chain.chain_id, "name": chain.name },
        "address": address,
        "symbol": chain.native_symbol,
        "explorer": response::inline(from_explorer.map(shape)),
        "rpc": response::inline(from_rpc.map(shape)),
        "balances_match": agree,
    })))
}

/// Handle verify_contract tool call
pub async fn handle_verify_contract(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    args: &Option<JsonObject>,
) -> ToolResult {
    let params: VerifyContractParams = parse_params(args)?;
    let address = schema::validate_address("address", &params.address).map_err(invalid_params)?;
    let code_format = params
        .code_format
        .clone()
        .unwrap_or_else(|| "solidity-single-file".to_string());
    if !matches!(
        code_format.as_str(),
        "solidity-single-file" | "solidity-standard-json-input"
    ) {
        return Err(rmcp::ErrorData::invalid_params(
            format!("Unsupported code_format '{}'", code_format),
            None,
        ));
    }
    if params.source_code.trim().is_empty() {
        return Err(rmcp::ErrorData::invalid_params("'source_code' must not be empty", None));
    }
    let constructor_args = params
        .constructor_arguments
        .as_deref()
        .map(|a| {
            let body = a.trim().trim_start_matches("0x");
            hex::decode(body)
                .map(|_| body.to_lowercase())
                .map_err(|e| Error::invalid(format!("'constructor_arguments' is not valid hex: {}", e)))
        })
        .transpose()
        .map_err(invalid_params)?;

    let mut form = vec![
        ("contractaddress", address.clone()),
        ("sourceCode", params.source_code.clone()),
        ("codeformat", code_format),
        ("contractname", params.contract_name.clone()),
        ("compilerversion", params.compiler_version.clone()),
        ("optimizationUsed", if params.optimization_used { "1" } else { "0" }.to_string()),
        ("runs", params.runs.unwrap_or(200).to_string()),
        ("licenseType", params.license_type.unwrap_or(1).to_string()),
    ];
    if let Some(args) = constructor_args {
        form.push(("constructorArguements", args));
    }
    if let Some(evm) = &params.evm_version {
        form.push(("evmversion", evm.clone()));
    }

    let outcome: Result<Value> = async {
        let chain = chains.registry.resolve(params.chain.as_deref())?;
        if !explorer.has_api_key() {
            return Err(Error::invalid(
                "contract verification requires an explorer API key (CHAIN_MCP_EXPLORER_API_KEY)",
            ));
        }
        tracing::info!(chain_id = chain.chain_id, address = %address, "submitting contract verification");
        let guid = explorer
            .post(chain.chain_id, "contract", "verifysourcecode", &form)
            .await?;
        Ok(json!({
            "chain": { "chain_id": chain.chain_id, "name": chain.name },
            "address": address,
            "guid": guid,
            "next": "call check_verification_status with this guid",
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

/// Handle check_verification_status tool call
pub async fn handle_verification_status(
    explorer: &ExplorerClient,
    chains: &ChainContext,
    args: &Option<JsonObject>,
) -> ToolResult {
    let params: VerificationStatusParams = parse_params(args)?;
    if params.guid.trim().is_empty() {
        return Err(rmcp::ErrorData::invalid_params("'guid' must not be empty", None));
    }

    let outcome: Result<Value> = async {
        let chain = chains.registry.resolve(params.chain.as_deref())?;
        // Pending submissions come back with status "0", so read the raw envelope
        let envelope = explorer
            .get_raw(
                chain.chain_id,
                "contract",
                "checkverifystatus",
                &[("guid", params.guid.trim().to_string())],
            )
            .await?;
        let result = envelope.get("result").and_then(Value::as_str).unwrap_or("").to_string();
        let state = if result.starts_with("Pass") || result.contains("Already Verified") {
            "verified"
        } else if result.starts_with("Pending") || result.contains("queue") {
            "pending"
        } else {
            "failed"
        };
        Ok(json!({
            "chain": { "chain_id": chain.chain_id, "name": chain.name },
            "guid": params.guid.trim(),
            "state": state,
            "result": result,
            "message": envelope.get("message").cloned().unwrap_or(Value::Null),
        }))
    }
    .await;
    Ok(response::from_result(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::ChainRegistry;
    use crate::response::result_text;
    use crate::rpc::RpcClientCache;
    use mockito::Matcher;
    use std::collections::HashMap;
    use std::sync::Arc;

    const ADDR: &str = "0x00000000000000000000000000000000000000aa";

    fn explorer_for(url: &str, key: Option<&str>) -> ExplorerClient {
        let config = ExplorerConfig {
            api_url: url.to_string(),
            api_key: key.map(str::to_string),
        };
        ExplorerClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    fn chains_for(rpc_url: &str) -> ChainContext {
        let mut overrides = HashMap::new();
        overrides.insert("1".to_string(), rpc_url.to_string());
        ChainContext::new(
            ChainRegistry::new(&overrides, "ethereum"),
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
    fn test_unwrap_result_variants() {
        let ok = json!({"status": "1", "message": "OK", "result": [1, 2]});
        assert_eq!(unwrap_result(ok, "account", "txlist").unwrap(), json!([1, 2]));

        let empty = json!({"status": "0", "message": "No transactions found", "result": []});
        assert_eq!(unwrap_result(empty, "account", "txlist").unwrap(), json!([]));

        let failed = json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"});
        let err = unwrap_result(failed, "account", "txlist").unwrap_err();
        assert_eq!(err.kind(), "upstream_failure");
        assert!(err.to_string().contains("Invalid API Key"));
    }

    #[test]
    fn test_summarize_abi() {
        let abi = json!([
            {"type": "function", "name": "transfer", "inputs": [{"type": "address"}, {"type": "uint256"}]},
            {"type": "event", "name": "Transfer", "inputs": [{"type": "address"}, {"type": "address"}, {"type": "uint256"}]},
            {"type": "constructor", "inputs": []}
        ]);
        let summary = summarize_abi(&abi);
        assert_eq!(summary["functions"], json!(["transfer(address,uint256)"]));
        assert_eq!(summary["events"], json!(["Transfer(address,address,uint256)"]));
        assert_eq!(summary["errors"], json!([]));
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort(None).unwrap(), "desc");
        assert_eq!(parse_sort(Some("ASC")).unwrap(), "asc");
        assert!(parse_sort(Some("sideways")).is_err());
    }

    #[tokio::test]
    async fn test_get_transactions_sends_chainid_and_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chainid".into(), "1".into()),
                Matcher::UrlEncoded("module".into(), "account".into()),
                Matcher::UrlEncoded("action".into(), "txlist".into()),
                Matcher::UrlEncoded("apikey".into(), "secret".into()),
                Matcher::UrlEncoded("address".into(), ADDR.into()),
                Matcher::UrlEncoded("offset".into(), "1000".into()),
            ]))
            .with_body(r#"{"status":"1","message":"OK","result":[{"hash":"0x01"},{"hash":"0x02"}]}"#)
            .create_async()
            .await;

        let explorer = explorer_for(&server.url(), Some("secret"));
        let chains = chains_for("http://127.0.0.1:9");
        let result = handle_account_history(
            &explorer,
            &chains,
            &args(json!({ "address": ADDR, "offset": 5000 })),
            "txlist",
        )
        .await
        .unwrap();

        let value = body(&result);
        assert_eq!(value["count"], 2);
        assert_eq!(value["offset"], 1000);
        assert_eq!(value["transactions"][1]["hash"], "0x02");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_contract_abi_decodes_string_payload() {
        let mut server = mockito::Server::new_async().await;
        let abi = r#"[{"type":"function","name":"owner","inputs":[]}]"#;
        server
            .mock("GET", "/")
            .match_query(Matcher::UrlEncoded("action".into(), "getabi".into()))
            .with_body(json!({"status": "1", "message": "OK", "result": abi}).to_string())
            .create_async()
            .await;

        let explorer = explorer_for(&server.url(), None);
        let chains = chains_for("http://127.0.0.1:9");
        let result = handle_contract_abi(&explorer, &chains, &args(json!({ "address": ADDR })))
            .await
            .unwrap();
        let value = body(&result);
        assert_eq!(value["summary"]["functions"], json!(["owner()"]));
        assert!(value["abi"].is_array());
    }

    #[tokio::test]
    async fn test_cross_check_balance_isolates_failures() {
        let mut rpc = mockito::Server::new_async().await;
        rpc.mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0xde0b6b3a7640000"}"#)
            .create_async()
            .await;

        let mut api = mockito::Server::new_async().await;
        api.mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let explorer = explorer_for(&api.url(), Some("k"));
        let chains = chains_for(&rpc.url());
        let result = handle_cross_check_balance(&explorer, &chains, &args(json!({ "address": ADDR })))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        let value = body(&result);
        assert_eq!(value["rpc"]["wei"], "1000000000000000000");
        assert_eq!(value["rpc"]["formatted"], "1");
        assert_eq!(value["explorer"]["error"]["kind"], "upstream_failure");
        assert!(value["balances_match"].is_null());
    }

    #[tokio::test]
    async fn test_cross_check_balance_agreement() {
        let mut rpc = mockito::Server::new_async().await;
        rpc.mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x64"}"#)
            .create_async()
            .await;

        let mut api = mockito::Server::new_async().await;
        api.mock("GET", "/")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":"1","message":"OK","result":"100"}"#)
            .create_async()
            .await;

        let explorer = explorer_for(&api.url(), None);
        let chains = chains_for(&rpc.url());
        let result = handle_cross_check_balance(&explorer, &chains, &args(json!({ "address": ADDR })))
            .await
            .unwrap();
        assert_eq!(body(&result)["balances_match"], true);
    }

    #[tokio::test]
    async fn test_verify_contract_requires_api_key() {
        let explorer = explorer_for("http://127.0.0.1:9", None);
        let chains = chains_for("http://127.0.0.1:9");
        let result = handle_verify_contract(
            &explorer,
            &chains,
            &args(json!({
                "address": ADDR,
                "source_code": "contract A {}",
                "contract_name": "A",
                "compiler_version": "v0.8.24+commit.e11b9ed9"
            })),
        )
        .await
        .unwrap();
        assert_eq!(body(&result)["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_verify_contract_posts_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_query(Matcher::UrlEncoded("action".into(), "verifysourcecode".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("contractname=A".into()),
                Matcher::Regex("constructorArguements=00ff".into()),
            ]))
            .with_body(r#"{"status":"1","message":"OK","result":"guid-123"}"#)
            .create_async()
            .await;

        let explorer = explorer_for(&server.url(), Some("k"));
        let chains = chains_for("http://127.0.0.1:9");
        let result = handle_verify_contract(
            &explorer,
            &chains,
            &args(json!({
                "address": ADDR,
                "source_code": "contract A {}",
                "contract_name": "A",
                "compiler_version": "v0.8.24+commit.e11b9ed9",
                "constructor_arguments": "0x00FF"
            })),
        )
        .await
        .unwrap();
        assert_eq!(body(&result)["guid"], "guid-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_verification_status_pending_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(Matcher::UrlEncoded("guid".into(), "abc".into()))
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Pending in queue"}"#)
            .create_async()
            .await;

        let explorer = explorer_for(&server.url(), Some("k"));
        let chains = chains_for("http://127.0.0.1:9");
        let result = handle_verification_status(&explorer, &chains, &args(json!({ "guid": "abc" })))
            .await
            .unwrap();
        assert_eq!(body(&result)["state"], "pending");
    }
}
