//! Tool parameter schemas and validation
//!
//! Every tool declares its parameters as a `serde` + `schemars` struct. The
//! derived JSON schema is advertised to the host, and incoming arguments are
//! deserialized into the same struct, so the advertised and enforced shapes
//! cannot drift apart.

use rmcp::ErrorData;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};

pub type JsonObject = serde_json::Map<String, Value>;

/// Parameters for tools that take no input
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct EmptyParams {}

/// Derive the MCP input schema for a parameter struct.
pub fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(T);
    let mut object = match serde_json::to_value(&schema) {
        Ok(Value::Object(map)) => map,
        _ => JsonObject::new(),
    };
    // Hosts expect a plain object schema; drop the draft marker and the Rust type name
    object.remove("$schema");
    object.remove("title");
    object
        .entry("type".to_string())
        .or_insert_with(|| Value::String("object".to_string()));
    object
        .entry("properties".to_string())
        .or_insert_with(|| Value::Object(JsonObject::new()));
    Arc::new(object)
}

/// Deserialize tool arguments, mapping shape errors to MCP `invalid_params`.
pub fn parse_params<T: DeserializeOwned>(
    arguments: &Option<JsonObject>,
) -> std::result::Result<T, ErrorData> {
    let value = Value::Object(arguments.clone().unwrap_or_default());
    serde_json::from_value(value)
        .map_err(|e| ErrorData::invalid_params(format!("Invalid parameters: {}", e), None))
}

/// Map a validation failure to MCP `invalid_params`.
pub fn invalid_params(err: Error) -> ErrorData {
    ErrorData::invalid_params(err.to_string(), None)
}

fn is_hex_body(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a 20-byte `0x`-prefixed address; returns it lower-cased.
pub fn validate_address(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(body) if body.len() == 40 && is_hex_body(body) => {
            Ok(format!("0x{}", body.to_lowercase()))
        }
        _ => Err(Error::invalid(format!(
            "'{}' must be a 0x-prefixed 20-byte hex address, got '{}'",
            field, value
        ))),
    }
}

/// Validate a 32-byte `0x`-prefixed hash.
pub fn validate_hash(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    match trimmed.strip_prefix("0x") {
        Some(body) if body.len() == 64 && is_hex_body(body) => {
            Ok(format!("0x{}", body.to_lowercase()))
        }
        _ => Err(Error::invalid(format!(
            "'{}' must be a 0x-prefixed 32-byte hex hash, got '{}'",
            field, value
        ))),
    }
}

/// Validate `0x`-prefixed hex data (calldata, signed transactions).
pub fn validate_hex_data(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    let body = trimmed.strip_prefix("0x").ok_or_else(|| {
        Error::invalid(format!("'{}' must be 0x-prefixed hex data", field))
    })?;
    hex::decode(body)
        .map_err(|e| Error::invalid(format!("'{}' is not valid hex data: {}", field, e)))?;
    Ok(format!("0x{}", body.to_lowercase()))
}

/// Normalize a block selector into the JSON-RPC block parameter form.
///
/// Accepts the named tags, decimal numbers and `0x` quantities. `None` means `latest`.
pub fn parse_block_tag(value: Option<&str>) -> Result<String> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok("latest".to_string());
    };

    let lower = raw.to_lowercase();
    match lower.as_str() {
        "latest" | "earliest" | "pending" | "safe" | "finalized" => return Ok(lower),
        _ => {}
    }

    if let Some(body) = lower.strip_prefix("0x") {
        if !body.is_empty() && is_hex_body(body) {
            let number = u64::from_str_radix(body, 16)
                .map_err(|_| Error::invalid(format!("Block number '{}' is out of range", raw)))?;
            return Ok(format!("0x{:x}", number));
        }
    } else if let Ok(number) = lower.parse::<u64>() {
        return Ok(format!("0x{:x}", number));
    }

    Err(Error::invalid(format!(
        "Invalid block '{}': use latest, earliest, pending, safe, finalized, a decimal number or a 0x quantity",
        raw
    )))
}

/// Validate a storage slot given as a decimal index or a `0x` word.
pub fn parse_storage_slot(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if let Some(body) = trimmed.strip_prefix("0x") {
        if !body.is_empty() && body.len() <= 64 && is_hex_body(body) {
            return Ok(format!("0x{}", body.to_lowercase()));
        }
    } else if let Ok(index) = trimmed.parse::<u128>() {
        return Ok(format!("0x{:x}", index));
    }
    Err(Error::invalid(format!(
        "Invalid storage slot '{}': use a decimal index or a 0x-prefixed word of at most 32 bytes",
        value
    )))
}
