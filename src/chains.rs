//! Chain registry for EVM networks
//!
//! A built-in table of well-known chains, overlaid with RPC endpoint overrides
//! from the configuration. Lookups accept a chain ID or a name.

use rmcp::model::{CallToolResult, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::response;
use crate::schema::{self, EmptyParams};

/// Static description of a known chain
struct KnownChain {
    chain_id: u64,
    name: &'static str,
    short_name: &'static str,
    aliases: &'static [&'static str],
    native_symbol: &'static str,
    rpc_url: &'static str,
    testnet: bool,
}

const KNOWN_CHAINS: &[KnownChain] = &[
    KnownChain {
        chain_id: 1,
        name: "Ethereum Mainnet",
        short_name: "ethereum",
        aliases: &["eth", "mainnet"],
        native_symbol: "ETH",
        rpc_url: "https://ethereum-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 10,
        name: "OP Mainnet",
        short_name: "optimism",
        aliases: &["op"],
        native_symbol: "ETH",
        rpc_url: "https://optimism-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 56,
        name: "BNB Smart Chain",
        short_name: "bsc",
        aliases: &["bnb", "binance"],
        native_symbol: "BNB",
        rpc_url: "https://bsc-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 100,
        name: "Gnosis",
        short_name: "gnosis",
        aliases: &["xdai"],
        native_symbol: "XDAI",
        rpc_url: "https://gnosis-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 137,
        name: "Polygon PoS",
        short_name: "polygon",
        aliases: &["matic", "pol"],
        native_symbol: "POL",
        rpc_url: "https://polygon-bor-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 324,
        name: "zkSync Era",
        short_name: "zksync",
        aliases: &["zksync-era"],
        native_symbol: "ETH",
        rpc_url: "https://mainnet.era.zksync.io",
        testnet: false,
    },
    KnownChain {
        chain_id: 8453,
        name: "Base",
        short_name: "base",
        aliases: &[],
        native_symbol: "ETH",
        rpc_url: "https://base-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 42161,
        name: "Arbitrum One",
        short_name: "arbitrum",
        aliases: &["arb", "arbitrum-one"],
        native_symbol: "ETH",
        rpc_url: "https://arbitrum-one-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 43114,
        name: "Avalanche C-Chain",
        short_name: "avalanche",
        aliases: &["avax"],
        native_symbol: "AVAX",
        rpc_url: "https://avalanche-c-chain-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 59144,
        name: "Linea",
        short_name: "linea",
        aliases: &[],
        native_symbol: "ETH",
        rpc_url: "https://linea-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 534352,
        name: "Scroll",
        short_name: "scroll",
        aliases: &[],
        native_symbol: "ETH",
        rpc_url: "https://scroll-rpc.publicnode.com",
        testnet: false,
    },
    KnownChain {
        chain_id: 17000,
        name: "Holesky",
        short_name: "holesky",
        aliases: &[],
        native_symbol: "ETH",
        rpc_url: "https://ethereum-holesky-rpc.publicnode.com",
        testnet: true,
    },
    KnownChain {
        chain_id: 11155111,
        name: "Sepolia",
        short_name: "sepolia",
        aliases: &[],
        native_symbol: "ETH",
        rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
        testnet: true,
    },
    KnownChain {
        chain_id: 84532,
        name: "Base Sepolia",
        short_name: "base-sepolia",
        aliases: &[],
        native_symbol: "ETH",
        rpc_url: "https://base-sepolia-rpc.publicnode.com",
        testnet: true,
    },
];

/// Resolved chain configuration used by the RPC and explorer layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub short_name: String,
    pub native_symbol: String,
    pub rpc_url: String,
    pub testnet: bool,
}

impl ChainConfig {
    fn from_known(known: &KnownChain) -> Self {
        Self {
            chain_id: known.chain_id,
            name: known.name.to_string(),
            short_name: known.short_name.to_string(),
            native_symbol: known.native_symbol.to_string(),
            rpc_url: known.rpc_url.to_string(),
            testnet: known.testnet,
        }
    }

    fn custom(chain_id: u64, rpc_url: &str) -> Self {
        Self {
            chain_id,
            name: format!("Chain {}", chain_id),
            short_name: chain_id.to_string(),
            native_symbol: "ETH".to_string(),
            rpc_url: rpc_url.to_string(),
            testnet: false,
        }
    }
}

/// Chain lookup table with configured RPC overrides applied
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainConfig>,
    default_chain: String,
}

impl ChainRegistry {
    /// Build the registry from the built-in table and `rpc_urls` overrides.
    ///
    /// Override keys may be a chain ID or any name accepted by [`ChainRegistry::resolve`];
    /// numeric keys for unknown chains add a custom entry.
    pub fn new(overrides: &HashMap<String, String>, default_chain: &str) -> Self {
        let mut chains: Vec<ChainConfig> = KNOWN_CHAINS.iter().map(ChainConfig::from_known).collect();

        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        for key in keys {
            let url = &overrides[key];
            if let Some(idx) = find_chain_index(&chains, key) {
                chains[idx].rpc_url = url.clone();
            } else if let Ok(chain_id) = key.parse::<u64>() {
                chains.push(ChainConfig::custom(chain_id, url));
            } else {
                tracing::warn!(chain = %key, "ignoring RPC override for unknown chain name");
            }
        }

        Self {
            chains,
            default_chain: default_chain.to_string(),
        }
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    /// Resolve an optional chain selector, falling back to the default chain.
    pub fn resolve(&self, query: Option<&str>) -> Result<&ChainConfig> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(&self.default_chain);

        find_chain_index(&self.chains, query)
            .map(|idx| &self.chains[idx])
            .ok_or_else(|| {
                Error::invalid(format!(
                    "Chain '{}' not found. Use a chain ID (e.g. '1') or a name such as 'ethereum', 'base', 'arbitrum'; unknown chain IDs need an rpc_urls entry in the config",
                    query
                ))
            })
    }
}

/// Find a chain by ID, then exact name, then partial name match
fn find_chain_index(chains: &[ChainConfig], query: &str) -> Option<usize> {
    if let Ok(chain_id) = query.parse::<u64>() {
        return chains.iter().position(|c| c.chain_id == chain_id);
    }

    let query_lower = query.to_lowercase();

    let exact = chains.iter().position(|c| {
        c.name.to_lowercase() == query_lower
            || c.short_name == query_lower
            || aliases_of(c.chain_id).contains(&query_lower.as_str())
    });
    if exact.is_some() {
        return exact;
    }

    chains.iter().position(|c| {
        c.name.to_lowercase().contains(&query_lower) || c.short_name.contains(&query_lower)
    })
}

fn aliases_of(chain_id: u64) -> &'static [&'static str] {
    KNOWN_CHAINS
        .iter()
        .find(|k| k.chain_id == chain_id)
        .map(|k| k.aliases)
        .unwrap_or(&[])
}

/// JSON listing of the registry, used by `list_chains` and the `chains://all` resource.
pub fn chains_json(registry: &ChainRegistry) -> Value {
    let chains: Vec<Value> = registry
        .chains()
        .iter()
        .map(|c| {
            json!({
                "chain_id": c.chain_id,
                "name": c.name,
                "short_name": c.short_name,
                "native_symbol": c.native_symbol,
                "rpc_url": c.rpc_url,
                "testnet": c.testnet,
            })
        })
        .collect();
    json!({
        "default_chain": registry.default_chain,
        "count": chains.len(),
        "chains": chains,
    })
}

/// Get chain registry MCP tools
pub fn get_chain_registry_tools() -> Vec<Tool> {
    vec![Tool::new(
        "list_chains".to_string(),
        "List the EVM networks this server can query, with chain IDs, names accepted by the `chain` parameter, native currency and the RPC endpoint in use.".to_string(),
        schema::input_schema::<EmptyParams>(),
    )]
}

/// Handle list_chains tool call
pub async fn handle_list_chains(registry: &ChainRegistry) -> std::result::Result<CallToolResult, rmcp::ErrorData> {
    Ok(response::json_result(&chains_json(registry)))
}
