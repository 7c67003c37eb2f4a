//! Configuration management for the chain MCP server

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default Etherscan-compatible multichain endpoint.
pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Configuration for the chain MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tools that are hidden from the host and rejected when called
    #[serde(default)]
    pub forbidden_tools: Vec<String>,

    /// Whether tools that write to the chain are exposed
    #[serde(default)]
    pub allow_writes: bool,

    /// Chain used when a tool call omits `chain`
    #[serde(default = "default_chain")]
    pub default_chain: String,

    /// RPC endpoint overrides keyed by chain id or chain name
    #[serde(default)]
    pub rpc_urls: HashMap<String, String>,

    #[serde(default)]
    pub explorer: ExplorerConfig,

    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,

    /// Per-request timeout applied to every outbound HTTP client
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

/// Block explorer (Etherscan v2 compatible) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_explorer_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Local knowledge-base store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Store root; `~/.chain-mcp/kb` when unset
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Extension allow-list used when an ingest call does not pass one
    #[serde(default = "default_extensions")]
    pub default_extensions: Vec<String>,
    /// Upper bound applied to every ingestion's file count
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_chain() -> String {
    "ethereum".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_explorer_url() -> String {
    DEFAULT_EXPLORER_API_URL.to_string()
}

fn default_extensions() -> Vec<String> {
    ["md", "markdown", "mdx", "txt", "sol", "vy", "rs", "ts", "js", "json", "toml", "yaml", "yml"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_max_files() -> usize {
    5000
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_url: default_explorer_url(),
            api_key: None,
        }
    }
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            root: None,
            default_extensions: default_extensions(),
            max_files: default_max_files(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forbidden_tools: vec![],
            allow_writes: false,
            default_chain: default_chain(),
            rpc_urls: HashMap::new(),
            explorer: ExplorerConfig::default(),
            knowledge_base: KnowledgeBaseConfig::default(),
            request_timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// Write tools are merged into `forbidden_tools` unless `allow_writes` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file: {}", path_ref.display()))?;

        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path_ref.display()))?;

        config.apply_write_restrictions();
        Ok(config)
    }

    /// Load configuration from `~/.chain-mcp-config.json`, falling back to defaults.
    pub fn load_default() -> Self {
        if let Ok(home) = std::env::var("HOME") {
            let default_path = format!("{}/.chain-mcp-config.json", home);
            if Path::new(&default_path).exists() {
                match Self::from_file(&default_path) {
                    Ok(config) => {
                        tracing::info!(path = %default_path, "loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = %default_path, error = %e, "failed to parse config");
                    }
                }
            }
        }

        tracing::info!("using default config with write tools disabled");
        let mut config = Self::default();
        config.apply_write_restrictions();
        config
    }

    /// Overlay values from the process environment (and `.env`, if present).
    pub fn apply_env_overrides(&mut self) {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("CHAIN_MCP_EXPLORER_API_KEY")
            .or_else(|_| std::env::var("ETHERSCAN_API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_some() {
            self.explorer.api_key = api_key;
        }

        if let Ok(dir) = std::env::var("CHAIN_MCP_KB_DIR") {
            if !dir.is_empty() {
                self.knowledge_base.root = Some(PathBuf::from(dir));
            }
        }

        if let Ok(chain) = std::env::var("CHAIN_MCP_DEFAULT_CHAIN") {
            if !chain.is_empty() {
                self.default_chain = chain;
            }
        }
    }

    /// Merge the write tools into `forbidden_tools` when writes are not allowed.
    fn apply_write_restrictions(&mut self) {
        if self.allow_writes {
            return;
        }

        let write_tools: Vec<String> = Self::get_default_write_tools()
            .into_iter()
            .filter(|tool| !self.forbidden_tools.contains(tool))
            .collect();
        self.forbidden_tools.extend(write_tools);
    }

    /// Check if a tool is forbidden
    pub fn is_tool_forbidden(&self, tool: &str) -> bool {
        self.forbidden_tools.iter().any(|name| name == tool)
    }

    /// Tools that mutate chain state and are hidden unless `allow_writes` is `true`.
    pub fn get_default_write_tools() -> Vec<String> {
        vec!["send_raw_transaction".to_string()]
    }

    /// Resolved knowledge-base root directory.
    pub fn kb_root(&self) -> PathBuf {
        if let Some(root) = &self.knowledge_base.root {
            return root.clone();
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".chain-mcp").join("kb")
    }

    /// Create a configuration with write tools disabled.
    pub fn safe_default() -> Self {
        Self {
            forbidden_tools: Self::get_default_write_tools(),
            ..Self::default()
        }
    }

    /// Save configuration to a file in JSON format.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;

        std::fs::write(path_ref, json)
            .with_context(|| format!("Failed to write config file: {}", path_ref.display()))?;

        Ok(())
    }
}
