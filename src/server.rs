//! MCP server handler implementation

use anyhow::Result;
use rmcp::{
    model::*,
    service::{RequestContext, RoleServer},
    ErrorData as McpError, ServerHandler,
};
use std::sync::Arc;
use std::time::Duration;

use crate::chain_tools::{self, ChainContext};
use crate::chains::{self, ChainRegistry};
use crate::config::Config;
use crate::explorer::{self, ExplorerClient};
use crate::handlers::{self, KbContext};
use crate::kb::KnowledgeBase;
use crate::prompts;
use crate::rpc::RpcClientCache;
use crate::schema::JsonObject;

/// MCP server handler
#[derive(Clone)]
pub struct ChainMcpHandler {
    config: Arc<Config>,
    chains: ChainContext,
    explorer: Arc<ExplorerClient>,
    kb: KbContext,
}

impl ChainMcpHandler {
    /// Build the handler on the process-wide RPC client cache.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clients(config, RpcClientCache::global())
    }

    pub fn with_clients(config: Config, clients: Arc<RpcClientCache>) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let registry = ChainRegistry::new(&config.rpc_urls, &config.default_chain);
        let explorer = ExplorerClient::new(&config.explorer, timeout)?;
        let kb = KnowledgeBase::new(
            config.kb_root(),
            config.knowledge_base.default_extensions.clone(),
            config.knowledge_base.max_files,
        );

        Ok(Self {
            chains: ChainContext::new(registry, clients, timeout),
            explorer: Arc::new(explorer),
            kb: KbContext::new(kb, timeout)?,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write tools stay hidden unless writes are allowed, whatever `forbidden_tools` says.
    fn is_forbidden(&self, tool: &str) -> bool {
        self.config.is_tool_forbidden(tool)
            || (!self.config.allow_writes && Config::get_default_write_tools().iter().any(|t| t == tool))
    }

    /// Every tool the server exposes, minus the forbidden ones.
    pub fn tool_list(&self) -> Vec<Tool> {
        let mut tools = chains::get_chain_registry_tools();
        tools.extend(chain_tools::get_chain_tools());
        tools.extend(explorer::get_explorer_tools());
        tools.extend(handlers::get_kb_tools());

        tools.retain(|tool| !self.is_forbidden(&tool.name));
        tools
    }

    /// Route one tool call to its module.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        if self.is_forbidden(name) {
            tracing::warn!(tool = name, "rejected forbidden tool");
            return Err(McpError::invalid_params(
                format!("Tool '{}' is disabled by the server configuration", name),
                None,
            ));
        }

        if name == "list_chains" {
            return chains::handle_list_chains(&self.chains.registry).await;
        }
        if let Some(result) = chain_tools::dispatch(&self.chains, name, arguments).await {
            return result;
        }
        if let Some(result) = explorer::dispatch(&self.explorer, &self.chains, name, arguments).await {
            return result;
        }
        if let Some(result) = handlers::dispatch(&self.kb, name, arguments).await {
            return result;
        }

        Err(McpError::invalid_params(format!("Unknown tool: {}", name), None))
    }
}

fn json_resource(uri: String, value: &serde_json::Value) -> Result<ReadResourceResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

    Ok(ReadResourceResult {
        contents: vec![ResourceContents::TextResourceContents {
            uri,
            mime_type: Some("application/json".to_string()),
            text: json,
            meta: None,
        }],
    })
}

impl ServerHandler for ChainMcpHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities {
                prompts: Some(PromptsCapability { list_changed: None }),
                resources: Some(ResourcesCapability {
                    subscribe: None,
                    list_changed: None,
                }),
                tools: Some(ToolsCapability {
                    list_changed: None,
                }),
                logging: None,
                completions: None,
                experimental: None,
            },
            server_info: Implementation {
                name: "chain-mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Chain MCP Server".to_string()),
                icons: None,
                website_url: Some("https://ethereum.org/developers/docs/apis/json-rpc".to_string()),
            },
            instructions: Some("MCP server for EVM chains: JSON-RPC reads (balances, blocks, transactions, storage, logs, proxy detection), block explorer queries and contract verification, and a local knowledge base of ingested documents and source code searchable by keyword".into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_list(),
            next_cursor: None,
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut chains_resource = RawResource::new("chains://all", "Supported Chains");
        chains_resource.description = Some(
            "Chains this server can query, with chain IDs, names and the RPC endpoint in use"
                .to_string(),
        );
        chains_resource.mime_type = Some("application/json".to_string());

        let mut sources_resource = RawResource::new("kb://sources", "Knowledge Base Sources");
        sources_resource.description =
            Some("Registry of ingested knowledge-base sources and their manifests".to_string());
        sources_resource.mime_type = Some("application/json".to_string());

        Ok(ListResourcesResult {
            resources: vec![
                chains_resource.no_annotation(),
                sources_resource.no_annotation(),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match request.uri.as_str() {
            "chains://all" => json_resource(request.uri, &chains::chains_json(&self.chains.registry)),
            "kb://sources" => {
                let kb = self.kb.kb.clone();
                let sources = tokio::task::spawn_blocking(move || kb.sources_json())
                    .await
                    .map_err(|e| McpError::internal_error(format!("Task error: {}", e), None))?
                    .map_err(|e| {
                        McpError::internal_error(
                            format!("Failed to read knowledge base registry: {}", e),
                            None,
                        )
                    })?;
                json_resource(request.uri, &sources)
            }
            _ => Err(McpError::invalid_params(
                format!("Unknown resource URI: {}", request.uri),
                None,
            )),
        }
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult {
            prompts: prompts::list_prompts(),
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        prompts::get_prompt(&request.name, &request.arguments)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = %request.name, "tool call");
        self.dispatch(&request.name, &request.arguments).await
    }
}
