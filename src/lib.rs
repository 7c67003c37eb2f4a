//! Chain MCP Server
//!
//! A Model Context Protocol (MCP) server that gives an agent read access to EVM chains over
//! JSON-RPC, block explorer queries and contract verification, plus a local knowledge base of
//! ingested documents and source code with keyword search.

pub mod chain_tools;
pub mod chains;
pub mod config;
pub mod error;
pub mod explorer;
pub mod handlers;
pub mod kb;
pub mod prompts;
pub mod response;
pub mod rpc;
pub mod schema;
pub mod server;
pub mod units;

pub use server::ChainMcpHandler;
