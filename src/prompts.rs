//! Prompt templates that walk an agent through common investigations

use rmcp::model::{GetPromptResult, Prompt, PromptArgument, PromptMessage, PromptMessageRole};
use rmcp::ErrorData as McpError;
use serde_json::Value;

use crate::schema::{self, JsonObject};

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(required),
    }
}

/// All prompts advertised by the server
pub fn list_prompts() -> Vec<Prompt> {
    vec![
        Prompt::new(
            "analyze_contract",
            Some("Inspect a deployed contract: bytecode, proxy layout, verified source and ABI"),
            Some(vec![
                argument("address", "Contract address (0x-prefixed)", true),
                argument("chain", "Chain ID or name; defaults to the configured chain", false),
            ]),
        ),
        Prompt::new(
            "explain_transaction",
            Some("Explain what a transaction did, using its receipt, logs and the contracts involved"),
            Some(vec![
                argument("hash", "Transaction hash (0x-prefixed)", true),
                argument("chain", "Chain ID or name; defaults to the configured chain", false),
            ]),
        ),
        Prompt::new(
            "search_docs",
            Some("Answer a question from the ingested knowledge base, citing chunks"),
            Some(vec![
                argument("question", "What to look up", true),
                argument("source_id", "Restrict the search to one source", false),
            ]),
        ),
    ]
}

fn arg<'a>(arguments: &'a Option<JsonObject>, name: &str) -> Option<&'a str> {
    arguments
        .as_ref()
        .and_then(|a| a.get(name))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required<'a>(arguments: &'a Option<JsonObject>, name: &str) -> Result<&'a str, McpError> {
    arg(arguments, name).ok_or_else(|| {
        McpError::invalid_params(format!("Missing required prompt argument '{}'", name), None)
    })
}

fn chain_clause(arguments: &Option<JsonObject>) -> String {
    match arg(arguments, "chain") {
        Some(chain) => format!(" on chain '{}' (pass chain=\"{}\" to every tool)", chain, chain),
        None => " on the default chain".to_string(),
    }
}

/// Render one prompt with its arguments.
pub fn get_prompt(name: &str, arguments: &Option<JsonObject>) -> Result<GetPromptResult, McpError> {
    let (description, text) = match name {
        "analyze_contract" => {
            let address = schema::validate_address("address", required(arguments, "address")?)
                .map_err(schema::invalid_params)?;
            let text = format!(
                "Analyze the contract at {address}{chain}.\n\n\
                 1. Call get_code to confirm it is a contract and note its size.\n\
                 2. Call detect_proxy. If it is a proxy, repeat the next steps for the implementation address as well.\n\
                 3. Call explorer_get_source_code and explorer_get_contract_abi to read the verified source and interface.\n\
                 4. Search the knowledge base with kb_search for the contract name or protocol to find local notes.\n\n\
                 Summarize what the contract does, who controls it (owner, admin, upgrade path), \
                 and any privileged or value-moving functions. Report tool errors instead of guessing.",
                address = address,
                chain = chain_clause(arguments),
            );
            ("Contract analysis walkthrough", text)
        }
        "explain_transaction" => {
            let hash = schema::validate_hash("hash", required(arguments, "hash")?)
                .map_err(schema::invalid_params)?;
            let text = format!(
                "Explain transaction {hash}{chain}.\n\n\
                 1. Call get_transaction and get_transaction_receipt.\n\
                 2. For the recipient and every log emitter, call explorer_get_contract_abi to decode \
                    the function selector and event topics.\n\
                 3. Use get_block on the receipt's block number for the timestamp.\n\n\
                 Describe in plain language who called what, which assets moved between which \
                 addresses, whether it succeeded, and what it cost in gas.",
                hash = hash,
                chain = chain_clause(arguments),
            );
            ("Transaction explanation walkthrough", text)
        }
        "search_docs" => {
            let question = required(arguments, "question")?;
            let scope = match arg(arguments, "source_id") {
                Some(source) => format!(" with source_ids=[\"{}\"]", source),
                None => String::new(),
            };
            let text = format!(
                "Answer this question from the knowledge base: {question}\n\n\
                 1. Call kb_search{scope} with the most distinctive terms of the question; \
                    try a few phrasings if the first search is empty.\n\
                 2. Call kb_get_chunk for the best hits, and kb_get_file when surrounding context is needed.\n\n\
                 Answer only from what you retrieved and cite each claim as source_id/path:start-end.",
                question = question,
                scope = scope,
            );
            ("Knowledge base lookup", text)
        }
        other => {
            return Err(McpError::invalid_params(
                format!("Unknown prompt: {}", other),
                None,
            ))
        }
    };

    Ok(GetPromptResult {
        description: Some(description.to_string()),
        messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
    })
}
