//! # MCP Handler Module
//!
//! Implements the Model Context Protocol surface of the token server: it
//! handles incoming MCP requests and dispatches them to the wallet session.
//!
//! ## Supported Tools
//!
//! ### Wallet
//! - `connect_wallet` - Connect the detected (or named) wallet
//! - `disconnect_wallet` - Drop the connection and cancel its monitors
//! - `get_wallet_state` - Connection state and cached balances
//!
//! ### Balances
//! - `get_balances` - Cached CAT and gas balances
//! - `refresh_balances` - Reload both balances from the chain
//!
//! ### Tokens
//! - `issue_tokens` - Mint CAT to a recipient
//! - `transfer_tokens` - Transfer CAT from the connected account
//! - `get_total_supply` - Total supply of CAT or the gas token
//! - `get_transaction_status` - Status of a submitted transaction

use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    blockchain::models::{TokenKind, TokenMintResult, TxStatus, WalletState},
    mcp::protocol::{error_codes, Request, Response},
    utils, AppState,
};

// Helper: produce a result Value that always contains a text content array
// and preserves structured data for JSON-friendly clients.
fn make_texty_result(text: String, payload: Value) -> Value {
    let content = json!([{ "type": "text", "text": text }]);
    match payload {
        Value::Object(mut map) => {
            if !map.contains_key("content") {
                map.insert("content".into(), content);
            }
            Value::Object(map)
        }
        other => json!({
            "data": other,
            "content": content
        }),
    }
}

fn to_value<T: serde::Serialize>(req_id: &Value, value: &T) -> Result<Value, Response> {
    serde_json::to_value(value)
        .map_err(|e| Response::error(req_id.clone(), error_codes::INTERNAL_ERROR, e.to_string()))
}

fn describe_state(state: &WalletState) -> String {
    match &state.account {
        Some(account) => format!(
            "Connected {} via {}: {} CAT, {} STRK{}",
            account,
            state.wallet_name.as_deref().unwrap_or("unknown wallet"),
            state.cat_balance.formatted,
            state.gas_balance.formatted,
            if state.cat_balance.is_real_data { "" } else { " (not live data)" }
        ),
        None => "No wallet connected".to_string(),
    }
}

fn describe_result(result: &TokenMintResult) -> String {
    match result.status {
        TxStatus::Pending => format!(
            "Transaction {} submitted, waiting for confirmation",
            result.transaction_hash
        ),
        TxStatus::Confirmed => format!(
            "Transaction {} confirmed in block {}",
            result.transaction_hash,
            result.block_number.map(|b| b.to_string()).unwrap_or_else(|| "?".into())
        ),
        TxStatus::Failed => format!(
            "Transaction {} failed: {}",
            result.transaction_hash,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request(req: Request, state: AppState) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "tools/list" => handle_tools_list(&req),
        "tools/call" => handle_tool_call(req, state).await,
        // Direct method calls are rewritten into tools/call to reuse the same logic
        "connect_wallet" | "disconnect_wallet" | "get_wallet_state" | "get_balances" | "refresh_balances"
        | "issue_tokens" | "transfer_tokens" | "get_total_supply" | "get_transaction_status" => {
            let name = req.method.clone();
            let wrapped = Request {
                jsonrpc: req.jsonrpc.clone(),
                id: req.id.clone(),
                method: "tools/call".to_string(),
                params: Some(json!({
                    "name": name,
                    "arguments": req.params.clone().unwrap_or_else(|| json!({}))
                })),
            };
            handle_tool_call(wrapped, state).await
        }
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request by dispatching it to the correct tool logic.
async fn handle_tool_call(req: Request, state: AppState) -> Response {
    let params = match req.params.as_ref() {
        Some(p) => p,
        None => {
            return Response::error(req.id, error_codes::INVALID_PARAMS, "Missing 'params' object".into())
        }
    };

    let tool_name = match params.get("name").and_then(|n| n.as_str()) {
        Some(name) => name,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' field in params".into(),
            )
        }
    };

    let empty_args = json!({});
    let args = params.get("arguments").unwrap_or(&empty_args);
    let req_id = &req.id;
    let session = &state.session;

    let res: Result<Response, Response> = async {
        match tool_name {
            "connect_wallet" => {
                let wallet = args.get("wallet").and_then(|v| v.as_str());
                let wallet_state = session
                    .connect(wallet)
                    .await
                    .map_err(|e| Response::session_error(req_id.clone(), &e))?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(describe_state(&wallet_state), to_value(req_id, &wallet_state)?),
                ))
            }
            "disconnect_wallet" => {
                let wallet_state = session.disconnect().await;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result("Wallet disconnected".to_string(), to_value(req_id, &wallet_state)?),
                ))
            }
            "get_wallet_state" | "get_balances" => {
                let wallet_state = session.state().await;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(describe_state(&wallet_state), to_value(req_id, &wallet_state)?),
                ))
            }
            "refresh_balances" => {
                let wallet_state = session
                    .refresh_balances()
                    .await
                    .map_err(|e| Response::session_error(req_id.clone(), &e))?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(describe_state(&wallet_state), to_value(req_id, &wallet_state)?),
                ))
            }
            "issue_tokens" | "transfer_tokens" => {
                let recipient = utils::get_required_arg::<String>(args, "recipient", req_id)?;
                let amount = utils::get_required_arg::<String>(args, "amount", req_id)?;
                let outcome = if tool_name == "issue_tokens" {
                    session.issue_tokens(&recipient, &amount).await
                } else {
                    session.transfer_tokens(&recipient, &amount).await
                };
                let result = outcome.map_err(|e| {
                    error!("{} failed: {}", tool_name, e);
                    Response::session_error(req_id.clone(), &e)
                })?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(describe_result(&result), to_value(req_id, &result)?),
                ))
            }
            "get_total_supply" => {
                let token = match args.get("token") {
                    Some(v) => serde_json::from_value::<TokenKind>(v.clone()).map_err(|_| {
                        Response::error(
                            req_id.clone(),
                            error_codes::INVALID_PARAMS,
                            "'token' must be 'cat' or 'gas'".into(),
                        )
                    })?,
                    None => TokenKind::Cat,
                };
                let supply = session
                    .total_supply(token)
                    .await
                    .map_err(|e| Response::session_error(req_id.clone(), &e))?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(
                        format!("Total supply: {}", supply.formatted),
                        to_value(req_id, &supply)?,
                    ),
                ))
            }
            "get_transaction_status" => {
                let tx_hash = utils::get_required_arg::<String>(args, "transaction_hash", req_id)?;
                let wait = args.get("wait").and_then(|v| v.as_bool()).unwrap_or(false);
                let result = if wait {
                    session.wait_for_transaction(&tx_hash).await
                } else {
                    session.transaction(&tx_hash)
                };
                let result = result.ok_or_else(|| {
                    Response::error(
                        req_id.clone(),
                        error_codes::INVALID_PARAMS,
                        format!("No tracked transaction {}", tx_hash),
                    )
                })?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(describe_result(&result), to_value(req_id, &result)?),
                ))
            }
            _ => Err(Response::error(
                req_id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Tool not found: {}", tool_name),
            )),
        }
    }
    .await;

    res.unwrap_or_else(|err_resp| err_resp)
}

fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "scf_token",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({ "tools": { "listChanged": false } });
    let instructions =
        "CAT token server: connect a Starknet wallet, read balances, issue and transfer CAT, and track transactions.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": "2025-06-18",
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request by returning a JSON definition of all available tools.
fn handle_tools_list(req: &Request) -> Response {
    let no_args = json!({ "type": "object", "properties": {}, "additionalProperties": false });
    let amount_args = json!({
        "type": "object",
        "properties": {
            "recipient": {"type": "string", "description": "0x... Starknet address of the recipient."},
            "amount": {"type": "string", "description": "Amount in whole tokens, e.g. '12.5'."}
        },
        "required": ["recipient", "amount"]
    });
    let tools = json!([
        {
            "name": "connect_wallet",
            "description": "Connect a wallet. With several wallets detected, 'wallet' must name one.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "wallet": {"type": "string", "description": "Name of the wallet provider to use."}
                }
            }
        },
        {
            "name": "disconnect_wallet",
            "description": "Disconnect the wallet and stop tracking its transactions.",
            "inputSchema": no_args
        },
        {
            "name": "get_wallet_state",
            "description": "Connection state, account and cached balances.",
            "inputSchema": no_args
        },
        {
            "name": "get_balances",
            "description": "Cached CAT and STRK balances. 'isRealData' is false for placeholder values.",
            "inputSchema": no_args
        },
        {
            "name": "refresh_balances",
            "description": "Reload CAT and STRK balances from the chain.",
            "inputSchema": no_args
        },
        {
            "name": "issue_tokens",
            "description": "Mint CAT to a recipient. Registers the connected account as issuer if needed.",
            "inputSchema": amount_args
        },
        {
            "name": "transfer_tokens",
            "description": "Transfer CAT from the connected account.",
            "inputSchema": amount_args
        },
        {
            "name": "get_total_supply",
            "description": "Total supply of CAT ('cat', default) or the gas token ('gas').",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "token": {"type": "string", "enum": ["cat", "gas"]}
                }
            }
        },
        {
            "name": "get_transaction_status",
            "description": "Status of a transaction submitted in this session.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "transaction_hash": {"type": "string"},
                    "wait": {"type": "boolean", "description": "Block until the transaction is final."}
                },
                "required": ["transaction_hash"]
            }
        }
    ]);

    Response::success(req.id.clone(), json!({ "tools": tools }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    fn state() -> AppState {
        let config = Config {
            retry_base_delay: Duration::from_millis(1),
            ..Config::default()
        };
        AppState::from_config(config).unwrap()
    }

    fn call(id: i64, name: &str, arguments: Value) -> Request {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn lists_all_tools() {
        let req: Request = serde_json::from_value(json!({"id": 1, "method": "tools/list"})).unwrap();
        let resp = handle_mcp_request(req, state()).await.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 9);
    }

    #[tokio::test]
    async fn transfer_requires_connection() {
        let resp = handle_mcp_request(call(2, "transfer_tokens", json!({"recipient": "0xb0b", "amount": "1"})), state())
            .await
            .unwrap();
        let error = resp.error.unwrap();
        assert_eq!(error.code, error_codes::NOT_CONNECTED);
    }

    #[tokio::test]
    async fn missing_argument_is_invalid_params() {
        let app = state();
        handle_mcp_request(call(3, "connect_wallet", json!({})), app.clone()).await.unwrap();
        let resp = handle_mcp_request(call(4, "issue_tokens", json!({"recipient": "0xb0b"})), app)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn direct_method_alias_is_dispatched() {
        let req: Request = serde_json::from_value(json!({"id": 5, "method": "get_wallet_state"})).unwrap();
        let resp = handle_mcp_request(req, state()).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isConnected"], json!(false));
        assert_eq!(result["content"][0]["text"], "No wallet connected");
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let req: Request = serde_json::from_value(json!({"method": "notifications/initialized"})).unwrap();
        assert!(handle_mcp_request(req, state()).await.is_none());
    }
}
