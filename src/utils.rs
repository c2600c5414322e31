//! Utility functions shared by the token service, mock chain and MCP layer

use ethers_core::types::U256;
use serde::de::DeserializeOwned;
use serde_json::{from_value, Value};

use crate::mcp::protocol::{error_codes, Response};

/// Helper function to extract a required argument from a JSON object
pub fn get_required_arg<T: DeserializeOwned>(args: &Value, key: &str, req_id: &Value) -> Result<T, Response> {
    from_value(args.get(key).cloned().unwrap_or(Value::Null)).map_err(|_| {
        Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Missing or invalid required argument: '{}'", key),
        )
    })
}

/// A Starknet address is a felt: `0x` followed by 1 to 64 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    match address.trim().strip_prefix("0x") {
        Some(hex) => !hex.is_empty() && hex.len() <= 64 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Canonical form for comparing addresses: lowercase, no leading zeros.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed).to_lowercase();
    let digits = hex.trim_start_matches('0');
    format!("0x{}", if digits.is_empty() { "0" } else { digits })
}

/// Hex felt encoding of an integer, as used in calldata.
pub fn felt_hex(value: U256) -> String {
    format!("0x{:x}", value)
}

/// Calldata for a Cairo `u256`: `[low, high]` felts.
pub fn u256_calldata(value: U256) -> [String; 2] {
    let high = value >> 128;
    let low = value - (high << 128);
    [felt_hex(low), felt_hex(high)]
}
