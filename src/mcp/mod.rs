// MCP (JSON-RPC over stdio) surface for the wallet session
pub mod handler;
pub mod protocol;
