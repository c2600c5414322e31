// src/lib.rs

// Re-export modules
pub mod api;
pub mod blockchain;
pub mod config;
pub mod mcp;
pub mod utils;

use anyhow::Result;

use blockchain::session::WalletSession;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// The wallet session; the only holder of connection state
    pub session: WalletSession,
}

impl AppState {
    pub fn from_config(config: config::Config) -> Result<Self> {
        let session = WalletSession::from_config(&config)?;
        Ok(Self { config, session })
    }
}
