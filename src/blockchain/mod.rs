// src/blockchain/mod.rs

pub mod backend;
pub mod client;
pub mod mock;
pub mod models;
pub mod monitor;
pub mod services;
pub mod session;
pub mod wallet_provider;

// Re-export commonly used types
pub use backend::{ChainBackend, ChainSource};
pub use client::StarknetClient;
pub use ethers_core::types::U256;
pub use session::WalletSession;
