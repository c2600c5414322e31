// src/config.rs

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// STRK fee token, deployed at the same address on mainnet and Sepolia.
pub const STRK_TOKEN_ADDRESS: &str = "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// Accepts the usual aliases for the two supported networks.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_lowercase().as_str() {
            "mainnet" | "main" | "production" => Ok(Network::Mainnet),
            "testnet" | "test" | "sepolia" | "development" => Ok(Network::Testnet),
            other => Err(anyhow!("Unknown CHAIN_NETWORK '{}': expected 'mainnet' or 'testnet'", other)),
        }
    }

    fn default_rpc_urls(&self) -> Vec<String> {
        let urls: &[&str] = match self {
            Network::Mainnet => &[
                "https://starknet-mainnet.public.blastapi.io/rpc/v0_7",
                "https://free-rpc.nethermind.io/mainnet-juno",
            ],
            Network::Testnet => &[
                "https://starknet-sepolia.public.blastapi.io/rpc/v0_7",
                "https://free-rpc.nethermind.io/sepolia-juno",
            ],
        };
        urls.iter().map(|u| u.to_string()).collect()
    }
}

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    /// Which network the session talks to. Contract addresses and the RPC
    /// endpoint list are resolved from it.
    pub network: Network,
    /// Ordered RPC endpoints for the selected network; the first live one wins.
    pub rpc_urls: Vec<String>,
    pub cat_token_address: String,
    pub gas_token_address: String,
    pub token_decimals: u32,

    /// Detected wallet providers: name -> wallet bridge URL.
    pub wallet_providers: BTreeMap<String, String>,

    /// Run against the in-memory chain instead of RPC + wallet bridge.
    pub use_mock_chain_backend: bool,
    /// Whole-token balance seeded into the mock ledger and shown as the
    /// fallback value while disconnected in mock mode.
    pub mock_balance: u64,

    // Chain call settings
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub balance_refresh_delay: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            network: Network::Testnet,
            rpc_urls: Network::Testnet.default_rpc_urls(),
            cat_token_address: "0xca7".to_string(),
            gas_token_address: STRK_TOKEN_ADDRESS.to_string(),
            token_decimals: 18,
            wallet_providers: BTreeMap::new(),
            use_mock_chain_backend: true,
            mock_balance: 1000,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            balance_refresh_delay: Duration::from_secs(5),
            receipt_poll_interval: Duration::from_millis(3000),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .with_context(|| format!("{} must be a valid number", key))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let network = Network::parse(&env::var("CHAIN_NETWORK").unwrap_or_else(|_| "testnet".to_string()))?;

        // STARKNET_RPC_URLS is a JSON map of network -> ordered URL list
        let rpc_urls = match env::var("STARKNET_RPC_URLS") {
            Ok(raw) => {
                let mut by_network: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
                    .context("Invalid STARKNET_RPC_URLS JSON format: expected {\"mainnet\": [...], \"testnet\": [...]}")?;
                by_network.remove(network.as_str()).unwrap_or_else(|| network.default_rpc_urls())
            }
            Err(_) => network.default_rpc_urls(),
        };

        let use_mock_chain_backend = parse_env::<bool>("USE_MOCK_CHAIN_BACKEND", "false")
            .context("USE_MOCK_CHAIN_BACKEND must be 'true' or 'false'")?;

        let cat_key = match network {
            Network::Mainnet => "CAT_TOKEN_ADDRESS_MAINNET",
            Network::Testnet => "CAT_TOKEN_ADDRESS_TESTNET",
        };
        let cat_token_address = match env::var(cat_key) {
            Ok(addr) => addr,
            Err(_) if use_mock_chain_backend => "0xca7".to_string(),
            Err(_) => return Err(anyhow!("{} must be set unless USE_MOCK_CHAIN_BACKEND=true", cat_key)),
        };

        let wallet_providers: BTreeMap<String, String> = match env::var("WALLET_PROVIDERS") {
            Ok(raw) => serde_json::from_str(&raw).context("Invalid WALLET_PROVIDERS JSON format: expected a map of name -> URL")?,
            Err(_) => BTreeMap::new(),
        };

        Ok(Config {
            port: parse_env("PORT", "8080")?,
            network,
            rpc_urls,
            cat_token_address,
            gas_token_address: env::var("GAS_TOKEN_ADDRESS").unwrap_or_else(|_| STRK_TOKEN_ADDRESS.to_string()),
            token_decimals: parse_env("TOKEN_DECIMALS", "18")?,
            wallet_providers,
            use_mock_chain_backend,
            mock_balance: parse_env("MOCK_BALANCE", "1000")?,
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", "3")?,
            retry_base_delay: Duration::from_millis(parse_env("RETRY_BASE_DELAY_MS", "1000")?),
            balance_refresh_delay: Duration::from_secs(parse_env("BALANCE_REFRESH_DELAY_SECS", "5")?),
            receipt_poll_interval: Duration::from_millis(parse_env("RECEIPT_POLL_INTERVAL_MS", "3000")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_aliases() {
        assert_eq!(Network::parse("Sepolia").unwrap(), Network::Testnet);
        assert_eq!(Network::parse(" production ").unwrap(), Network::Mainnet);
        assert!(Network::parse("goerli").is_err());
    }

    #[test]
    fn default_config_uses_mock_backend() {
        let config = Config::default();
        assert!(config.use_mock_chain_backend);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.balance_refresh_delay, Duration::from_secs(5));
        assert!(!config.rpc_urls.is_empty());
    }
}
