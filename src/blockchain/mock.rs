// src/blockchain/mock.rs

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ethers_core::types::U256;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::blockchain::backend::ChainBackend;
use crate::blockchain::models::{ContractCall, ExecutionOutcome, TransactionReceipt};
use crate::blockchain::wallet_provider::WalletProvider;
use crate::config::Config;
use crate::utils::{felt_hex, normalize_address, u256_calldata};

pub const MOCK_WALLET_NAME: &str = "mock-wallet";
pub const MOCK_ACCOUNT: &str = "0x5ca1ab1e0000000000000000000000000000000000000000000000000000c0de";

/// In-memory chain and wallet in one.
///
/// Keeps a token ledger, an issuer registry for the CAT contract and a
/// receipt store. Writes are applied at submission; `wait_for_transaction`
/// resolves after the configured confirmation delay.
#[derive(Debug)]
pub struct MockChainBackend {
    cat_token: String,
    gas_token: String,
    account: String,
    // (token, owner) -> balance. Both keys are normalized addresses.
    balances: DashMap<(String, String), U256>,
    supply: DashMap<String, U256>,
    issuers: DashSet<String>,
    receipts: DashMap<String, TransactionReceipt>,
    block_number: AtomicU64,
    confirmation_delay_ms: AtomicU64,
    hold_confirmations: AtomicBool,
    fail_next_calls: AtomicU32,
    reject_next_execution: AtomicBool,
    stale_issuer_reads: AtomicBool,
    revert_duplicate_registrations: AtomicBool,
    submission_delay_ms: AtomicU64,
    call_count: AtomicUsize,
    execution_count: AtomicUsize,
}

impl MockChainBackend {
    pub fn new(cat_token: &str, gas_token: &str, account: &str) -> Self {
        Self {
            cat_token: normalize_address(cat_token),
            gas_token: normalize_address(gas_token),
            account: account.to_string(),
            balances: DashMap::new(),
            supply: DashMap::new(),
            issuers: DashSet::new(),
            receipts: DashMap::new(),
            block_number: AtomicU64::new(1),
            confirmation_delay_ms: AtomicU64::new(0),
            hold_confirmations: AtomicBool::new(false),
            fail_next_calls: AtomicU32::new(0),
            reject_next_execution: AtomicBool::new(false),
            stale_issuer_reads: AtomicBool::new(false),
            revert_duplicate_registrations: AtomicBool::new(false),
            submission_delay_ms: AtomicU64::new(0),
            call_count: AtomicUsize::new(0),
            execution_count: AtomicUsize::new(0),
        }
    }

    /// Ledger seeded with `mock_balance` whole tokens of both CAT and gas
    /// for the mock account.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mock = Self::new(&config.cat_token_address, &config.gas_token_address, MOCK_ACCOUNT);
        let seed = U256::exp10(config.token_decimals as usize)
            .checked_mul(U256::from(config.mock_balance))
            .ok_or_else(|| anyhow!("MOCK_BALANCE does not fit in a u256 with {} decimals", config.token_decimals))?;
        mock.mint_to(&config.cat_token_address, MOCK_ACCOUNT, seed)?;
        mock.mint_to(&config.gas_token_address, MOCK_ACCOUNT, seed)?;
        Ok(mock)
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Credits `owner` directly, bypassing the issuer check. Fails without
    /// touching the ledger if the total supply would overflow.
    pub fn mint_to(&self, token: &str, owner: &str, amount: U256) -> Result<()> {
        let token = normalize_address(token);
        let mut supply = self.supply.entry(token.clone()).or_default();
        let new_supply = supply
            .checked_add(amount)
            .ok_or_else(|| anyhow!("u256 overflow"))?;
        // Every balance is bounded by the supply, so this credit cannot overflow.
        *self.balances.entry((token, normalize_address(owner))).or_default() += amount;
        *supply = new_supply;
        Ok(())
    }

    pub fn balance(&self, token: &str, owner: &str) -> U256 {
        self.balances
            .get(&(normalize_address(token), normalize_address(owner)))
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn add_issuer(&self, address: &str) {
        self.issuers.insert(normalize_address(address));
    }

    pub fn set_confirmation_delay(&self, delay: Duration) {
        self.confirmation_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// While held, submitted transactions never become final.
    pub fn hold_confirmations(&self, hold: bool) {
        self.hold_confirmations.store(hold, Ordering::SeqCst);
    }

    /// The next `n` read calls fail with a connection error.
    pub fn fail_next_calls(&self, n: u32) {
        self.fail_next_calls.store(n, Ordering::SeqCst);
    }

    /// The next submission is refused as if the user dismissed the wallet prompt.
    pub fn reject_next_execution(&self) {
        self.reject_next_execution.store(true, Ordering::SeqCst);
    }

    /// While set, `is_issuer` reads false even for registered accounts,
    /// as a lagging node would report.
    pub fn stale_issuer_reads(&self, stale: bool) {
        self.stale_issuer_reads.store(stale, Ordering::SeqCst);
    }

    /// While set, registering an existing issuer is accepted and then
    /// reverts on chain instead of failing at submission.
    pub fn revert_duplicate_registrations(&self, revert: bool) {
        self.revert_duplicate_registrations.store(revert, Ordering::SeqCst);
    }

    /// Submissions wait this long before touching the ledger.
    pub fn set_submission_delay(&self, delay: Duration) {
        self.submission_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn execution_count(&self) -> usize {
        self.execution_count.load(Ordering::SeqCst)
    }

    fn known_token(&self, address: &str) -> Result<String> {
        let token = normalize_address(address);
        if token == self.cat_token || token == self.gas_token {
            Ok(token)
        } else {
            Err(anyhow!("Contract not found: {}", address))
        }
    }

    fn apply(&self, sender: &str, call: &ContractCall) -> Result<ExecutionOutcome> {
        let token = self.known_token(&call.contract_address)?;
        let sender = normalize_address(sender);
        match call.entry_point.as_str() {
            "mint" => {
                let (recipient, amount) = recipient_and_amount(&call.calldata)?;
                if token != self.cat_token || !self.issuers.contains(&sender) {
                    return Err(anyhow!("Caller is not an issuer"));
                }
                self.mint_to(&token, &recipient, amount)?;
            }
            "transfer" => {
                let (recipient, amount) = recipient_and_amount(&call.calldata)?;
                {
                    let mut from = self.balances.entry((token.clone(), sender)).or_default();
                    if *from < amount {
                        return Err(anyhow!("Execution reverted: u256_sub Overflow"));
                    }
                    *from -= amount;
                }
                let mut to = self.balances.entry((token, recipient)).or_default();
                *to = to.checked_add(amount).ok_or_else(|| anyhow!("u256 overflow"))?;
            }
            "register_issuer" => {
                let issuer = call
                    .calldata
                    .first()
                    .ok_or_else(|| anyhow!("register_issuer expects an issuer address"))?;
                if token != self.cat_token {
                    return Err(anyhow!("ENTRYPOINT_NOT_FOUND: register_issuer"));
                }
                if !self.issuers.insert(normalize_address(issuer)) {
                    if self.revert_duplicate_registrations.load(Ordering::SeqCst) {
                        return Ok(ExecutionOutcome::Reverted("Issuer already registered".to_string()));
                    }
                    return Err(anyhow!("Issuer already registered"));
                }
            }
            other => return Err(anyhow!("ENTRYPOINT_NOT_FOUND: {}", other)),
        }
        Ok(ExecutionOutcome::Succeeded)
    }

    fn new_tx_hash() -> String {
        let mut bytes: [u8; 32] = rand::thread_rng().gen();
        bytes[0] &= 0x07;
        format!("0x{}", hex::encode(bytes))
    }
}

fn parse_felt(felt: &str) -> Result<U256> {
    match felt.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| anyhow!("invalid felt {:?}: {}", felt, e)),
        None => U256::from_dec_str(felt).map_err(|e| anyhow!("invalid felt {:?}: {:?}", felt, e)),
    }
}

fn recipient_and_amount(calldata: &[String]) -> Result<(String, U256)> {
    match calldata {
        [recipient, low, high] => {
            let (low, high) = (parse_felt(low)?, parse_felt(high)?);
            if low.bits() > 128 || high.bits() > 128 {
                return Err(anyhow!("amount halves must fit in 128 bits"));
            }
            let amount = (high << 128) | low;
            Ok((normalize_address(recipient), amount))
        }
        _ => Err(anyhow!("expected [recipient, amount.low, amount.high], got {} felts", calldata.len())),
    }
}

fn u256_response(value: U256) -> Value {
    json!(u256_calldata(value))
}

#[async_trait]
impl ChainBackend for MockChainBackend {
    async fn call(&self, call: &ContractCall) -> Result<Value> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_next_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("error sending request: connection refused"));
        }

        let token = self.known_token(&call.contract_address)?;
        debug!("Mock call {}::{} {:?}", token, call.entry_point, call.calldata);
        match call.entry_point.as_str() {
            "balance_of" => {
                let owner = call
                    .calldata
                    .first()
                    .ok_or_else(|| anyhow!("balance_of expects an account"))?;
                Ok(u256_response(self.balance(&token, owner)))
            }
            "total_supply" => Ok(u256_response(
                self.supply.get(&token).map(|s| *s).unwrap_or_default(),
            )),
            "is_issuer" => {
                let account = call
                    .calldata
                    .first()
                    .ok_or_else(|| anyhow!("is_issuer expects an account"))?;
                let flag = token == self.cat_token
                    && !self.stale_issuer_reads.load(Ordering::SeqCst)
                    && self.issuers.contains(&normalize_address(account));
                Ok(json!([felt_hex(U256::from(flag as u8))]))
            }
            other => Err(anyhow!("ENTRYPOINT_NOT_FOUND: {}", other)),
        }
    }

    async fn execute(&self, account: &str, call: &ContractCall) -> Result<String> {
        self.execution_count.fetch_add(1, Ordering::SeqCst);
        if self.reject_next_execution.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("User abort"));
        }
        let delay = self.submission_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let execution = self.apply(account, call)?;

        let tx_hash = Self::new_tx_hash();
        let block_number = self.block_number.fetch_add(1, Ordering::SeqCst);
        self.receipts.insert(
            tx_hash.clone(),
            TransactionReceipt {
                transaction_hash: tx_hash.clone(),
                block_number: Some(block_number),
                block_hash: Some(felt_hex(U256::from(block_number) << 8)),
                execution,
            },
        );
        info!("Mock {} accepted as {}", call.entry_point, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let delay = Duration::from_millis(self.confirmation_delay_ms.load(Ordering::SeqCst));
        tokio::time::sleep(delay).await;
        while self.hold_confirmations.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.receipts
            .get(tx_hash)
            .map(|r| r.value().clone())
            .ok_or_else(|| anyhow!("Transaction hash not found: {}", tx_hash))
    }
}

#[async_trait]
impl WalletProvider for MockChainBackend {
    fn name(&self) -> &str {
        MOCK_WALLET_NAME
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        Ok(vec![self.account.clone()])
    }

    async fn add_invoke_transaction(&self, account: &str, calls: &[ContractCall]) -> Result<String> {
        let mut last = None;
        for call in calls {
            last = Some(self.execute(account, call).await?);
        }
        last.ok_or_else(|| anyhow!("wallet_addInvokeTransaction called without calls"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT: &str = "0xca7";
    const GAS: &str = "0x6a5";

    fn transfer(to: &str, amount: u64) -> ContractCall {
        let [low, high] = u256_calldata(U256::from(amount));
        ContractCall::new(CAT, "transfer", vec![to.to_string(), low, high])
    }

    #[tokio::test]
    async fn transfer_moves_balance() {
        let mock = MockChainBackend::new(CAT, GAS, MOCK_ACCOUNT);
        mock.mint_to(CAT, MOCK_ACCOUNT, U256::from(100u64)).unwrap();

        let hash = mock.execute(MOCK_ACCOUNT, &transfer("0xb0b", 40)).await.unwrap();
        assert_eq!(mock.balance(CAT, MOCK_ACCOUNT), U256::from(60u64));
        assert_eq!(mock.balance(CAT, "0x0B0B"), U256::from(40u64));

        let receipt = mock.wait_for_transaction(&hash).await.unwrap();
        assert_eq!(receipt.execution, ExecutionOutcome::Succeeded);
    }

    #[tokio::test]
    async fn overdraft_is_rejected() {
        let mock = MockChainBackend::new(CAT, GAS, MOCK_ACCOUNT);
        let err = mock.execute(MOCK_ACCOUNT, &transfer("0xb0b", 1)).await.unwrap_err();
        assert!(err.to_string().contains("u256_sub Overflow"));
    }

    #[tokio::test]
    async fn mint_requires_issuer() {
        let mock = MockChainBackend::new(CAT, GAS, MOCK_ACCOUNT);
        let [low, high] = u256_calldata(U256::from(5u64));
        let mint = ContractCall::new(CAT, "mint", vec!["0xb0b".into(), low, high]);

        let err = mock.execute(MOCK_ACCOUNT, &mint).await.unwrap_err();
        assert!(err.to_string().contains("not an issuer"));

        mock.add_issuer(MOCK_ACCOUNT);
        mock.execute(MOCK_ACCOUNT, &mint).await.unwrap();
        let supply = mock
            .call(&ContractCall::new(CAT, "total_supply", vec![]))
            .await
            .unwrap();
        assert_eq!(supply, json!(["0x5", "0x0"]));
    }

    #[tokio::test]
    async fn minting_past_u256_max_is_an_error() {
        let mock = MockChainBackend::new(CAT, GAS, MOCK_ACCOUNT);
        mock.add_issuer(MOCK_ACCOUNT);
        mock.mint_to(CAT, MOCK_ACCOUNT, U256::MAX - 1).unwrap();
        assert!(mock.mint_to(CAT, "0xb0b", U256::from(2u8)).is_err());

        let [low, high] = u256_calldata(U256::from(2u8));
        let mint = ContractCall::new(CAT, "mint", vec!["0xb0b".into(), low, high]);
        let err = mock.execute(MOCK_ACCOUNT, &mint).await.unwrap_err();
        assert!(err.to_string().contains("u256 overflow"));
        assert_eq!(mock.balance(CAT, "0xb0b"), U256::zero());
        assert_eq!(mock.balance(CAT, MOCK_ACCOUNT), U256::MAX - 1);
    }

    #[tokio::test]
    async fn duplicate_registration_can_revert_on_chain() {
        let mock = MockChainBackend::new(CAT, GAS, MOCK_ACCOUNT);
        mock.add_issuer(MOCK_ACCOUNT);
        let register = ContractCall::new(CAT, "register_issuer", vec![MOCK_ACCOUNT.to_string()]);
        let err = mock.execute(MOCK_ACCOUNT, &register).await.unwrap_err();
        assert!(err.to_string().contains("already registered"));

        mock.revert_duplicate_registrations(true);
        let hash = mock.execute(MOCK_ACCOUNT, &register).await.unwrap();
        let receipt = mock.wait_for_transaction(&hash).await.unwrap();
        assert_eq!(
            receipt.execution,
            ExecutionOutcome::Reverted("Issuer already registered".to_string())
        );
    }

    #[tokio::test]
    async fn injected_call_failures_are_consumed() {
        let mock = MockChainBackend::new(CAT, GAS, MOCK_ACCOUNT);
        mock.fail_next_calls(1);
        let call = ContractCall::new(CAT, "is_issuer", vec![MOCK_ACCOUNT.to_string()]);
        assert!(mock.call(&call).await.is_err());
        assert_eq!(mock.call(&call).await.unwrap(), json!(["0x0"]));
        assert_eq!(mock.call_count(), 2);
    }
}
