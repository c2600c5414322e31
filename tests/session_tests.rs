//! Wallet session scenarios on the in-memory chain backend

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use scf_token_server::blockchain::{
    backend::ChainSource,
    mock::MockChainBackend,
    models::{ContractCall, SessionError, TokenError, TxStatus},
    session::{SessionSettings, WalletSession},
    wallet_provider::{WalletProvider, WalletRegistry},
};
use scf_token_server::config::Config;

fn test_config() -> Config {
    Config {
        retry_base_delay: Duration::from_millis(1),
        balance_refresh_delay: Duration::from_millis(10),
        ..Config::default()
    }
}

fn mock_of(session: &WalletSession) -> Arc<MockChainBackend> {
    session.chain().mock().cloned().expect("mock chain backend")
}

/// Wallet that always answers with one fixed account, or refuses.
struct StaticWallet {
    name: &'static str,
    account: Option<&'static str>,
}

#[async_trait]
impl WalletProvider for StaticWallet {
    fn name(&self) -> &str {
        self.name
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        match self.account {
            Some(account) => Ok(vec![account.to_string()]),
            None => Err(anyhow!("User rejected the request")),
        }
    }

    async fn add_invoke_transaction(&self, _account: &str, _calls: &[ContractCall]) -> Result<String> {
        Err(anyhow!("not used"))
    }
}

fn multi_wallet_session() -> WalletSession {
    let config = test_config();
    let registry = WalletRegistry::new(vec![
        Arc::new(StaticWallet {
            name: "argent",
            account: Some("0xa11ce"),
        }),
        Arc::new(StaticWallet {
            name: "braavos",
            account: None,
        }),
    ]);
    WalletSession::new(
        registry,
        ChainSource::from_config(&config).unwrap(),
        SessionSettings::from_config(&config),
    )
}

#[tokio::test]
async fn transfer_above_cached_balance_makes_no_network_calls() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let mock = mock_of(&session);
    let calls_before = mock.call_count();

    let err = session.transfer_tokens("0xb0b", "1000.000000000000000001").await.unwrap_err();
    assert_eq!(err, SessionError::Token(TokenError::InsufficientBalance));
    assert_eq!(mock.call_count(), calls_before);
    assert_eq!(mock.execution_count(), 0);
}

#[tokio::test]
async fn status_moves_forward_only() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let mock = mock_of(&session);
    mock.set_confirmation_delay(Duration::from_millis(50));

    let submitted = session.transfer_tokens("0xb0b", "1").await.unwrap();
    assert_eq!(submitted.status, TxStatus::Pending);

    let tracked = session.tracked(&submitted.transaction_hash).unwrap();
    let settled = tracked.wait_final().await;
    assert_eq!(settled.status, TxStatus::Confirmed);
    assert!(settled.block_hash.is_some());

    // Later observations never show anything but the settled result
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.transaction(&submitted.transaction_hash), Some(settled));
}

#[tokio::test]
async fn concurrent_operations_are_tracked_separately() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();

    let (a, b) = tokio::join!(
        session.transfer_tokens("0xb0b", "1"),
        session.transfer_tokens("0xca1", "2")
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.transaction_hash, b.transaction_hash);
    assert_ne!(a.operation_id, b.operation_id);

    let a = session.wait_for_transaction(&a.transaction_hash).await.unwrap();
    let b = session.wait_for_transaction(&b.transaction_hash).await.unwrap();
    assert_eq!(a.status, TxStatus::Confirmed);
    assert_eq!(b.status, TxStatus::Confirmed);
}

#[tokio::test]
async fn disconnect_cancels_in_flight_monitors() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let mock = mock_of(&session);
    // Registration must not wait on the held receipts below
    mock.add_issuer(mock.account());
    mock.hold_confirmations(true);

    let submitted = tokio::time::timeout(Duration::from_secs(2), session.issue_tokens("0xb0b", "10"))
        .await
        .expect("submission should not wait for confirmation")
        .unwrap();
    let tracked = session.tracked(&submitted.transaction_hash).unwrap();

    let state = session.disconnect().await;
    assert!(!state.is_connected);
    assert!(session.transaction(&submitted.transaction_hash).is_none());

    let result = tokio::time::timeout(Duration::from_secs(2), tracked.wait_final())
        .await
        .expect("monitor should stop after disconnect");
    assert_eq!(result.status, TxStatus::Pending);
    assert_eq!(result.step.as_deref(), Some("monitor_cancelled"));
}

#[tokio::test]
async fn submission_finishing_after_disconnect_is_not_tracked() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let mock = mock_of(&session);
    mock.set_submission_delay(Duration::from_millis(100));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.transfer_tokens("0xb0b", "1").await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    session.disconnect().await;

    let submitted = pending.await.unwrap().unwrap();
    assert!(session.transaction(&submitted.transaction_hash).is_none());
    assert!(session.tracked(&submitted.transaction_hash).is_none());
}

#[tokio::test]
async fn issuing_past_u256_max_is_an_error_not_a_panic() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let huge = format!("1{}", "0".repeat(59));

    let first = session.issue_tokens("0xb0b", &huge).await.unwrap();
    assert_eq!(first.status, TxStatus::Pending);

    let second = tokio::spawn({
        let session = session.clone();
        async move { session.issue_tokens("0xb0b", &huge).await }
    })
    .await
    .expect("issuing must not panic");
    assert!(second.is_err());
}

#[tokio::test]
async fn failed_balance_reads_are_retried() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let mock = mock_of(&session);

    mock.fail_next_calls(2);
    let state = session.refresh_balances().await.unwrap();
    assert!(state.cat_balance.is_real_data);
}

#[tokio::test]
async fn persistent_network_failure_is_surfaced() {
    let session = WalletSession::from_config(&test_config()).unwrap();
    session.connect(None).await.unwrap();
    let mock = mock_of(&session);

    mock.fail_next_calls(10);
    let err = session.refresh_balances().await.unwrap_err();
    assert_eq!(err, SessionError::Token(TokenError::Network));
}

#[tokio::test]
async fn several_wallets_require_selection() {
    let session = multi_wallet_session();
    let err = session.connect(None).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::SelectionRequired(vec!["argent".to_string(), "braavos".to_string()])
    );

    let state = session.connect(Some("argent")).await.unwrap();
    assert_eq!(state.account.as_deref(), Some("0xa11ce"));
    assert_eq!(state.wallet_name.as_deref(), Some("argent"));
    assert_eq!(state.cat_balance.formatted, "0");
}

#[tokio::test]
async fn refused_account_access_is_reported() {
    let session = multi_wallet_session();
    let err = session.connect(Some("braavos")).await.unwrap_err();
    assert_eq!(err, SessionError::Token(TokenError::UserRejected));
    assert!(!session.state().await.is_connected);
}
