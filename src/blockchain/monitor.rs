//! Background finality tracking for submitted transactions.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::blockchain::backend::ChainBackend;
use crate::blockchain::models::{ExecutionOutcome, TokenMintResult};

/// Handle on a submitted transaction. Every clone observes the same result.
#[derive(Clone, Debug)]
pub struct TrackedTransaction {
    receiver: watch::Receiver<TokenMintResult>,
    cancel: CancellationToken,
}

impl TrackedTransaction {
    /// Latest published result
    pub fn current(&self) -> TokenMintResult {
        self.receiver.borrow().clone()
    }

    pub fn transaction_hash(&self) -> String {
        self.receiver.borrow().transaction_hash.clone()
    }

    /// Stops monitoring. The result stays `pending`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the result is final or the monitor has gone away, and
    /// returns whatever was last published.
    pub async fn wait_final(&self) -> TokenMintResult {
        let mut receiver = self.receiver.clone();
        loop {
            if receiver.borrow_and_update().status.is_final() {
                break;
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
        let result = receiver.borrow().clone();
        result
    }
}

/// Spawns a task awaiting finality of `initial.transaction_hash`.
///
/// The wait itself is unbounded; `cancel` is the only way to stop it early.
/// Monitoring errors mark the result failed and are not retried.
pub fn spawn_monitor(
    backend: Arc<dyn ChainBackend>,
    initial: TokenMintResult,
    cancel: CancellationToken,
) -> TrackedTransaction {
    let tx_hash = initial.transaction_hash.clone();
    let (sender, receiver) = watch::channel(initial);
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        sender.send_if_modified(|r| r.mark_step("awaiting_confirmation"));
        tokio::select! {
            _ = task_cancel.cancelled() => {
                warn!("Stopped monitoring transaction {}", tx_hash);
                sender.send_if_modified(|r| r.mark_step("monitor_cancelled"));
            }
            outcome = backend.wait_for_transaction(&tx_hash) => match outcome {
                Ok(receipt) => {
                    match &receipt.execution {
                        ExecutionOutcome::Succeeded => {
                            info!("Transaction {} confirmed in block {:?}", tx_hash, receipt.block_number)
                        }
                        ExecutionOutcome::Reverted(reason) => {
                            error!("Transaction {} reverted: {}", tx_hash, reason)
                        }
                    }
                    sender.send_if_modified(|r| r.settle(&receipt));
                }
                Err(e) => {
                    error!("Monitoring transaction {} failed: {:#}", tx_hash, e);
                    sender.send_if_modified(|r| r.fail(format!("{:#}", e)));
                }
            }
        }
    });

    TrackedTransaction { receiver, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::{MockChainBackend, MOCK_ACCOUNT};
    use crate::blockchain::models::{ContractCall, OperationKind, TxStatus};
    use crate::utils::u256_calldata;
    use ethers_core::types::U256;
    use std::time::Duration;

    async fn submitted(mock: &MockChainBackend) -> String {
        mock.mint_to("0xca7", MOCK_ACCOUNT, U256::from(10u8)).unwrap();
        let [low, high] = u256_calldata(U256::from(1u8));
        mock.execute(MOCK_ACCOUNT, &ContractCall::new("0xca7", "transfer", vec!["0xb0b".into(), low, high]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn publishes_confirmation() {
        let mock = Arc::new(MockChainBackend::new("0xca7", "0x6a5", MOCK_ACCOUNT));
        let hash = submitted(&mock).await;
        let tracked = spawn_monitor(
            mock.clone(),
            TokenMintResult::pending(OperationKind::Transfer, hash),
            CancellationToken::new(),
        );
        let result = tracked.wait_final().await;
        assert_eq!(result.status, TxStatus::Confirmed);
        assert!(result.block_number.is_some());
    }

    #[tokio::test]
    async fn cancellation_leaves_result_pending() {
        let mock = Arc::new(MockChainBackend::new("0xca7", "0x6a5", MOCK_ACCOUNT));
        mock.hold_confirmations(true);
        let hash = submitted(&mock).await;
        let tracked = spawn_monitor(
            mock.clone(),
            TokenMintResult::pending(OperationKind::Transfer, hash),
            CancellationToken::new(),
        );
        tracked.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), tracked.wait_final())
            .await
            .unwrap();
        assert_eq!(result.status, TxStatus::Pending);
        assert_eq!(result.step.as_deref(), Some("monitor_cancelled"));
    }

    #[tokio::test]
    async fn unknown_hash_fails_result() {
        let mock = Arc::new(MockChainBackend::new("0xca7", "0x6a5", MOCK_ACCOUNT));
        let tracked = spawn_monitor(
            mock,
            TokenMintResult::pending(OperationKind::Mint, "0xdead".to_string()),
            CancellationToken::new(),
        );
        let result = tracked.wait_final().await;
        assert_eq!(result.status, TxStatus::Failed);
        assert_eq!(result.step.as_deref(), Some("monitor_failed"));
    }
}
