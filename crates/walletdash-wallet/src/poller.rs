//! Push events synthesized from polling.
//!
//! The first successful observation of each value is the baseline and emits
//! nothing; later observations emit only when the value differs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walletdash_core::Address;

use crate::provider::{ProviderEvent, SubscriptionHandle, WalletProvider};

/// Last observed provider values.
#[derive(Debug, Default, Clone)]
pub struct PollState {
    accounts: Option<Vec<Address>>,
    chain_id: Option<u64>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an `eth_accounts` result; returns the event to emit, if any.
    pub fn observe_accounts(&mut self, accounts: Vec<Address>) -> Option<ProviderEvent> {
        let changed = matches!(&self.accounts, Some(prev) if *prev != accounts);
        self.accounts = Some(accounts.clone());
        changed.then_some(ProviderEvent::AccountsChanged(accounts))
    }

    /// Record an `eth_chainId` result; returns the event to emit, if any.
    pub fn observe_chain(&mut self, chain_id: u64) -> Option<ProviderEvent> {
        let changed = matches!(self.chain_id, Some(prev) if prev != chain_id);
        self.chain_id = Some(chain_id);
        changed.then_some(ProviderEvent::ChainChanged(chain_id))
    }
}

/// Poll `provider` every `interval` and push changes into `sink`.
///
/// The task ends when the handle is dropped or the sink closes.
pub fn spawn_poller(
    provider: Arc<dyn WalletProvider>,
    interval: Duration,
    sink: mpsc::Sender<ProviderEvent>,
) -> SubscriptionHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = PollState::new();
        info!(interval_ms = interval.as_millis() as u64, "Wallet event poller started");

        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut events = Vec::with_capacity(2);
            match provider.accounts().await {
                Ok(accounts) => events.extend(state.observe_accounts(accounts)),
                Err(e) => debug!(error = %e, "eth_accounts poll failed"),
            }
            match provider.chain_id().await {
                Ok(chain_id) => events.extend(state.observe_chain(chain_id)),
                Err(e) => debug!(error = %e, "eth_chainId poll failed"),
            }

            for event in events {
                debug!(kind = event.kind(), "Provider change detected");
                if sink.send(event).await.is_err() {
                    task_token.cancel();
                    break;
                }
            }
            if task_token.is_cancelled() {
                break;
            }
        }
        info!("Wallet event poller stopped");
    });

    SubscriptionHandle::new(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWalletProvider;

    fn addr(n: u64) -> Address {
        Address::parse(&format!("0x{n:040x}")).unwrap()
    }

    #[test]
    fn test_first_observation_is_baseline() {
        let mut state = PollState::new();
        assert_eq!(state.observe_accounts(vec![addr(1)]), None);
        assert_eq!(state.observe_chain(1), None);

        assert_eq!(state.observe_accounts(vec![addr(1)]), None);
        assert_eq!(
            state.observe_accounts(vec![addr(2)]),
            Some(ProviderEvent::AccountsChanged(vec![addr(2)]))
        );
        assert_eq!(
            state.observe_accounts(vec![]),
            Some(ProviderEvent::AccountsChanged(vec![]))
        );
        assert_eq!(state.observe_chain(1), None);
        assert_eq!(state.observe_chain(5), Some(ProviderEvent::ChainChanged(5)));
    }

    #[tokio::test]
    async fn test_poller_pushes_changes() {
        let provider = Arc::new(MockWalletProvider::new());
        provider.set_accounts(vec![addr(1)]);
        provider.set_chain_id(1);

        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_poller(provider.clone(), Duration::from_millis(10), tx);

        // Let the baseline poll happen.
        tokio::time::sleep(Duration::from_millis(30)).await;
        provider.set_accounts(vec![addr(2)]);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ProviderEvent::AccountsChanged(vec![addr(2)]));

        provider.set_chain_id(137);
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ProviderEvent::ChainChanged(137));

        drop(handle);
        // Poller exits and drops its sender.
        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }
}
