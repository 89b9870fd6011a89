//! EIP-1193 wallet provider over JSON-RPC HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use walletdash_core::{Address, BoxFuture};

use crate::error::{ProviderError, ProviderResult};
use crate::poller::spawn_poller;
use crate::provider::{ProviderEvent, SubscriptionHandle, WalletProvider};

/// Default timeout for non-interactive RPC calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wei per ether, as a decimal scale.
const ETHER_DECIMALS: u32 = 18;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug)]
struct RpcTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcTransport {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ProviderResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        trace!(method, id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method}: {e}")))?;

        // Wallet bridges often send JSON-RPC errors with a non-2xx status,
        // so try the envelope before giving up on the status.
        let envelope: RpcResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Transport(format!("{method}: HTTP {status}")))
            }
            Err(e) => return Err(ProviderError::InvalidResponse(format!("{method}: {e}"))),
        };

        if let Some(error) = envelope.error {
            debug!(method, code = error.code, message = %error.message, "JSON-RPC error");
            return Err(ProviderError::from_rpc(error.code, error.message));
        }

        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(format!("{method}: {e}")))
    }
}

/// Parse an EIP-1474 hex quantity (`0x1a`).
fn parse_quantity(raw: &str) -> ProviderResult<u128> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::InvalidResponse(format!("not a hex quantity: {raw}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("{raw}: {e}")))
}

/// Convert a wei amount to ether.
pub fn wei_to_ether(wei: u128) -> ProviderResult<Decimal> {
    let wei = i128::try_from(wei)
        .map_err(|_| ProviderError::InvalidResponse(format!("balance out of range: {wei}")))?;
    Decimal::try_from_i128_with_scale(wei, ETHER_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|e| ProviderError::InvalidResponse(format!("balance out of range: {e}")))
}

fn parse_accounts(raw: Vec<String>) -> ProviderResult<Vec<Address>> {
    raw.iter()
        .map(|a| Address::parse(a).map_err(|e| ProviderError::InvalidResponse(e.to_string())))
        .collect()
}

/// Wallet provider speaking EIP-1193 methods to a JSON-RPC endpoint.
///
/// The endpoint is expected to be a wallet bridge that owns the keys and
/// user prompts; this side only issues requests. Push events are
/// synthesized by polling `eth_accounts` and `eth_chainId`.
#[derive(Debug, Clone)]
pub struct JsonRpcWalletProvider {
    transport: Arc<RpcTransport>,
    poll_interval: Duration,
}

impl JsonRpcWalletProvider {
    /// Create a new provider.
    ///
    /// `eth_requestAccounts` is not covered by the client timeout: it waits
    /// on a human, and callers bound it themselves.
    pub fn new(url: impl Into<String>, poll_interval: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            transport: Arc::new(RpcTransport {
                client,
                url: url.into(),
                next_id: AtomicU64::new(1),
            }),
            poll_interval,
        })
    }

    pub fn url(&self) -> &str {
        &self.transport.url
    }
}

impl WalletProvider for JsonRpcWalletProvider {
    fn request_accounts(&self) -> BoxFuture<'_, ProviderResult<Vec<Address>>> {
        Box::pin(async move {
            let raw: Vec<String> = self
                .transport
                .call("eth_requestAccounts", json!([]))
                .await?;
            parse_accounts(raw)
        })
    }

    fn accounts(&self) -> BoxFuture<'_, ProviderResult<Vec<Address>>> {
        Box::pin(async move {
            let raw: Vec<String> = tokio::time::timeout(
                DEFAULT_TIMEOUT,
                self.transport.call("eth_accounts", json!([])),
            )
            .await
            .map_err(|_| ProviderError::Transport("eth_accounts: timed out".to_string()))??;
            parse_accounts(raw)
        })
    }

    fn balance(&self, address: Address) -> BoxFuture<'_, ProviderResult<Decimal>> {
        Box::pin(async move {
            let raw: String = tokio::time::timeout(
                DEFAULT_TIMEOUT,
                self.transport
                    .call("eth_getBalance", json!([address.as_str(), "latest"])),
            )
            .await
            .map_err(|_| ProviderError::Transport("eth_getBalance: timed out".to_string()))??;
            wei_to_ether(parse_quantity(&raw)?)
        })
    }

    fn chain_id(&self) -> BoxFuture<'_, ProviderResult<u64>> {
        Box::pin(async move {
            let raw: String = tokio::time::timeout(
                DEFAULT_TIMEOUT,
                self.transport.call("eth_chainId", json!([])),
            )
            .await
            .map_err(|_| ProviderError::Transport("eth_chainId: timed out".to_string()))??;
            u64::try_from(parse_quantity(&raw)?)
                .map_err(|_| ProviderError::InvalidResponse(format!("chain id out of range: {raw}")))
        })
    }

    fn revoke_permissions(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            let _: Value = tokio::time::timeout(
                DEFAULT_TIMEOUT,
                self.transport
                    .call("wallet_revokePermissions", json!([{"eth_accounts": {}}])),
            )
            .await
            .map_err(|_| {
                ProviderError::Transport("wallet_revokePermissions: timed out".to_string())
            })??;
            Ok(())
        })
    }

    fn subscribe(&self, sink: mpsc::Sender<ProviderEvent>) -> SubscriptionHandle {
        spawn_poller(Arc::new(self.clone()), self.poll_interval, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x1").unwrap(), 1);
        assert_eq!(parse_quantity("0xaa36a7").unwrap(), 11155111);
        assert!(parse_quantity("12").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_wei_to_ether() {
        assert_eq!(wei_to_ether(500_000_000_000_000_000).unwrap(), dec!(0.5));
        assert_eq!(wei_to_ether(1).unwrap(), dec!(0.000000000000000001));
        assert_eq!(wei_to_ether(0).unwrap(), Decimal::ZERO);
        assert!(wei_to_ether(u128::MAX).is_err());
    }

    #[test]
    fn test_parse_accounts_normalizes() {
        let accounts =
            parse_accounts(vec!["0x742D35CC6634C0532925A3B844BC454E4438F44E".to_string()])
                .unwrap();
        assert_eq!(
            accounts[0].as_str(),
            "0x742d35cc6634c0532925a3b844bc454e4438f44e"
        );
        assert!(parse_accounts(vec!["nope".to_string()]).is_err());
    }
}
