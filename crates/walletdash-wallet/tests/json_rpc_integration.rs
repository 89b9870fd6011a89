//! Integration tests for `JsonRpcWalletProvider` against an in-process
//! JSON-RPC wallet bridge.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use walletdash_core::Address;
use walletdash_wallet::{JsonRpcWalletProvider, ProviderError, ProviderEvent, WalletProvider};

const WALLET: &str = "0x742d35cc6634c0532925a3b844bc454e4438f44e";

#[derive(Clone, Default)]
struct Bridge {
    reject_authorization: Arc<Mutex<Option<(i64, String)>>>,
    accounts: Arc<Mutex<Vec<String>>>,
    chain_id: Arc<Mutex<String>>,
    methods: Arc<Mutex<Vec<String>>>,
}

async fn rpc(State(bridge): State<Bridge>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    bridge.methods.lock().push(method.clone());

    let result = match method.as_str() {
        "eth_requestAccounts" => {
            if let Some((code, message)) = bridge.reject_authorization.lock().clone() {
                return Json(json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": {"code": code, "message": message}
                }));
            }
            *bridge.accounts.lock() = vec![WALLET.to_uppercase().replace("0X", "0x")];
            json!(bridge.accounts.lock().clone())
        }
        "eth_accounts" => json!(bridge.accounts.lock().clone()),
        "eth_getBalance" => json!("0x6f05b59d3b20000"),
        "eth_chainId" => json!(bridge.chain_id.lock().clone()),
        "wallet_revokePermissions" => Value::Null,
        _ => {
            return Json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }))
        }
    };
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn spawn_bridge() -> (String, Bridge) {
    let bridge = Bridge::default();
    *bridge.chain_id.lock() = "0x1".to_string();
    let app = Router::new()
        .route("/", post(rpc))
        .with_state(bridge.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), bridge)
}

#[tokio::test]
async fn test_authorization_balance_and_chain() {
    let (url, bridge) = spawn_bridge().await;
    let provider = JsonRpcWalletProvider::new(url, Duration::from_secs(1)).unwrap();

    assert!(provider.accounts().await.unwrap().is_empty());

    let accounts = provider.request_accounts().await.unwrap();
    let wallet = Address::parse(WALLET).unwrap();
    assert_eq!(accounts, vec![wallet.clone()]);

    assert_eq!(provider.balance(wallet).await.unwrap(), dec!(0.5));
    assert_eq!(provider.chain_id().await.unwrap(), 1);
    provider.revoke_permissions().await.unwrap();

    assert_eq!(
        bridge.methods.lock().as_slice(),
        [
            "eth_accounts",
            "eth_requestAccounts",
            "eth_getBalance",
            "eth_chainId",
            "wallet_revokePermissions"
        ]
    );
}

#[tokio::test]
async fn test_rpc_error_codes_are_classified() {
    let (url, bridge) = spawn_bridge().await;
    let provider = JsonRpcWalletProvider::new(url, Duration::from_secs(1)).unwrap();

    *bridge.reject_authorization.lock() = Some((4001, "User rejected the request.".into()));
    assert_eq!(
        provider.request_accounts().await,
        Err(ProviderError::UserRejected)
    );

    *bridge.reject_authorization.lock() =
        Some((-32002, "Already processing eth_requestAccounts".into()));
    assert!(matches!(
        provider.request_accounts().await,
        Err(ProviderError::RequestAlreadyPending(_))
    ));
}

#[tokio::test]
async fn test_unreachable_bridge_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider =
        JsonRpcWalletProvider::new(format!("http://{addr}/"), Duration::from_secs(1)).unwrap();
    assert!(matches!(
        provider.chain_id().await,
        Err(ProviderError::Transport(_))
    ));
}

#[tokio::test]
async fn test_subscription_reports_chain_switch() {
    let (url, bridge) = spawn_bridge().await;
    let provider = JsonRpcWalletProvider::new(url, Duration::from_millis(20)).unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _subscription = provider.subscribe(tx);
    tokio::time::sleep(Duration::from_millis(100)).await;

    *bridge.chain_id.lock() = "0xaa36a7".to_string();
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ProviderEvent::ChainChanged(11155111));
}
