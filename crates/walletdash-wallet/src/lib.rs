//! Wallet provider capability.
//!
//! The connection manager talks to the wallet only through [`WalletProvider`]:
//! - [`JsonRpcWalletProvider`]: EIP-1193 methods over JSON-RPC HTTP, with
//!   push events synthesized by [`poller`]
//! - [`MockWalletProvider`]: scripted provider for tests and dry runs

pub mod error;
pub mod mock;
pub mod poller;
pub mod provider;
pub mod rpc;

pub use error::{ProviderError, ProviderResult};
pub use mock::MockWalletProvider;
pub use poller::{spawn_poller, PollState};
pub use provider::{DynWalletProvider, ProviderEvent, SubscriptionHandle, WalletProvider};
pub use rpc::{wei_to_ether, JsonRpcWalletProvider};
