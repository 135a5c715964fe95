// offchain/src/lib.rs
//! Client for the flew binary prediction market program: address
//! derivation, account decoding, read queries and the signed-transaction
//! recipes for every state-changing instruction.

pub mod config;
pub mod delegate;
pub mod error;
pub mod format;
pub mod instructions;
pub mod keypair;
pub mod ledger;
pub mod orchestrator;
pub mod pda;
pub mod privy;
pub mod protocol;
pub mod reader;
pub mod submit;
pub mod types;
pub mod wallet_store;

pub use config::BridgeConfig;
pub use delegate::{DelegateError, RecoveryDescriptor, SigningDelegate, WalletHandle};
pub use error::{AccountKind, BridgeError, DecodeError, Rejection, Result};
pub use keypair::KeypairDirDelegate;
pub use ledger::{AccountFilter, Ledger, RpcLedger};
pub use orchestrator::{CreatedMarket, InitializeOutcome, MarketOrchestrator};
pub use pda::{AddressDeriver, MarketAddresses};
pub use privy::{PrivyConfig, PrivyDelegate};
pub use reader::MarketReader;
pub use types::{
    Batch, GlobalState, Keyed, LedgerAccount, LpPosition, Market, MarketState, Position,
    SkippedAccount,
};
pub use wallet_store::WalletStore;
