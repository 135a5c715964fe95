// offchain/src/delegate.rs
//! Custodial signing: map an identity to a wallet and have that wallet sign,
//! without raw key material ever leaving the delegate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("no wallet for user {0}")]
    WalletNotFound(String),

    #[error("signing service unreachable: {0}")]
    Unreachable(String),

    #[error("signing service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("invalid response from signing service: {0}")]
    InvalidResponse(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("wallet store error: {0}")]
    Store(String),
}

/// A wallet the delegate can sign with. Carries no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletHandle {
    pub wallet_id: String,
    pub address: Pubkey,
}

/// What a user needs to reach their wallet elsewhere. Never a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryDescriptor {
    pub address: Pubkey,
    pub wallet_id: String,
    pub recovery_method: String,
}

#[async_trait]
pub trait SigningDelegate: Send + Sync {
    /// The wallet mapped to `user_id`, if one exists.
    async fn map_identity(&self, user_id: &str) -> Result<Option<WalletHandle>, DelegateError>;

    /// Create a wallet for `user_id`, or return the existing one.
    async fn create_wallet(&self, user_id: &str) -> Result<WalletHandle, DelegateError>;

    /// Sign `tx` as `wallet`. The blockhash and fee payer must already be set.
    async fn sign(&self, wallet: &WalletHandle, tx: Transaction) -> Result<Transaction, DelegateError>;

    async fn export_wallet(&self, user_id: &str) -> Result<RecoveryDescriptor, DelegateError>;

    /// Mapping lookup only; no I/O against the signing service.
    fn has_wallet(&self, user_id: &str) -> bool;
}
