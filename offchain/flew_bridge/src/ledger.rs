// offchain/src/ledger.rs
//! The only door to the ledger: account reads and transaction submission.
//!
//! Reads need no signer at all; a read-only client is just an RPC endpoint.

use std::time::Duration;

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    instruction::InstructionError,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};

use crate::error::{BridgeError, Rejection, Result};

/// Server-side equality filter on raw account bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl AccountFilter {
    pub fn memcmp(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        data.get(self.offset..self.offset + self.bytes.len()) == Some(self.bytes.as_slice())
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Raw account data, or `None` if no account lives at `address`.
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// All accounts owned by `program_id` whose bytes pass every filter.
    async fn scan_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    /// Send a signed transaction and wait until it is confirmed.
    ///
    /// A rejection carries the node's message and program logs untouched.
    async fn send_and_confirm(&self, tx: &Transaction) -> std::result::Result<Signature, Rejection>;
}

/// [`Ledger`] backed by a Solana JSON-RPC node.
pub struct RpcLedger {
    rpc: RpcClient,
}

impl RpcLedger {
    pub fn new(rpc_url: String, timeout: Duration) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url,
            timeout,
            CommitmentConfig::confirmed(),
        );
        Self { rpc }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .await
            .map_err(|e| BridgeError::Network(rejection_from_client_error(&e)))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn scan_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let filters = filters
            .iter()
            .map(|f| RpcFilterType::Memcmp(Memcmp::new_raw_bytes(f.offset, f.bytes.clone())))
            .collect();
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.rpc.commitment()),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };
        let accounts = self
            .rpc
            .get_program_accounts_with_config(program_id, config)
            .await
            .map_err(|e| BridgeError::Network(rejection_from_client_error(&e)))?;
        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| BridgeError::Network(rejection_from_client_error(&e)))
    }

    async fn send_and_confirm(&self, tx: &Transaction) -> std::result::Result<Signature, Rejection> {
        self.rpc
            .send_and_confirm_transaction(tx)
            .await
            .map_err(|e| rejection_from_client_error(&e))
    }
}

/// Pull the custom error code and simulation logs out of an RPC error.
pub fn rejection_from_client_error(err: &ClientError) -> Rejection {
    let mut rejection = Rejection::new(err.to_string());

    if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
        data: RpcResponseErrorData::SendTransactionPreflightFailure(sim),
        ..
    }) = err.kind()
    {
        rejection.logs = sim.logs.clone().unwrap_or_default();
    }

    if let Some(TransactionError::InstructionError(_, InstructionError::Custom(code))) =
        err.get_transaction_error()
    {
        rejection.code = Some(code);
    }

    rejection
}
