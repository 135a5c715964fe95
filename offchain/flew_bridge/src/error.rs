// offchain/src/error.rs
use std::fmt;

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::delegate::DelegateError;

/// Which ledger entity an error or lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    GlobalState,
    Market,
    Position,
    LpPosition,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountKind::GlobalState => "global state",
            AccountKind::Market => "market",
            AccountKind::Position => "position",
            AccountKind::LpPosition => "LP position",
        };
        f.write_str(name)
    }
}

/// Bytes on the ledger that do not match the expected account layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("account data too short: {len} bytes")]
    TooShort { len: usize },

    #[error("discriminator does not match {expected}")]
    Discriminator { expected: &'static str },

    #[error("malformed {kind} layout: {reason}")]
    Layout { kind: &'static str, reason: String },
}

/// A transaction the ledger (or the RPC node in front of it) refused.
///
/// `message` and `logs` are kept exactly as the node reported them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rejection {
    pub message: String,
    /// Custom instruction error code, when the failure came from a program.
    pub code: Option<u32>,
    pub logs: Vec<String>,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        for line in &self.logs {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The account does not exist yet. Normal control flow for reads.
    #[error("{kind} account {address} not found")]
    NotFound { kind: AccountKind, address: Pubkey },

    /// The ledger moved on since the values this transaction was built from
    /// were read (counter race, already-claimed flag). Re-read and retry.
    #[error("stale ledger state: {0}")]
    StaleState(Rejection),

    #[error("cannot decode account {address}: {source}")]
    Decode {
        address: Pubkey,
        #[source]
        source: DecodeError,
    },

    #[error("signing delegate: {0}")]
    Delegate(#[from] DelegateError),

    /// Transport failure, timeout, or any ledger rejection that is not a
    /// stale-state conflict.
    #[error("ledger submission failed: {0}")]
    Network(Rejection),

    #[error("no valid program address for seed namespace {namespace:?}")]
    AddressDerivation { namespace: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// The rejection record for ledger-side failures, if this is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            BridgeError::StaleState(r) | BridgeError::Network(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, BridgeError::StaleState(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
