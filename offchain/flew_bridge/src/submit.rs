// offchain/src/submit.rs
use solana_sdk::{signature::Signature, transaction::Transaction};
use tracing::{info, warn};

use crate::error::{BridgeError, Rejection, Result};
use crate::ledger::Ledger;
use crate::protocol::LedgerErrorCode;

/// Sort a rejection of `instruction` into stale-state (re-read and retry) or
/// network/other.
pub fn classify_rejection(rejection: Rejection, instruction: &str) -> BridgeError {
    let stale = rejection
        .code
        .and_then(LedgerErrorCode::from_code)
        .is_some_and(|code| code.is_stale_for(instruction));
    if stale {
        BridgeError::StaleState(rejection)
    } else {
        BridgeError::Network(rejection)
    }
}

/// Submit a signed transaction and block until it is confirmed. `label` is
/// the program instruction it carries and drives stale-state classification.
///
/// Never retries. If the caller stops awaiting this, the transaction may
/// still land; reconcile by reading state.
pub async fn submit_and_confirm<L: Ledger + ?Sized>(
    ledger: &L,
    tx: &Transaction,
    label: &str,
) -> Result<Signature> {
    if !tx.is_signed() {
        return Err(BridgeError::InvalidInput(format!(
            "{label} transaction is missing signatures"
        )));
    }

    match ledger.send_and_confirm(tx).await {
        Ok(sig) => {
            info!(%sig, "[bridge] {label} confirmed");
            Ok(sig)
        }
        Err(rejection) => {
            warn!(code = ?rejection.code, "[bridge] {label} rejected: {}", rejection.message);
            for line in &rejection.logs {
                warn!("[bridge]   {line}");
            }
            Err(classify_rejection(rejection, label))
        }
    }
}
