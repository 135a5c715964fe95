// offchain/src/pda.rs
//! Program-derived addresses of every account the market program owns.
//!
//! Seed order per account:
//!
//! | account      | seeds                                   |
//! |--------------|-----------------------------------------|
//! | global state | `"global_state"`                        |
//! | market       | `"market", market_id (u64 LE)`          |
//! | market vault | `"market_vault", market`                |
//! | position     | `"position", market, user`              |
//! | LP position  | `"lp-position", market, creator`        |

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::protocol::{
    GLOBAL_STATE_SEED, LP_POSITION_SEED, MARKET_SEED, MARKET_VAULT_SEED, POSITION_SEED,
};

/// Pure derivation: same program id and seeds always give the same
/// `(address, bump)`.
pub fn derive_address(program_id: &Pubkey, seeds: &[&[u8]]) -> Result<(Pubkey, u8)> {
    Pubkey::try_find_program_address(seeds, program_id).ok_or_else(|| {
        BridgeError::AddressDerivation {
            namespace: seeds
                .first()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .unwrap_or_default(),
        }
    })
}

/// Addresses tied to one market id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketAddresses {
    pub market_id: u64,
    pub market: Pubkey,
    pub vault: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDeriver {
    program_id: Pubkey,
}

impl AddressDeriver {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn global_state(&self) -> Result<(Pubkey, u8)> {
        derive_address(&self.program_id, &[GLOBAL_STATE_SEED])
    }

    pub fn market(&self, market_id: u64) -> Result<(Pubkey, u8)> {
        derive_address(&self.program_id, &[MARKET_SEED, &market_id.to_le_bytes()])
    }

    pub fn market_vault(&self, market: &Pubkey) -> Result<(Pubkey, u8)> {
        derive_address(&self.program_id, &[MARKET_VAULT_SEED, market.as_ref()])
    }

    pub fn position(&self, market: &Pubkey, user: &Pubkey) -> Result<(Pubkey, u8)> {
        derive_address(
            &self.program_id,
            &[POSITION_SEED, market.as_ref(), user.as_ref()],
        )
    }

    pub fn lp_position(&self, market: &Pubkey, creator: &Pubkey) -> Result<(Pubkey, u8)> {
        derive_address(
            &self.program_id,
            &[LP_POSITION_SEED, market.as_ref(), creator.as_ref()],
        )
    }

    /// Market and vault for `market_id`, derived in one go.
    pub fn market_addresses(&self, market_id: u64) -> Result<MarketAddresses> {
        let (market, _) = self.market(market_id)?;
        let (vault, _) = self.market_vault(&market)?;
        debug!(market_id, %market, %vault, "derived market addresses");
        Ok(MarketAddresses {
            market_id,
            market,
            vault,
        })
    }
}
