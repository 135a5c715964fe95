// offchain/src/reader.rs
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::ledger::{AccountFilter, Ledger};
use crate::pda::AddressDeriver;
use crate::types::{
    Batch, GlobalState, Keyed, LedgerAccount, LpPosition, Market, Position, SkippedAccount,
    POSITION_USER_OFFSET,
};

/// Read-only queries against the market program's accounts.
///
/// Every call is a fresh fetch; nothing is cached between calls.
pub struct MarketReader<L: ?Sized> {
    ledger: Arc<L>,
    deriver: AddressDeriver,
}

impl<L: ?Sized> Clone for MarketReader<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            deriver: self.deriver,
        }
    }
}

impl<L: Ledger + ?Sized> MarketReader<L> {
    pub fn new(ledger: Arc<L>, program_id: Pubkey) -> Self {
        Self {
            ledger,
            deriver: AddressDeriver::new(program_id),
        }
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    /// Fetch and decode one account. `Ok(None)` when it does not exist.
    pub async fn fetch<T: LedgerAccount>(&self, address: &Pubkey) -> Result<Option<T>> {
        let Some(data) = self.ledger.fetch_account(address).await? else {
            debug!(%address, kind = T::TYPE_NAME, "account not found");
            return Ok(None);
        };
        T::decode(&data)
            .map(Some)
            .map_err(|source| BridgeError::Decode {
                address: *address,
                source,
            })
    }

    /// Every account of kind `T` passing `filters`. Accounts that fail to
    /// decode are reported in [`Batch::skipped`] instead of failing the scan.
    pub async fn scan<T: LedgerAccount>(&self, filters: Vec<AccountFilter>) -> Result<Batch<T>> {
        let mut all_filters = vec![AccountFilter::memcmp(0, T::discriminator().to_vec())];
        all_filters.extend(filters);

        let raw = self
            .ledger
            .scan_program_accounts(self.deriver.program_id(), &all_filters)
            .await?;

        let mut batch = Batch::default();
        for (address, data) in raw {
            match T::decode(&data) {
                Ok(account) => batch.items.push(Keyed { address, account }),
                Err(reason) => {
                    warn!(%address, kind = T::TYPE_NAME, "skipping undecodable account: {reason}");
                    batch.skipped.push(SkippedAccount { address, reason });
                }
            }
        }
        Ok(batch)
    }

    pub async fn get_global_state(&self) -> Result<Option<GlobalState>> {
        let (address, _) = self.deriver.global_state()?;
        self.fetch(&address).await
    }

    pub async fn get_market(&self, market_id: u64) -> Result<Option<Keyed<Market>>> {
        let (address, _) = self.deriver.market(market_id)?;
        Ok(self
            .fetch::<Market>(&address)
            .await?
            .map(|account| Keyed { address, account }))
    }

    /// All markets regardless of state. Order is whatever the node returns.
    pub async fn list_markets(&self) -> Result<Batch<Market>> {
        self.scan(Vec::new()).await
    }

    /// Markets in the Active or Closed state.
    pub async fn list_active_markets(&self) -> Result<Batch<Market>> {
        let mut batch = self.list_markets().await?;
        batch.items.retain(|m| m.account.is_live());
        Ok(batch)
    }

    /// Positions held by `user`, filtered on the node by the `user` field.
    pub async fn get_user_positions(&self, user: &Pubkey) -> Result<Batch<Position>> {
        self.scan(vec![AccountFilter::memcmp(
            POSITION_USER_OFFSET,
            user.to_bytes().to_vec(),
        )])
        .await
    }

    pub async fn get_position(&self, market_id: u64, user: &Pubkey) -> Result<Option<Keyed<Position>>> {
        let (market, _) = self.deriver.market(market_id)?;
        let (address, _) = self.deriver.position(&market, user)?;
        Ok(self
            .fetch::<Position>(&address)
            .await?
            .map(|account| Keyed { address, account }))
    }

    pub async fn get_lp_position(
        &self,
        market_id: u64,
        creator: &Pubkey,
    ) -> Result<Option<Keyed<LpPosition>>> {
        let (market, _) = self.deriver.market(market_id)?;
        let (address, _) = self.deriver.lp_position(&market, creator)?;
        Ok(self
            .fetch::<LpPosition>(&address)
            .await?
            .map(|account| Keyed { address, account }))
    }
}
