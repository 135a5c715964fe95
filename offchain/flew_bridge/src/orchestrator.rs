// offchain/src/orchestrator.rs
//! One recipe per state-changing operation:
//! derive -> read -> assemble -> sign -> submit -> confirm.
//!
//! Values read from the ledger (counter, creator, treasury) are fetched
//! again on every call. The core never retries; a stale-state rejection goes
//! back to the caller, who re-runs the whole recipe.

use std::sync::Arc;

use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};
use tracing::{debug, info, warn};

use crate::delegate::{DelegateError, SigningDelegate, WalletHandle};
use crate::error::{AccountKind, BridgeError, Rejection, Result};
use crate::instructions::{
    self, ClaimLpFeesAccounts, ClaimPayoutAccounts, CreateMarketAccounts, InitializeAccounts,
    PlaceBetAccounts,
};
use crate::ledger::Ledger;
use crate::protocol::BPS_DENOMINATOR;
use crate::reader::MarketReader;
use crate::submit::submit_and_confirm;
use crate::types::{encode_question, GlobalState, Market};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    /// Global state already existed; nothing was sent.
    AlreadyInitialized(GlobalState),
    Initialized(Signature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMarket {
    pub signature: Signature,
    pub market_id: u64,
    pub market: Pubkey,
    /// False when the transaction confirmed but the follow-up read could not
    /// see the new market yet (a lagging node). The market has still been
    /// created; reconcile by reading, never by re-running the recipe.
    pub verified: bool,
}

pub struct MarketOrchestrator<L: ?Sized, D: ?Sized> {
    ledger: Arc<L>,
    delegate: Arc<D>,
    reader: MarketReader<L>,
}

impl<L, D> MarketOrchestrator<L, D>
where
    L: Ledger + ?Sized,
    D: SigningDelegate + ?Sized,
{
    pub fn new(ledger: Arc<L>, delegate: Arc<D>, program_id: Pubkey) -> Self {
        let reader = MarketReader::new(Arc::clone(&ledger), program_id);
        Self {
            ledger,
            delegate,
            reader,
        }
    }

    pub fn reader(&self) -> &MarketReader<L> {
        &self.reader
    }

    fn program_id(&self) -> Pubkey {
        *self.reader.deriver().program_id()
    }

    async fn wallet_for(&self, user_id: &str) -> Result<WalletHandle> {
        self.delegate
            .map_identity(user_id)
            .await?
            .ok_or_else(|| DelegateError::WalletNotFound(user_id.to_string()).into())
    }

    /// Assemble an unsigned transaction paid by `wallet`, have the delegate
    /// sign it, submit and wait for confirmation.
    async fn execute(&self, wallet: &WalletHandle, ix: Instruction, label: &str) -> Result<Signature> {
        let blockhash = self.ledger.latest_blockhash().await?;
        let mut tx = Transaction::new_with_payer(&[ix], Some(&wallet.address));
        tx.message.recent_blockhash = blockhash;

        let signed = self.delegate.sign(wallet, tx).await?;
        info!(wallet = %wallet.address, "[bridge] submitting {label}");
        submit_and_confirm(&*self.ledger, &signed, label).await
    }

    /// One-time protocol setup by the admin. If global state exists already
    /// this returns it without sending anything.
    pub async fn initialize(
        &self,
        admin_id: &str,
        fee_rate: u16,
        protocol_treasury: Option<Pubkey>,
    ) -> Result<InitializeOutcome> {
        if u64::from(fee_rate) > BPS_DENOMINATOR {
            return Err(BridgeError::InvalidInput(format!(
                "fee rate {fee_rate} exceeds {BPS_DENOMINATOR} basis points"
            )));
        }

        if let Some(state) = self.reader.get_global_state().await? {
            info!(
                counter = state.market_counter,
                fee_rate = state.fee_rate,
                "[bridge] program already initialized"
            );
            return Ok(InitializeOutcome::AlreadyInitialized(state));
        }

        let admin = self.wallet_for(admin_id).await?;
        let (global_state, _) = self.reader.deriver().global_state()?;
        let accounts = InitializeAccounts {
            admin: admin.address,
            global_state,
            protocol_treasury: protocol_treasury.unwrap_or(admin.address),
        };
        let ix = instructions::initialize(&self.program_id(), &accounts, fee_rate);
        let sig = self.execute(&admin, ix, "initialize").await?;
        Ok(InitializeOutcome::Initialized(sig))
    }

    /// Create a market owned and resolved by `user_id`.
    ///
    /// The market id is `market_counter + 1` as read just now. That is a
    /// proposal: if another creator lands first the ledger rejects this
    /// transaction and the caller gets [`BridgeError::StaleState`]. Once the
    /// transaction has landed the call never reports a stale state because
    /// the market could not be read back; see [`CreatedMarket::verified`].
    pub async fn create_market(
        &self,
        user_id: &str,
        question: &str,
        initial_liquidity: u64,
        close_time: i64,
    ) -> Result<CreatedMarket> {
        let creator = self.wallet_for(user_id).await?;
        let deriver = self.reader.deriver();

        let (global_state, _) = deriver.global_state()?;
        let state = self
            .reader
            .fetch::<GlobalState>(&global_state)
            .await?
            .ok_or(BridgeError::NotFound {
                kind: AccountKind::GlobalState,
                address: global_state,
            })?;

        let market_id = state.next_market_id();
        let addrs = deriver.market_addresses(market_id)?;
        let (lp_position, _) = deriver.lp_position(&addrs.market, &creator.address)?;
        debug!(market_id, market = %addrs.market, "proposing market id");

        let accounts = CreateMarketAccounts {
            creator: creator.address,
            global_state,
            market: addrs.market,
            lp_position,
            market_vault: addrs.vault,
        };
        let ix = instructions::create_market(
            &self.program_id(),
            &accounts,
            encode_question(question),
            initial_liquidity,
            close_time,
        );
        let signature = self.execute(&creator, ix, "create_market").await?;

        // Confirmed. A market at the proposed address that is not ours means
        // the id we report would be wrong; a missing one only means the node
        // answering reads has not caught up.
        let verified = match self.reader.fetch::<Market>(&addrs.market).await {
            Ok(Some(m)) if m.market_id == market_id && m.creator == creator.address => true,
            Ok(Some(m)) => {
                return Err(BridgeError::StaleState(Rejection::new(format!(
                    "market {} at {} belongs to {}, not the one created by {signature}",
                    m.market_id, addrs.market, m.creator
                ))))
            }
            Ok(None) => {
                warn!(market_id, %signature, "[bridge] created market not visible yet");
                false
            }
            Err(e) => {
                warn!(market_id, %signature, "[bridge] could not verify created market: {e}");
                false
            }
        };

        info!(market_id, market = %addrs.market, verified, "[bridge] market created");
        Ok(CreatedMarket {
            signature,
            market_id,
            market: addrs.market,
            verified,
        })
    }

    /// Stake `amount` lamports on `side` (true = YES).
    pub async fn place_bet(&self, user_id: &str, market_id: u64, side: bool, amount: u64) -> Result<Signature> {
        let user = self.wallet_for(user_id).await?;
        let deriver = self.reader.deriver();

        let addrs = deriver.market_addresses(market_id)?;
        let (position, _) = deriver.position(&addrs.market, &user.address)?;

        let market = self
            .reader
            .get_market(market_id)
            .await?
            .ok_or(BridgeError::NotFound {
                kind: AccountKind::Market,
                address: addrs.market,
            })?;
        let (lp_position, _) = deriver.lp_position(&addrs.market, &market.account.creator)?;

        let (global_state, _) = deriver.global_state()?;
        let state = self
            .reader
            .fetch::<GlobalState>(&global_state)
            .await?
            .ok_or(BridgeError::NotFound {
                kind: AccountKind::GlobalState,
                address: global_state,
            })?;

        let accounts = PlaceBetAccounts {
            global_state,
            market: addrs.market,
            market_vault: addrs.vault,
            position,
            lp_position,
            protocol_treasury: state.protocol_treasury,
            user: user.address,
        };
        let ix = instructions::place_bet(&self.program_id(), &accounts, side, amount);
        self.execute(&user, ix, "place_bet").await
    }

    /// Settle a market. Only the market's stored resolver can sign this;
    /// the ledger enforces that, not the client.
    pub async fn resolve_market(&self, user_id: &str, market_id: u64, outcome: bool) -> Result<Signature> {
        let resolver = self.wallet_for(user_id).await?;
        let (market, _) = self.reader.deriver().market(market_id)?;
        let ix = instructions::resolve_market(&self.program_id(), &market, &resolver.address, outcome);
        self.execute(&resolver, ix, "resolve_market").await
    }

    /// Withdraw a winning position. Repeat claims are not filtered here; the
    /// ledger's `claimed` flag rejects them as stale state.
    pub async fn claim_payout(&self, user_id: &str, market_id: u64) -> Result<Signature> {
        let user = self.wallet_for(user_id).await?;
        let deriver = self.reader.deriver();
        let addrs = deriver.market_addresses(market_id)?;
        let (position, _) = deriver.position(&addrs.market, &user.address)?;

        let accounts = ClaimPayoutAccounts {
            market: addrs.market,
            position,
            market_vault: addrs.vault,
            user: user.address,
        };
        let ix = instructions::claim_payout(&self.program_id(), &accounts);
        self.execute(&user, ix, "claim_payout").await
    }

    /// Withdraw LP fees accrued to the caller as market creator.
    ///
    /// The LP position is keyed by the market's stored creator, so any other
    /// caller is turned away before anything is signed.
    pub async fn claim_lp_fees(&self, user_id: &str, market_id: u64) -> Result<Signature> {
        let caller = self.wallet_for(user_id).await?;
        let deriver = self.reader.deriver();
        let addrs = deriver.market_addresses(market_id)?;

        let market = self
            .reader
            .get_market(market_id)
            .await?
            .ok_or(BridgeError::NotFound {
                kind: AccountKind::Market,
                address: addrs.market,
            })?;
        if market.account.creator != caller.address {
            return Err(BridgeError::InvalidInput(format!(
                "{} did not create market {market_id}; its LP fees belong to {}",
                caller.address, market.account.creator
            )));
        }
        let (lp_position, _) = deriver.lp_position(&addrs.market, &market.account.creator)?;

        let accounts = ClaimLpFeesAccounts {
            market: addrs.market,
            lp_position,
            market_vault: addrs.vault,
            creator: caller.address,
        };
        let ix = instructions::claim_lp_fees(&self.program_id(), &accounts);
        self.execute(&caller, ix, "claim_lp_fees").await
    }
}
