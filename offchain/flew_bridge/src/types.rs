// offchain/src/types.rs
//! Typed views of the four account kinds the market program owns, and their
//! borsh layout on the ledger.
//!
//! Every view is a transient copy of ledger state. Nothing here is
//! authoritative; re-fetch before acting on it.

use std::fmt;
use std::io;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::DecodeError;
use crate::protocol::{
    DISCRIMINATOR_LEN, GLOBAL_STATE_DISCRIMINATOR, LP_POSITION_DISCRIMINATOR,
    MARKET_DISCRIMINATOR, POSITION_DISCRIMINATOR, QUESTION_LEN,
};

/// Byte offset of `Position::user` in the encoded account. Server side
/// filters match against this offset, so it has to track the layout below.
pub const POSITION_USER_OFFSET: usize = DISCRIMINATOR_LEN;

/// Encode/decode contract shared by all account kinds.
pub trait LedgerAccount: Sized {
    const TYPE_NAME: &'static str;
    /// Allocated account size, discriminator included.
    const SPACE: usize;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN];

    fn decode(data: &[u8]) -> Result<Self, DecodeError>;

    /// Discriminator plus fields, zero padded to [`SPACE`](Self::SPACE).
    fn encode(&self) -> io::Result<Vec<u8>>;
}

fn split_discriminator<'a>(
    data: &'a [u8],
    expected: [u8; DISCRIMINATOR_LEN],
    name: &'static str,
) -> Result<&'a [u8], DecodeError> {
    if data.len() < DISCRIMINATOR_LEN {
        return Err(DecodeError::TooShort { len: data.len() });
    }
    let (tag, body) = data.split_at(DISCRIMINATOR_LEN);
    if tag != expected {
        return Err(DecodeError::Discriminator { expected: name });
    }
    Ok(body)
}

// Accounts are allocated at their maximum size, so trailing bytes after the
// last field are expected and ignored.
fn read_record<T: BorshDeserialize>(mut body: &[u8], name: &'static str) -> Result<T, DecodeError> {
    T::deserialize(&mut body).map_err(|e| DecodeError::Layout {
        kind: name,
        reason: e.to_string(),
    })
}

fn write_record<T: BorshSerialize>(
    discriminator: [u8; DISCRIMINATOR_LEN],
    record: &T,
    space: usize,
) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(space);
    out.extend_from_slice(&discriminator);
    record.serialize(&mut out)?;
    if out.len() < space {
        out.resize(space, 0);
    }
    Ok(out)
}

/// Pad (or cut) `question` into the fixed on-chain buffer.
///
/// Input longer than [`QUESTION_LEN`] bytes is truncated at the capacity,
/// backing off to the previous char boundary so the stored bytes stay UTF-8.
pub fn encode_question(question: &str) -> [u8; QUESTION_LEN] {
    let mut end = question.len().min(QUESTION_LEN);
    while !question.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = [0u8; QUESTION_LEN];
    out[..end].copy_from_slice(&question.as_bytes()[..end]);
    out
}

/// Strip zero padding and surrounding whitespace from a question buffer.
pub fn decode_question(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .replace('\0', "")
        .trim()
        .to_string()
}

// ---------- Market state ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketState {
    Active,
    Closed,
    Resolved,
    Finalized,
    /// A tag this client does not know, e.g. after a program upgrade.
    Unknown(u8),
}

impl MarketState {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => MarketState::Active,
            1 => MarketState::Closed,
            2 => MarketState::Resolved,
            3 => MarketState::Finalized,
            other => MarketState::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            MarketState::Active => 0,
            MarketState::Closed => 1,
            MarketState::Resolved => 2,
            MarketState::Finalized => 3,
            MarketState::Unknown(tag) => tag,
        }
    }

    /// Active and Closed markets are live; Resolved and Finalized are history.
    pub fn is_live(self) -> bool {
        matches!(self, MarketState::Active | MarketState::Closed)
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketState::Active => f.write_str("Active"),
            MarketState::Closed => f.write_str("Closed"),
            MarketState::Resolved => f.write_str("Resolved"),
            MarketState::Finalized => f.write_str("Finalized"),
            MarketState::Unknown(_) => f.write_str("Unknown"),
        }
    }
}

// ---------- Global state ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalState {
    pub market_counter: u64,
    /// Basis points, 0..=10_000.
    pub fee_rate: u16,
    pub protocol_treasury: Pubkey,
    pub admin: Pubkey,
    pub bump: u8,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct GlobalStateRecord {
    market_counter: u64,
    fee_rate: u16,
    protocol_treasury: [u8; 32],
    admin: [u8; 32],
    bump: u8,
}

impl GlobalState {
    /// Id the next created market will receive, if nobody else creates one
    /// first. A proposal, not a reservation.
    pub fn next_market_id(&self) -> u64 {
        self.market_counter.saturating_add(1)
    }
}

impl LedgerAccount for GlobalState {
    const TYPE_NAME: &'static str = "GlobalState";
    const SPACE: usize = DISCRIMINATOR_LEN + 8 + 2 + 32 + 32 + 1;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        *GLOBAL_STATE_DISCRIMINATOR
    }

    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let body = split_discriminator(data, Self::discriminator(), Self::TYPE_NAME)?;
        let r: GlobalStateRecord = read_record(body, Self::TYPE_NAME)?;
        Ok(Self {
            market_counter: r.market_counter,
            fee_rate: r.fee_rate,
            protocol_treasury: Pubkey::new_from_array(r.protocol_treasury),
            admin: Pubkey::new_from_array(r.admin),
            bump: r.bump,
        })
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let r = GlobalStateRecord {
            market_counter: self.market_counter,
            fee_rate: self.fee_rate,
            protocol_treasury: self.protocol_treasury.to_bytes(),
            admin: self.admin.to_bytes(),
            bump: self.bump,
        };
        write_record(Self::discriminator(), &r, Self::SPACE)
    }
}

// ---------- Market ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub market_id: u64,
    pub question: String,
    pub creator: Pubkey,
    pub resolver: Pubkey,
    pub yes_pool: u64,
    pub no_pool: u64,
    /// Expected `>= yes_pool + no_pool`; only the ledger enforces it.
    pub total_liquidity: u64,
    pub state: MarketState,
    /// Set once, on resolution.
    pub outcome: Option<bool>,
    pub close_time: i64,
    pub resolution_time: Option<i64>,
    pub payout_ratio: u64,
    pub bump: u8,
    pub vault_bump: u8,
    pub lp_bump: u8,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct MarketRecord {
    market_id: u64,
    question: [u8; QUESTION_LEN],
    creator: [u8; 32],
    resolver: [u8; 32],
    yes_pool: u64,
    no_pool: u64,
    total_liquidity: u64,
    state: u8,
    outcome: Option<bool>,
    close_time: i64,
    resolution_time: Option<i64>,
    payout_ratio: u64,
    bump: u8,
    vault_bump: u8,
    lp_bump: u8,
}

impl LedgerAccount for Market {
    const TYPE_NAME: &'static str = "Market";
    const SPACE: usize = DISCRIMINATOR_LEN
        + 8
        + QUESTION_LEN
        + 32
        + 32
        + 8 * 3
        + 1
        + (1 + 1)
        + 8
        + (1 + 8)
        + 8
        + 3;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        *MARKET_DISCRIMINATOR
    }

    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let body = split_discriminator(data, Self::discriminator(), Self::TYPE_NAME)?;
        let r: MarketRecord = read_record(body, Self::TYPE_NAME)?;
        Ok(Self {
            market_id: r.market_id,
            question: decode_question(&r.question),
            creator: Pubkey::new_from_array(r.creator),
            resolver: Pubkey::new_from_array(r.resolver),
            yes_pool: r.yes_pool,
            no_pool: r.no_pool,
            total_liquidity: r.total_liquidity,
            state: MarketState::from_tag(r.state),
            outcome: r.outcome,
            close_time: r.close_time,
            resolution_time: r.resolution_time,
            payout_ratio: r.payout_ratio,
            bump: r.bump,
            vault_bump: r.vault_bump,
            lp_bump: r.lp_bump,
        })
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let r = MarketRecord {
            market_id: self.market_id,
            question: encode_question(&self.question),
            creator: self.creator.to_bytes(),
            resolver: self.resolver.to_bytes(),
            yes_pool: self.yes_pool,
            no_pool: self.no_pool,
            total_liquidity: self.total_liquidity,
            state: self.state.tag(),
            outcome: self.outcome,
            close_time: self.close_time,
            resolution_time: self.resolution_time,
            payout_ratio: self.payout_ratio,
            bump: self.bump,
            vault_bump: self.vault_bump,
            lp_bump: self.lp_bump,
        };
        write_record(Self::discriminator(), &r, Self::SPACE)
    }
}

impl Market {
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Pools as (winning, losing) for a resolved market.
    pub fn settled_pools(&self) -> Option<(u64, u64)> {
        match self.outcome? {
            true => Some((self.yes_pool, self.no_pool)),
            false => Some((self.no_pool, self.yes_pool)),
        }
    }
}

// ---------- Position ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub user: Pubkey,
    pub market: Pubkey,
    /// `true` is YES.
    pub side: bool,
    /// Net stake in lamports, cumulative over repeat bets.
    pub amount: u64,
    /// Side pool share at first bet, scaled by `ODDS_SCALE`.
    pub entry_odds: u64,
    pub claimed: bool,
    pub bump: u8,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct PositionRecord {
    user: [u8; 32],
    market: [u8; 32],
    side: bool,
    amount: u64,
    entry_odds: u64,
    claimed: bool,
    bump: u8,
}

impl LedgerAccount for Position {
    const TYPE_NAME: &'static str = "Position";
    const SPACE: usize = DISCRIMINATOR_LEN + 32 + 32 + 1 + 8 + 8 + 1 + 1;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        *POSITION_DISCRIMINATOR
    }

    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let body = split_discriminator(data, Self::discriminator(), Self::TYPE_NAME)?;
        let r: PositionRecord = read_record(body, Self::TYPE_NAME)?;
        Ok(Self {
            user: Pubkey::new_from_array(r.user),
            market: Pubkey::new_from_array(r.market),
            side: r.side,
            amount: r.amount,
            entry_odds: r.entry_odds,
            claimed: r.claimed,
            bump: r.bump,
        })
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let r = PositionRecord {
            user: self.user.to_bytes(),
            market: self.market.to_bytes(),
            side: self.side,
            amount: self.amount,
            entry_odds: self.entry_odds,
            claimed: self.claimed,
            bump: self.bump,
        };
        write_record(Self::discriminator(), &r, Self::SPACE)
    }
}

impl Position {
    /// What the ledger would pay out for this position, for display.
    ///
    /// `None` while the market is unresolved or when this side lost.
    pub fn projected_payout(&self, market: &Market) -> Option<u64> {
        let outcome = market.outcome?;
        if outcome != self.side {
            return None;
        }
        let (winning, losing) = market.settled_pools()?;
        let share = (self.amount as u128)
            .checked_mul(losing as u128)?
            .checked_div(winning as u128)?;
        self.amount.checked_add(u64::try_from(share).ok()?)
    }
}

// ---------- LP position ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpPosition {
    pub lp_provider: Pubkey,
    pub market: Pubkey,
    pub liquidity_provided: u64,
    /// Accrued and not yet claimed.
    pub fees_earned: u64,
    pub fees_claimed: bool,
    pub fees_claimed_amount: u64,
    pub bump: u8,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct LpPositionRecord {
    lp_provider: [u8; 32],
    market: [u8; 32],
    liquidity_provided: u64,
    fees_earned: u64,
    fees_claimed: bool,
    fees_claimed_amount: u64,
    bump: u8,
}

impl LedgerAccount for LpPosition {
    const TYPE_NAME: &'static str = "LPPosition";
    const SPACE: usize = DISCRIMINATOR_LEN + 32 + 32 + 8 + 8 + 1 + 8 + 1;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        *LP_POSITION_DISCRIMINATOR
    }

    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let body = split_discriminator(data, Self::discriminator(), Self::TYPE_NAME)?;
        let r: LpPositionRecord = read_record(body, Self::TYPE_NAME)?;
        Ok(Self {
            lp_provider: Pubkey::new_from_array(r.lp_provider),
            market: Pubkey::new_from_array(r.market),
            liquidity_provided: r.liquidity_provided,
            fees_earned: r.fees_earned,
            fees_claimed: r.fees_claimed,
            fees_claimed_amount: r.fees_claimed_amount,
            bump: r.bump,
        })
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let r = LpPositionRecord {
            lp_provider: self.lp_provider.to_bytes(),
            market: self.market.to_bytes(),
            liquidity_provided: self.liquidity_provided,
            fees_earned: self.fees_earned,
            fees_claimed: self.fees_claimed,
            fees_claimed_amount: self.fees_claimed_amount,
            bump: self.bump,
        };
        write_record(Self::discriminator(), &r, Self::SPACE)
    }
}

// ---------- Keyed views ----------

/// A decoded account together with the address it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed<T> {
    pub address: Pubkey,
    pub account: T,
}

/// An account a batch read could not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAccount {
    pub address: Pubkey,
    pub reason: DecodeError,
}

/// Result of a multi-account scan: what decoded, and what was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    pub items: Vec<Keyed<T>>,
    pub skipped: Vec<SkippedAccount>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|k| &k.account)
    }
}
