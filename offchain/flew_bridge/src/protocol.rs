// offchain/src/protocol.rs
use borsh::BorshDeserialize;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

/// Program id of the deployed capstone prediction market.
pub const DEFAULT_PROGRAM_ID: &str = "72jWpfijYJqBf8L69Qw92o7tNKDBDKaiYUziDco7vMZL";

// Seed tags. Must match the on-chain program byte for byte.
pub const GLOBAL_STATE_SEED: &[u8] = b"global_state";
pub const MARKET_SEED: &[u8] = b"market";
pub const MARKET_VAULT_SEED: &[u8] = b"market_vault";
pub const POSITION_SEED: &[u8] = b"position";
pub const LP_POSITION_SEED: &[u8] = b"lp-position";

/// Fixed capacity of the market question buffer.
pub const QUESTION_LEN: usize = 200;

/// Anchor prefixes every account with an 8 byte type hash.
pub const DISCRIMINATOR_LEN: usize = 8;

pub const BPS_DENOMINATOR: u64 = 10_000;
pub const PROTOCOL_FEE_SHARE_PCT: u64 = 20;
pub const LP_FEE_SHARE_PCT: u64 = 80;
/// Scale of `Position::entry_odds`.
pub const ODDS_SCALE: u64 = 1_000_000_000;
/// Smallest initial liquidity the program accepts (1 SOL).
pub const MIN_LIQUIDITY: u64 = 1_000_000_000;

/// `sha256("<namespace>:<name>")[..8]`, the Anchor discriminator scheme.
pub fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}

pub static GLOBAL_STATE_DISCRIMINATOR: Lazy<[u8; 8]> =
    Lazy::new(|| discriminator("account", "GlobalState"));
pub static MARKET_DISCRIMINATOR: Lazy<[u8; 8]> = Lazy::new(|| discriminator("account", "Market"));
pub static POSITION_DISCRIMINATOR: Lazy<[u8; 8]> =
    Lazy::new(|| discriminator("account", "Position"));
pub static LP_POSITION_DISCRIMINATOR: Lazy<[u8; 8]> =
    Lazy::new(|| discriminator("account", "LPPosition"));

/// Instructions of the market program, with the argument layout it expects.
///
/// Anchor does not tag the variant with a borsh enum index; the data starts
/// with `sha256("global:<snake_name>")[..8]` followed by the borsh encoded
/// arguments, so this enum is packed by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketInstruction {
    Initialize {
        fee_rate: u16,
    },
    CreateMarket {
        question: [u8; QUESTION_LEN],
        initial_liquidity: u64,
        close_time: i64,
    },
    PlaceBet {
        side: bool,
        amount: u64,
    },
    ResolveMarket {
        outcome: bool,
    },
    ClaimPayout,
    ClaimLpFees,
}

#[derive(BorshDeserialize)]
struct CreateMarketArgs {
    question: [u8; QUESTION_LEN],
    initial_liquidity: u64,
    close_time: i64,
}

#[derive(BorshDeserialize)]
struct PlaceBetArgs {
    side: bool,
    amount: u64,
}

impl MarketInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            MarketInstruction::Initialize { .. } => "initialize",
            MarketInstruction::CreateMarket { .. } => "create_market",
            MarketInstruction::PlaceBet { .. } => "place_bet",
            MarketInstruction::ResolveMarket { .. } => "resolve_market",
            MarketInstruction::ClaimPayout => "claim_payout",
            MarketInstruction::ClaimLpFees => "claim_lp_fees",
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = discriminator("global", self.name()).to_vec();
        // Borsh layout: integers little endian, bool as one byte, fixed
        // arrays without a length prefix.
        match self {
            MarketInstruction::Initialize { fee_rate } => {
                data.extend_from_slice(&fee_rate.to_le_bytes());
            }
            MarketInstruction::CreateMarket {
                question,
                initial_liquidity,
                close_time,
            } => {
                data.extend_from_slice(question);
                data.extend_from_slice(&initial_liquidity.to_le_bytes());
                data.extend_from_slice(&close_time.to_le_bytes());
            }
            MarketInstruction::PlaceBet { side, amount } => {
                data.push(u8::from(*side));
                data.extend_from_slice(&amount.to_le_bytes());
            }
            MarketInstruction::ResolveMarket { outcome } => data.push(u8::from(*outcome)),
            MarketInstruction::ClaimPayout | MarketInstruction::ClaimLpFees => {}
        }
        data
    }

    /// Inverse of [`pack`](Self::pack). Returns `None` for foreign data.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < DISCRIMINATOR_LEN {
            return None;
        }
        let (tag, mut args) = data.split_at(DISCRIMINATOR_LEN);
        let is = |name: &str| tag == discriminator("global", name);

        if is("initialize") {
            let fee_rate = u16::deserialize(&mut args).ok()?;
            Some(MarketInstruction::Initialize { fee_rate })
        } else if is("create_market") {
            let a = CreateMarketArgs::deserialize(&mut args).ok()?;
            Some(MarketInstruction::CreateMarket {
                question: a.question,
                initial_liquidity: a.initial_liquidity,
                close_time: a.close_time,
            })
        } else if is("place_bet") {
            let a = PlaceBetArgs::deserialize(&mut args).ok()?;
            Some(MarketInstruction::PlaceBet {
                side: a.side,
                amount: a.amount,
            })
        } else if is("resolve_market") {
            let outcome = bool::deserialize(&mut args).ok()?;
            Some(MarketInstruction::ResolveMarket { outcome })
        } else if is("claim_payout") {
            Some(MarketInstruction::ClaimPayout)
        } else if is("claim_lp_fees") {
            Some(MarketInstruction::ClaimLpFees)
        } else {
            None
        }
    }
}

/// Error codes the program and the Anchor framework report as
/// `custom program error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorCode {
    /// System program: the account being created already exists.
    AccountAlreadyInUse,
    ConstraintSeeds,
    ConstraintAddress,
    AccountNotInitialized,
    InsufficientBalance,
    MarketNotActive,
    MarketClosed,
    MarketStillOpen,
    UnauthorizedResolver,
    AlreadyResolved,
    NotResolved,
    AlreadyClaimed,
    PositionLost,
    InsufficientVaultBalance,
    Overflow,
    CannotBetBothSides,
    NoFeesToClaim,
    InvalidLiquidity,
    InvalidCloseTime,
    EmptyQuestion,
    LiquidityTooLow,
}

const PROGRAM_ERROR_BASE: u32 = 6000;

const PROGRAM_ERRORS: [LedgerErrorCode; 17] = [
    LedgerErrorCode::InsufficientBalance,
    LedgerErrorCode::MarketNotActive,
    LedgerErrorCode::MarketClosed,
    LedgerErrorCode::MarketStillOpen,
    LedgerErrorCode::UnauthorizedResolver,
    LedgerErrorCode::AlreadyResolved,
    LedgerErrorCode::NotResolved,
    LedgerErrorCode::AlreadyClaimed,
    LedgerErrorCode::PositionLost,
    LedgerErrorCode::InsufficientVaultBalance,
    LedgerErrorCode::Overflow,
    LedgerErrorCode::CannotBetBothSides,
    LedgerErrorCode::NoFeesToClaim,
    LedgerErrorCode::InvalidLiquidity,
    LedgerErrorCode::InvalidCloseTime,
    LedgerErrorCode::EmptyQuestion,
    LedgerErrorCode::LiquidityTooLow,
];

impl LedgerErrorCode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(LedgerErrorCode::AccountAlreadyInUse),
            2006 => Some(LedgerErrorCode::ConstraintSeeds),
            2012 => Some(LedgerErrorCode::ConstraintAddress),
            3012 => Some(LedgerErrorCode::AccountNotInitialized),
            c if c >= PROGRAM_ERROR_BASE => PROGRAM_ERRORS
                .get((c - PROGRAM_ERROR_BASE) as usize)
                .copied(),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            LedgerErrorCode::AccountAlreadyInUse => 0,
            LedgerErrorCode::ConstraintSeeds => 2006,
            LedgerErrorCode::ConstraintAddress => 2012,
            LedgerErrorCode::AccountNotInitialized => 3012,
            other => {
                let idx = PROGRAM_ERRORS
                    .iter()
                    .position(|e| *e == other)
                    .unwrap_or_default();
                PROGRAM_ERROR_BASE + idx as u32
            }
        }
    }

    /// Whether this code, raised by `instruction`, means the ledger moved
    /// on since the transaction was built, so a fresh read and retry can
    /// succeed. `instruction` is a [`MarketInstruction::name`].
    ///
    /// Seed and already-in-use failures only mean that for the accounts a
    /// recipe proposes from a counter or an empty address. Elsewhere they
    /// are permanent (wrong caller, account never created).
    pub fn is_stale_for(self, instruction: &str) -> bool {
        match self {
            LedgerErrorCode::AlreadyResolved
            | LedgerErrorCode::AlreadyClaimed
            | LedgerErrorCode::NoFeesToClaim => true,
            LedgerErrorCode::ConstraintSeeds => instruction == "create_market",
            LedgerErrorCode::AccountAlreadyInUse => {
                matches!(instruction, "create_market" | "initialize")
            }
            _ => false,
        }
    }
}
