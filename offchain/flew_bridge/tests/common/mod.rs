//! In-memory ledger for integration tests.
//!
//! Stores program accounts as encoded bytes and runs the six market
//! instructions with the program's checks, so counter races, repeat bets
//! and repeat claims behave the way they do on a cluster.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};

use flew_bridge::{
    instructions::{self, CreateMarketAccounts},
    pda::AddressDeriver,
    protocol::{
        LedgerErrorCode, MarketInstruction, BPS_DENOMINATOR, LP_FEE_SHARE_PCT, MIN_LIQUIDITY,
        ODDS_SCALE, PROTOCOL_FEE_SHARE_PCT,
    },
    types::encode_question,
    AccountFilter, GlobalState, KeypairDirDelegate, Ledger, LedgerAccount, LpPosition, Market,
    MarketOrchestrator, MarketState, Position, Rejection, Result,
};

pub const GENESIS_TIME: i64 = 1_700_000_000;
pub const SOL: u64 = 1_000_000_000;

/// Custom error the system program raises when a transfer overdraws.
const SYSTEM_INSUFFICIENT_FUNDS: u32 = 1;
/// Anchor: required signer missing.
const ACCOUNT_NOT_SIGNER: u32 = 3010;
/// Anchor: account data does not deserialize as the expected type.
const ACCOUNT_DID_NOT_DESERIALIZE: u32 = 3003;

#[derive(Clone, Default)]
struct State {
    accounts: HashMap<Pubkey, Vec<u8>>,
    lamports: HashMap<Pubkey, u64>,
}

impl State {
    fn load<T: LedgerAccount>(&self, address: &Pubkey) -> std::result::Result<T, u32> {
        let data = self
            .accounts
            .get(address)
            .ok_or(LedgerErrorCode::AccountNotInitialized.code())?;
        T::decode(data).map_err(|_| ACCOUNT_DID_NOT_DESERIALIZE)
    }

    fn store<T: LedgerAccount>(&mut self, address: Pubkey, account: &T) {
        self.accounts.insert(address, account.encode().unwrap());
    }

    fn exists(&self, address: &Pubkey) -> bool {
        self.accounts.contains_key(address)
    }

    fn transfer(&mut self, from: &Pubkey, to: &Pubkey, amount: u64) -> std::result::Result<(), u32> {
        let balance = self.lamports.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(SYSTEM_INSUFFICIENT_FUNDS);
        }
        self.lamports.insert(*from, balance - amount);
        *self.lamports.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

pub struct FakeLedger {
    deriver: AddressDeriver,
    blockhash: Hash,
    state: Mutex<State>,
    clock: Mutex<i64>,
    front_run: Mutex<Vec<Transaction>>,
    landed: Mutex<Vec<Signature>>,
}

impl FakeLedger {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            deriver: AddressDeriver::new(program_id),
            blockhash: Hash::new_unique(),
            state: Mutex::new(State::default()),
            clock: Mutex::new(GENESIS_TIME),
            front_run: Mutex::new(Vec::new()),
            landed: Mutex::new(Vec::new()),
        }
    }

    pub fn program_id(&self) -> Pubkey {
        *self.deriver.program_id()
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn now(&self) -> i64 {
        *self.clock.lock().unwrap()
    }

    pub fn set_clock(&self, unix_timestamp: i64) {
        *self.clock.lock().unwrap() = unix_timestamp;
    }

    pub fn airdrop(&self, to: &Pubkey, lamports: u64) {
        *self.state.lock().unwrap().lamports.entry(*to).or_insert(0) += lamports;
    }

    pub fn balance(&self, address: &Pubkey) -> u64 {
        self.state
            .lock()
            .unwrap()
            .lamports
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Write raw bytes at `address`, bypassing every check.
    pub fn put_raw(&self, address: Pubkey, data: Vec<u8>) {
        self.state.lock().unwrap().accounts.insert(address, data);
    }

    pub fn raw(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.state.lock().unwrap().accounts.get(address).cloned()
    }

    pub fn put<T: LedgerAccount>(&self, address: Pubkey, account: &T) {
        self.state.lock().unwrap().store(address, account);
    }

    pub fn get<T: LedgerAccount>(&self, address: &Pubkey) -> Option<T> {
        self.state.lock().unwrap().load(address).ok()
    }

    /// Transactions that have landed, in order.
    pub fn landed(&self) -> Vec<Signature> {
        self.landed.lock().unwrap().clone()
    }

    /// Land `tx` right before the next submitted transaction, as if another
    /// client got there first.
    pub fn front_run_next(&self, tx: Transaction) {
        self.front_run.lock().unwrap().push(tx);
    }

    /// Run a transaction to completion, all instructions or none.
    pub fn process(&self, tx: &Transaction) -> std::result::Result<Signature, Rejection> {
        tx.verify()
            .map_err(|e| Rejection::new(format!("signature verification failed: {e}")))?;
        if tx.message.recent_blockhash != self.blockhash {
            return Err(Rejection::new("Blockhash not found"));
        }

        let now = self.now();
        let mut guard = self.state.lock().unwrap();
        let mut scratch = guard.clone();

        for (i, compiled) in tx.message.instructions.iter().enumerate() {
            let program = tx.message.account_keys[compiled.program_id_index as usize];
            if program != self.program_id() {
                return Err(Rejection::new(format!(
                    "Error processing Instruction {i}: unsupported program {program}"
                )));
            }
            let keys: Vec<Pubkey> = compiled
                .accounts
                .iter()
                .map(|&idx| tx.message.account_keys[idx as usize])
                .collect();
            let signers: Vec<bool> = compiled
                .accounts
                .iter()
                .map(|&idx| tx.message.is_signer(idx as usize))
                .collect();

            let Some(ix) = MarketInstruction::unpack(&compiled.data) else {
                return Err(Rejection::new(format!(
                    "Error processing Instruction {i}: invalid instruction data"
                )));
            };
            let name = ix.name();
            let ctx = Ctx {
                deriver: &self.deriver,
                keys: &keys,
                signers: &signers,
                now,
            };
            if let Err(code) = ctx.execute(&mut scratch, ix) {
                let program_id = self.program_id();
                let label = LedgerErrorCode::from_code(code)
                    .map(|c| format!("{c:?}"))
                    .unwrap_or_else(|| "Custom".to_string());
                return Err(Rejection::new(format!(
                    "Transaction simulation failed: Error processing Instruction {i}: custom program error: {code:#x}"
                ))
                .with_code(code)
                .with_logs(vec![
                    format!("Program {program_id} invoke [1]"),
                    format!("Program log: Instruction: {name}"),
                    format!("Program log: AnchorError occurred. Error Code: {label}. Error Number: {code}."),
                    format!("Program {program_id} failed: custom program error: {code:#x}"),
                ]));
            }
        }

        *guard = scratch;
        let sig = tx.signatures[0];
        self.landed.lock().unwrap().push(sig);
        Ok(sig)
    }
}

struct Ctx<'a> {
    deriver: &'a AddressDeriver,
    keys: &'a [Pubkey],
    signers: &'a [bool],
    now: i64,
}

type IxResult = std::result::Result<(), u32>;

fn require(cond: bool, code: LedgerErrorCode) -> IxResult {
    if cond {
        Ok(())
    } else {
        Err(code.code())
    }
}

fn overflow() -> u32 {
    LedgerErrorCode::Overflow.code()
}

impl Ctx<'_> {
    fn key(&self, i: usize) -> std::result::Result<Pubkey, u32> {
        self.keys
            .get(i)
            .copied()
            .ok_or(LedgerErrorCode::AccountNotInitialized.code())
    }

    fn signer(&self, i: usize) -> std::result::Result<Pubkey, u32> {
        let key = self.key(i)?;
        if self.signers.get(i).copied().unwrap_or(false) {
            Ok(key)
        } else {
            Err(ACCOUNT_NOT_SIGNER)
        }
    }

    fn seeds(&self, actual: &Pubkey, derived: Result<(Pubkey, u8)>) -> std::result::Result<u8, u32> {
        match derived {
            Ok((expected, bump)) if expected == *actual => Ok(bump),
            _ => Err(LedgerErrorCode::ConstraintSeeds.code()),
        }
    }

    fn execute(&self, state: &mut State, ix: MarketInstruction) -> IxResult {
        match ix {
            MarketInstruction::Initialize { fee_rate } => self.initialize(state, fee_rate),
            MarketInstruction::CreateMarket {
                question,
                initial_liquidity,
                close_time,
            } => self.create_market(state, question, initial_liquidity, close_time),
            MarketInstruction::PlaceBet { side, amount } => self.place_bet(state, side, amount),
            MarketInstruction::ResolveMarket { outcome } => self.resolve_market(state, outcome),
            MarketInstruction::ClaimPayout => self.claim_payout(state),
            MarketInstruction::ClaimLpFees => self.claim_lp_fees(state),
        }
    }

    fn initialize(&self, state: &mut State, fee_rate: u16) -> IxResult {
        let admin = self.signer(0)?;
        let global = self.key(1)?;
        let treasury = self.key(2)?;
        let bump = self.seeds(&global, self.deriver.global_state())?;
        require(!state.exists(&global), LedgerErrorCode::AccountAlreadyInUse)?;

        state.store(
            global,
            &GlobalState {
                market_counter: 0,
                fee_rate,
                protocol_treasury: treasury,
                admin,
                bump,
            },
        );
        Ok(())
    }

    fn create_market(
        &self,
        state: &mut State,
        question: [u8; 200],
        initial_liquidity: u64,
        close_time: i64,
    ) -> IxResult {
        let creator = self.signer(0)?;
        let global_addr = self.key(1)?;
        let market_addr = self.key(2)?;
        let lp_addr = self.key(3)?;
        let vault = self.key(4)?;

        let mut global: GlobalState = state.load(&global_addr)?;
        let market_id = global.market_counter + 1;
        let bump = self.seeds(&market_addr, self.deriver.market(market_id))?;
        require(!state.exists(&market_addr), LedgerErrorCode::AccountAlreadyInUse)?;
        let lp_bump = self.seeds(&lp_addr, self.deriver.lp_position(&market_addr, &creator))?;
        require(!state.exists(&lp_addr), LedgerErrorCode::AccountAlreadyInUse)?;
        let vault_bump = self.seeds(&vault, self.deriver.market_vault(&market_addr))?;

        let balance = state.lamports.get(&creator).copied().unwrap_or(0);
        require(balance > 0, LedgerErrorCode::InsufficientBalance)?;
        require(initial_liquidity > 0, LedgerErrorCode::InvalidLiquidity)?;
        require(initial_liquidity >= MIN_LIQUIDITY, LedgerErrorCode::LiquidityTooLow)?;
        require(close_time > self.now, LedgerErrorCode::InvalidCloseTime)?;
        require(question[0] != 0, LedgerErrorCode::EmptyQuestion)?;

        global.market_counter = market_id;
        state.store(global_addr, &global);

        let market = Market {
            market_id,
            question: flew_bridge::types::decode_question(&question),
            creator,
            resolver: creator,
            yes_pool: initial_liquidity / 2,
            no_pool: initial_liquidity / 2,
            total_liquidity: initial_liquidity,
            state: MarketState::Active,
            outcome: None,
            close_time,
            resolution_time: None,
            payout_ratio: 0,
            bump,
            vault_bump,
            lp_bump,
        };
        state.store(market_addr, &market);
        state.store(
            lp_addr,
            &LpPosition {
                lp_provider: creator,
                market: market_addr,
                liquidity_provided: initial_liquidity,
                fees_earned: 0,
                fees_claimed: false,
                fees_claimed_amount: 0,
                bump: lp_bump,
            },
        );
        state.transfer(&creator, &vault, initial_liquidity)
    }

    fn place_bet(&self, state: &mut State, side: bool, amount: u64) -> IxResult {
        let global_addr = self.key(0)?;
        let market_addr = self.key(1)?;
        let vault = self.key(2)?;
        let position_addr = self.key(3)?;
        let lp_addr = self.key(4)?;
        let treasury = self.key(5)?;
        let user = self.signer(6)?;

        let global: GlobalState = state.load(&global_addr)?;
        self.seeds(&global_addr, self.deriver.global_state())?;
        let mut market: Market = state.load(&market_addr)?;
        self.seeds(&market_addr, self.deriver.market(market.market_id))?;
        self.seeds(&vault, self.deriver.market_vault(&market_addr))?;
        let position_bump =
            self.seeds(&position_addr, self.deriver.position(&market_addr, &user))?;
        self.seeds(&lp_addr, self.deriver.lp_position(&market_addr, &market.creator))?;
        let mut lp: LpPosition = state.load(&lp_addr)?;
        require(
            treasury == global.protocol_treasury,
            LedgerErrorCode::ConstraintAddress,
        )?;

        require(market.state == MarketState::Active, LedgerErrorCode::MarketNotActive)?;
        require(self.now < market.close_time, LedgerErrorCode::MarketClosed)?;

        let total_fee = amount
            .checked_mul(u64::from(global.fee_rate))
            .ok_or_else(overflow)?
            / BPS_DENOMINATOR;
        let protocol_fee = total_fee * PROTOCOL_FEE_SHARE_PCT / 100;
        let lp_fee = total_fee * LP_FEE_SHARE_PCT / 100;
        let net_bet = amount.checked_sub(total_fee).ok_or_else(overflow)?;

        state.transfer(&user, &treasury, protocol_fee)?;
        state.transfer(&user, &vault, net_bet)?;

        let total_pool = market.yes_pool + market.no_pool;
        let side_pool = if side { market.yes_pool } else { market.no_pool };
        let entry_odds = side_pool
            .checked_mul(ODDS_SCALE)
            .ok_or_else(overflow)?
            .checked_div(total_pool)
            .ok_or_else(overflow)?;

        if side {
            market.yes_pool = market.yes_pool.checked_add(net_bet).ok_or_else(overflow)?;
        } else {
            market.no_pool = market.no_pool.checked_add(net_bet).ok_or_else(overflow)?;
        }
        market.total_liquidity = market
            .total_liquidity
            .checked_add(net_bet)
            .ok_or_else(overflow)?;
        lp.fees_earned = lp.fees_earned.checked_add(lp_fee).ok_or_else(overflow)?;

        let position = match state.load::<Position>(&position_addr) {
            Ok(mut existing) if existing.amount > 0 => {
                require(existing.side == side, LedgerErrorCode::CannotBetBothSides)?;
                existing.amount = existing.amount.checked_add(net_bet).ok_or_else(overflow)?;
                existing
            }
            _ => Position {
                user,
                market: market_addr,
                side,
                amount: net_bet,
                entry_odds,
                claimed: false,
                bump: position_bump,
            },
        };

        state.store(market_addr, &market);
        state.store(lp_addr, &lp);
        state.store(position_addr, &position);
        Ok(())
    }

    fn resolve_market(&self, state: &mut State, outcome: bool) -> IxResult {
        let market_addr = self.key(0)?;
        let resolver = self.signer(1)?;

        let mut market: Market = state.load(&market_addr)?;
        self.seeds(&market_addr, self.deriver.market(market.market_id))?;
        require(resolver == market.resolver, LedgerErrorCode::ConstraintAddress)?;
        require(market.state == MarketState::Active, LedgerErrorCode::MarketNotActive)?;
        require(self.now > market.close_time, LedgerErrorCode::MarketStillOpen)?;

        market.outcome = Some(outcome);
        market.state = MarketState::Resolved;
        state.store(market_addr, &market);
        Ok(())
    }

    fn claim_payout(&self, state: &mut State) -> IxResult {
        let market_addr = self.key(0)?;
        let position_addr = self.key(1)?;
        let vault = self.key(2)?;
        let user = self.signer(3)?;

        let market: Market = state.load(&market_addr)?;
        self.seeds(&market_addr, self.deriver.market(market.market_id))?;
        let mut position: Position = state.load(&position_addr)?;
        self.seeds(&position_addr, self.deriver.position(&market_addr, &user))?;
        self.seeds(&vault, self.deriver.market_vault(&market_addr))?;

        let outcome = market.outcome.ok_or(LedgerErrorCode::NotResolved.code())?;
        require(market.state == MarketState::Resolved, LedgerErrorCode::NotResolved)?;
        require(!position.claimed, LedgerErrorCode::AlreadyClaimed)?;
        require(position.side == outcome, LedgerErrorCode::PositionLost)?;

        let payout = position
            .projected_payout(&market)
            .ok_or_else(overflow)?;
        state.transfer(&vault, &user, payout)?;

        position.claimed = true;
        state.store(position_addr, &position);
        Ok(())
    }

    fn claim_lp_fees(&self, state: &mut State) -> IxResult {
        let market_addr = self.key(0)?;
        let lp_addr = self.key(1)?;
        let vault = self.key(2)?;
        let creator = self.signer(3)?;

        let market: Market = state.load(&market_addr)?;
        self.seeds(&market_addr, self.deriver.market(market.market_id))?;
        self.seeds(&lp_addr, self.deriver.lp_position(&market_addr, &market.creator))?;
        let mut lp: LpPosition = state.load(&lp_addr)?;
        self.seeds(&vault, self.deriver.market_vault(&market_addr))?;
        require(creator == market.creator, LedgerErrorCode::ConstraintAddress)?;

        require(lp.fees_earned > 0, LedgerErrorCode::NoFeesToClaim)?;
        let fees = lp.fees_earned;
        lp.fees_claimed = true;
        lp.fees_claimed_amount = lp.fees_claimed_amount.checked_add(fees).ok_or_else(overflow)?;
        lp.fees_earned = 0;
        state.store(lp_addr, &lp);
        state.transfer(&vault, &creator, fees)
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().unwrap().accounts.get(address).cloned())
    }

    async fn scan_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        if *program_id != self.program_id() {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        let mut out: Vec<(Pubkey, Vec<u8>)> = state
            .accounts
            .iter()
            .filter(|(_, data)| filters.iter().all(|f| f.matches(data)))
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        Ok(out)
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(self.blockhash)
    }

    async fn send_and_confirm(&self, tx: &Transaction) -> std::result::Result<Signature, Rejection> {
        let queued: Vec<Transaction> = self.front_run.lock().unwrap().drain(..).collect();
        for other in &queued {
            self.process(other)?;
        }
        self.process(tx)
    }
}

// ---------- fixtures ----------

pub type TestOrchestrator = MarketOrchestrator<FakeLedger, KeypairDirDelegate>;

pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub delegate: Arc<KeypairDirDelegate>,
    pub orchestrator: TestOrchestrator,
    dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FakeLedger::new(Pubkey::new_unique()));
        let delegate = Arc::new(KeypairDirDelegate::new(dir.path()));
        let orchestrator =
            MarketOrchestrator::new(Arc::clone(&ledger), Arc::clone(&delegate), ledger.program_id());
        Self {
            ledger,
            delegate,
            orchestrator,
            dir,
        }
    }

    pub fn key_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Create a wallet for `user_id` and fund it.
    pub async fn funded_user(&self, user_id: &str, lamports: u64) -> Pubkey {
        use flew_bridge::SigningDelegate;
        let wallet = self.delegate.create_wallet(user_id).await.unwrap();
        self.ledger.airdrop(&wallet.address, lamports);
        wallet.address
    }

    /// Initialized program with `fee_rate` and a fresh treasury.
    pub async fn initialized(fee_rate: u16) -> (Self, Pubkey) {
        let h = Self::new();
        h.funded_user("admin", SOL).await;
        let treasury = Pubkey::new_unique();
        h.orchestrator
            .initialize("admin", fee_rate, Some(treasury))
            .await
            .unwrap();
        (h, treasury)
    }
}

/// A `create_market` transaction for the next id, signed by an outside key.
pub fn rival_create_market(ledger: &FakeLedger, rival: &Keypair, question: &str) -> Transaction {
    let deriver = ledger.deriver();
    let (global_state, _) = deriver.global_state().unwrap();
    let counter = ledger
        .get::<GlobalState>(&global_state)
        .map(|g| g.market_counter)
        .unwrap_or(0);
    let addrs = deriver.market_addresses(counter + 1).unwrap();
    let (lp_position, _) = deriver.lp_position(&addrs.market, &rival.pubkey()).unwrap();
    let ix = instructions::create_market(
        &ledger.program_id(),
        &CreateMarketAccounts {
            creator: rival.pubkey(),
            global_state,
            market: addrs.market,
            lp_position,
            market_vault: addrs.vault,
        },
        encode_question(question),
        SOL,
        ledger.now() + 3_600,
    );
    Transaction::new_signed_with_payer(&[ix], Some(&rival.pubkey()), &[rival], ledger.blockhash())
}
