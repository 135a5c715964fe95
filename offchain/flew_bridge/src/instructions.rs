// offchain/src/instructions.rs
//! Instruction builders. Account order mirrors the program's account
//! structs and must not change.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use crate::protocol::{MarketInstruction, QUESTION_LEN};

#[derive(Debug, Clone, Copy)]
pub struct InitializeAccounts {
    pub admin: Pubkey,
    pub global_state: Pubkey,
    pub protocol_treasury: Pubkey,
}

pub fn initialize(program_id: &Pubkey, accounts: &InitializeAccounts, fee_rate: u16) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(accounts.admin, true),
            AccountMeta::new(accounts.global_state, false),
            AccountMeta::new_readonly(accounts.protocol_treasury, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: MarketInstruction::Initialize { fee_rate }.pack(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreateMarketAccounts {
    pub creator: Pubkey,
    pub global_state: Pubkey,
    pub market: Pubkey,
    pub lp_position: Pubkey,
    pub market_vault: Pubkey,
}

pub fn create_market(
    program_id: &Pubkey,
    accounts: &CreateMarketAccounts,
    question: [u8; QUESTION_LEN],
    initial_liquidity: u64,
    close_time: i64,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(accounts.creator, true),
            AccountMeta::new(accounts.global_state, false),
            AccountMeta::new(accounts.market, false),
            AccountMeta::new(accounts.lp_position, false),
            AccountMeta::new(accounts.market_vault, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: MarketInstruction::CreateMarket {
            question,
            initial_liquidity,
            close_time,
        }
        .pack(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlaceBetAccounts {
    pub global_state: Pubkey,
    pub market: Pubkey,
    pub market_vault: Pubkey,
    pub position: Pubkey,
    pub lp_position: Pubkey,
    pub protocol_treasury: Pubkey,
    pub user: Pubkey,
}

pub fn place_bet(program_id: &Pubkey, accounts: &PlaceBetAccounts, side: bool, amount: u64) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.global_state, false),
            AccountMeta::new(accounts.market, false),
            AccountMeta::new(accounts.market_vault, false),
            AccountMeta::new(accounts.position, false),
            AccountMeta::new(accounts.lp_position, false),
            AccountMeta::new(accounts.protocol_treasury, false),
            AccountMeta::new(accounts.user, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: MarketInstruction::PlaceBet { side, amount }.pack(),
    }
}

pub fn resolve_market(program_id: &Pubkey, market: &Pubkey, resolver: &Pubkey, outcome: bool) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*market, false),
            AccountMeta::new_readonly(*resolver, true),
        ],
        data: MarketInstruction::ResolveMarket { outcome }.pack(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClaimPayoutAccounts {
    pub market: Pubkey,
    pub position: Pubkey,
    pub market_vault: Pubkey,
    pub user: Pubkey,
}

pub fn claim_payout(program_id: &Pubkey, accounts: &ClaimPayoutAccounts) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.market, false),
            AccountMeta::new(accounts.position, false),
            AccountMeta::new(accounts.market_vault, false),
            AccountMeta::new(accounts.user, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: MarketInstruction::ClaimPayout.pack(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClaimLpFeesAccounts {
    pub market: Pubkey,
    pub lp_position: Pubkey,
    pub market_vault: Pubkey,
    pub creator: Pubkey,
}

pub fn claim_lp_fees(program_id: &Pubkey, accounts: &ClaimLpFeesAccounts) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.market, false),
            AccountMeta::new(accounts.lp_position, false),
            AccountMeta::new(accounts.market_vault, false),
            AccountMeta::new(accounts.creator, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: MarketInstruction::ClaimLpFees.pack(),
    }
}
