// offchain/src/format.rs
//! Human-readable renderings for chat front-ends.

use chrono::DateTime;
use solana_sdk::native_token::LAMPORTS_PER_SOL;

use crate::types::{Market, Position};

pub fn format_sol(lamports: u64) -> String {
    format!("{:.4}", lamports as f64 / LAMPORTS_PER_SOL as f64)
}

/// (YES %, NO %) as each pool's share of total liquidity. 50/50 on an
/// empty market.
pub fn market_odds(market: &Market) -> (f64, f64) {
    if market.total_liquidity == 0 {
        return (50.0, 50.0);
    }
    let total = market.total_liquidity as f64;
    (
        market.yes_pool as f64 / total * 100.0,
        market.no_pool as f64 / total * 100.0,
    )
}

/// Odds with one decimal, e.g. `("30.0", "70.0")`.
pub fn format_odds(market: &Market) -> (String, String) {
    let (yes, no) = market_odds(market);
    (format!("{yes:.1}"), format!("{no:.1}"))
}

pub fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("@{timestamp}"))
}

pub fn format_market(market: &Market, now: i64) -> String {
    let (yes_odds, no_odds) = format_odds(market);
    let closed = market.close_time < now;
    let outcome = match market.outcome {
        Some(true) => " | Outcome: YES",
        Some(false) => " | Outcome: NO",
        None => "",
    };
    format!(
        "*Market #{}*\n{}\n\nTotal Pool: {} SOL\nYES: {} ({yes_odds}%) | NO: {} ({no_odds}%)\n{}: {}\nStatus: {}{outcome}",
        market.market_id,
        market.question,
        format_sol(market.total_liquidity),
        format_sol(market.yes_pool),
        format_sol(market.no_pool),
        if closed { "Closed" } else { "Closes" },
        format_date(market.close_time),
        market.state,
    )
}

pub fn format_position(position: &Position, question: Option<&str>) -> String {
    let market = position.market.to_string();
    let short: String = market.chars().take(16).collect();
    format!(
        "*Position*\n{}Market: `{short}...`\nSide: {}\nAmount: {} SOL\nEntry Odds: {:.2}%\nStatus: {}",
        question.map(|q| format!("Q: {q}\n")).unwrap_or_default(),
        if position.side { "YES" } else { "NO" },
        format_sol(position.amount),
        position.entry_odds as f64 / 10_000.0,
        if position.claimed { "Claimed" } else { "Pending" },
    )
}
