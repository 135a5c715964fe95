use std::{env, str::FromStr, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use solana_sdk::{pubkey::Pubkey, signature::Signer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flew_bridge::{
    format::{format_market, format_position},
    keypair::read_keypair,
    Batch, BridgeConfig, InitializeOutcome, KeypairDirDelegate, MarketOrchestrator, MarketReader,
    RpcLedger,
};

const ADMIN_IDENTITY: &str = "admin";

const USAGE: &str = "usage: flew-bridge <initialize | markets | market <id> | positions <pubkey>>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flew_bridge=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = BridgeConfig::from_env()?;
    let ledger = Arc::new(RpcLedger::new(cfg.rpc_url.clone(), cfg.confirm_timeout));

    info!("[bridge] Program: {}", cfg.program_id);
    info!("[bridge] RPC:     {}", ledger.url());

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("");

    match command {
        "initialize" => initialize(&cfg, ledger).await?,
        "markets" => {
            let reader = MarketReader::new(ledger, cfg.program_id);
            let batch = reader.list_active_markets().await?;
            report_skipped(&batch);
            if batch.is_empty() {
                println!("No active markets.");
            }
            let now = chrono::Utc::now().timestamp();
            for m in batch.items {
                println!("{}\n", format_market(&m.account, now));
            }
        }
        "market" => {
            let id: u64 = args
                .get(2)
                .ok_or_else(|| anyhow!(USAGE))?
                .parse()
                .context("market id must be a number")?;
            let reader = MarketReader::new(ledger, cfg.program_id);
            match reader.get_market(id).await? {
                Some(m) => {
                    println!("Address: {}", m.address);
                    println!("{}", format_market(&m.account, chrono::Utc::now().timestamp()));
                }
                None => println!("Market #{id} not found."),
            }
        }
        "positions" => {
            let user = args.get(2).ok_or_else(|| anyhow!(USAGE))?;
            let user = Pubkey::from_str(user).context("invalid wallet address")?;
            let reader = MarketReader::new(ledger, cfg.program_id);
            let positions = reader.get_user_positions(&user).await?;
            report_skipped(&positions);
            if positions.is_empty() {
                println!("No positions for {user}.");
            }
            let markets = reader.list_markets().await?;
            for p in positions.items {
                let question = markets
                    .items
                    .iter()
                    .find(|m| m.address == p.account.market)
                    .map(|m| m.account.question.as_str());
                println!("{}\n", format_position(&p.account, question));
            }
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

async fn initialize(cfg: &BridgeConfig, ledger: Arc<RpcLedger>) -> Result<()> {
    let admin = read_keypair(&cfg.admin_keypair_path)
        .with_context(|| format!("loading admin key {}", cfg.admin_keypair_path.display()))?;
    info!("[bridge] Admin:   {}", admin.pubkey());

    let key_dir = cfg
        .admin_keypair_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    let delegate = Arc::new(
        KeypairDirDelegate::new(key_dir).with_pinned(ADMIN_IDENTITY, cfg.admin_keypair_path.clone()),
    );
    let orchestrator = MarketOrchestrator::new(ledger, delegate, cfg.program_id);

    match orchestrator
        .initialize(ADMIN_IDENTITY, cfg.protocol_fee_bps, Some(admin.pubkey()))
        .await?
    {
        InitializeOutcome::AlreadyInitialized(state) => {
            println!("Program already initialized.");
            println!("  Admin:          {}", state.admin);
            println!("  Treasury:       {}", state.protocol_treasury);
            println!("  Fee rate (bps): {}", state.fee_rate);
            println!("  Market counter: {}", state.market_counter);
        }
        InitializeOutcome::Initialized(sig) => {
            println!("Program initialized. Signature: {sig}");
        }
    }
    Ok(())
}

fn report_skipped<T>(batch: &Batch<T>) {
    for s in &batch.skipped {
        warn!("[bridge] skipped account {}: {}", s.address, s.reason);
    }
}
