// offchain/src/config.rs
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use solana_sdk::pubkey::Pubkey;

use crate::error::{BridgeError, Result};
use crate::privy::PrivyConfig;
use crate::protocol::{BPS_DENOMINATOR, DEFAULT_PROGRAM_ID};

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_PRIVY_API_URL: &str = "https://api.privy.io";
pub const DEFAULT_WALLET_MAPPINGS_PATH: &str = "wallets/privy-user-mappings.json";
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PROTOCOL_FEE_BPS: u16 = 200;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub rpc_url: String,
    pub program_id: Pubkey,
    pub confirm_timeout: Duration,
    pub privy_app_id: Option<String>,
    pub privy_app_secret: Option<String>,
    pub privy_api_url: String,
    pub wallet_mappings_path: PathBuf,
    pub admin_keypair_path: PathBuf,
    pub protocol_fee_bps: u16,
}

impl BridgeConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let program_id = match get("PROGRAM_ID") {
            Some(raw) => Pubkey::from_str(raw.trim())
                .map_err(|e| BridgeError::Config(format!("PROGRAM_ID {raw:?}: {e}")))?,
            None => Pubkey::from_str(DEFAULT_PROGRAM_ID)
                .map_err(|e| BridgeError::Config(format!("default program id: {e}")))?,
        };

        let confirm_timeout_secs = parse_or(&get, "CONFIRM_TIMEOUT_SECS", DEFAULT_CONFIRM_TIMEOUT_SECS)?;
        if confirm_timeout_secs == 0 {
            return Err(BridgeError::Config(
                "CONFIRM_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let protocol_fee_bps = parse_or(&get, "PROTOCOL_FEE_BPS", DEFAULT_PROTOCOL_FEE_BPS)?;
        if u64::from(protocol_fee_bps) > BPS_DENOMINATOR {
            return Err(BridgeError::Config(format!(
                "PROTOCOL_FEE_BPS {protocol_fee_bps} exceeds {BPS_DENOMINATOR}"
            )));
        }

        let admin_keypair_path = match get("ADMIN_KEYPAIR_PATH") {
            Some(p) => PathBuf::from(p),
            None => dirs::home_dir()
                .ok_or_else(|| BridgeError::Config("no home dir for ADMIN_KEYPAIR_PATH".to_string()))?
                .join(".config/solana/id.json"),
        };

        Ok(Self {
            rpc_url: get("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            program_id,
            confirm_timeout: Duration::from_secs(confirm_timeout_secs),
            privy_app_id: get("PRIVY_APP_ID"),
            privy_app_secret: get("PRIVY_APP_SECRET"),
            privy_api_url: get("PRIVY_API_URL").unwrap_or_else(|| DEFAULT_PRIVY_API_URL.to_string()),
            wallet_mappings_path: get("WALLET_MAPPINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WALLET_MAPPINGS_PATH)),
            admin_keypair_path,
            protocol_fee_bps,
        })
    }

    /// Credentials for the custodial signer, if both are set.
    pub fn privy_config(&self) -> Option<PrivyConfig> {
        let app_id = self.privy_app_id.clone()?;
        let app_secret = self.privy_app_secret.clone()?;
        Some(PrivyConfig {
            api_url: self.privy_api_url.clone(),
            app_id,
            app_secret,
            timeout: self.confirm_timeout,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BridgeError::Config(format!("{key} {raw:?}: {e}"))),
        None => Ok(default),
    }
}
