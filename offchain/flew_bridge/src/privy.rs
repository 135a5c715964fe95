// offchain/src/privy.rs
//! Privy server wallets as the signing delegate.
//!
//! Wallets are app-owned MPC wallets; Privy signs on request and never
//! returns key material. Transactions travel as base64 of the bincode wire
//! format.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::delegate::{DelegateError, RecoveryDescriptor, SigningDelegate, WalletHandle};
use crate::wallet_store::WalletStore;

pub const PRIVY_RECOVERY_METHOD: &str = "privy-embedded-wallet";

#[derive(Debug, Clone)]
pub struct PrivyConfig {
    pub api_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CreateWalletRequest<'a> {
    chain_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct WalletResponse {
    id: String,
    address: String,
}

#[derive(Serialize)]
struct SignTransactionRequest<'a> {
    method: &'a str,
    params: SignTransactionParams,
}

#[derive(Serialize)]
struct SignTransactionParams {
    transaction: String,
    encoding: &'static str,
}

#[derive(Debug, Deserialize)]
struct SignTransactionResponse {
    data: SignedTransactionData,
}

#[derive(Debug, Deserialize)]
struct SignedTransactionData {
    signed_transaction: String,
}

pub fn encode_transaction(tx: &Transaction) -> Result<String, DelegateError> {
    let bytes = bincode::serialize(tx).map_err(|e| DelegateError::Signing(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

pub fn decode_transaction(encoded: &str) -> Result<Transaction, DelegateError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| DelegateError::InvalidResponse(format!("bad base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| DelegateError::InvalidResponse(format!("bad transaction bytes: {e}")))
}

pub struct PrivyDelegate {
    cfg: PrivyConfig,
    http: reqwest::Client,
    store: WalletStore,
    create_lock: Mutex<()>,
}

impl PrivyDelegate {
    pub fn new(cfg: PrivyConfig, store: WalletStore) -> Result<Self, DelegateError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| DelegateError::Unreachable(e.to_string()))?;
        Ok(Self {
            cfg,
            http,
            store,
            create_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.cfg.api_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.cfg.app_id, Some(&self.cfg.app_secret))
            .header("privy-app-id", &self.cfg.app_id)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, DelegateError> {
        let response = req
            .send()
            .await
            .map_err(|e| DelegateError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DelegateError::Service {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| DelegateError::InvalidResponse(e.to_string()))
    }

    async fn fetch_wallet(&self, wallet_id: &str) -> Result<WalletHandle, DelegateError> {
        let wallet: WalletResponse = self
            .send(self.request(reqwest::Method::GET, &format!("wallets/{wallet_id}")))
            .await?;
        to_handle(wallet)
    }
}

fn to_handle(wallet: WalletResponse) -> Result<WalletHandle, DelegateError> {
    let address = Pubkey::from_str(&wallet.address)
        .map_err(|e| DelegateError::InvalidResponse(format!("wallet address: {e}")))?;
    Ok(WalletHandle {
        wallet_id: wallet.id,
        address,
    })
}

#[async_trait]
impl SigningDelegate for PrivyDelegate {
    async fn map_identity(&self, user_id: &str) -> Result<Option<WalletHandle>, DelegateError> {
        let Some(wallet_id) = self.store.get(user_id) else {
            return Ok(None);
        };
        match self.fetch_wallet(&wallet_id).await {
            Ok(handle) => Ok(Some(handle)),
            Err(DelegateError::Service { status: 404, .. }) => {
                warn!("[privy] wallet {wallet_id} mapped to user {user_id} no longer exists");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_wallet(&self, user_id: &str) -> Result<WalletHandle, DelegateError> {
        // Serialize creation so two calls for one user cannot mint two wallets.
        let _guard = self.create_lock.lock().await;

        if let Some(wallet_id) = self.store.get(user_id) {
            let handle = self.fetch_wallet(&wallet_id).await?;
            info!("[privy] user {user_id} already has wallet {}", handle.address);
            return Ok(handle);
        }

        let created: WalletResponse = self
            .send(
                self.request(reqwest::Method::POST, "wallets")
                    .json(&CreateWalletRequest {
                        chain_type: "solana",
                    }),
            )
            .await?;
        let handle = to_handle(created)?;
        self.store.insert(user_id, &handle.wallet_id)?;
        info!("[privy] created wallet for user {user_id}: {}", handle.address);
        Ok(handle)
    }

    async fn sign(&self, wallet: &WalletHandle, tx: Transaction) -> Result<Transaction, DelegateError> {
        let body = SignTransactionRequest {
            method: "signTransaction",
            params: SignTransactionParams {
                transaction: encode_transaction(&tx)?,
                encoding: "base64",
            },
        };
        let response: SignTransactionResponse = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("wallets/{}/rpc", wallet.wallet_id),
                )
                .json(&body),
            )
            .await?;
        let signed = decode_transaction(&response.data.signed_transaction)?;
        if signed.message != tx.message {
            return Err(DelegateError::InvalidResponse(
                "signed transaction does not match the request".to_string(),
            ));
        }
        Ok(signed)
    }

    async fn export_wallet(&self, user_id: &str) -> Result<RecoveryDescriptor, DelegateError> {
        let wallet_id = self
            .store
            .get(user_id)
            .ok_or_else(|| DelegateError::WalletNotFound(user_id.to_string()))?;
        let handle = self.fetch_wallet(&wallet_id).await?;
        Ok(RecoveryDescriptor {
            address: handle.address,
            wallet_id: handle.wallet_id,
            recovery_method: PRIVY_RECOVERY_METHOD.to_string(),
        })
    }

    fn has_wallet(&self, user_id: &str) -> bool {
        self.store.contains(user_id)
    }
}
