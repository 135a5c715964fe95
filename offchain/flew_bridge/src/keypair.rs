// offchain/src/keypair.rs
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use solana_sdk::{
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::delegate::{DelegateError, RecoveryDescriptor, SigningDelegate, WalletHandle};

pub const KEYPAIR_RECOVERY_METHOD: &str = "local-keypair-file";

/// Read a solana-keygen JSON keypair file.
pub fn read_keypair(path: &Path) -> Result<Keypair, DelegateError> {
    let data = fs::read_to_string(path)
        .map_err(|e| DelegateError::Store(format!("reading {}: {e}", path.display())))?;
    let bytes: Vec<u8> =
        serde_json::from_str(&data).map_err(|e| DelegateError::Store(e.to_string()))?;
    Keypair::from_bytes(&bytes).map_err(|e| DelegateError::Store(e.to_string()))
}

fn write_keypair(path: &Path, kp: &Keypair) -> Result<(), DelegateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DelegateError::Store(e.to_string()))?;
    }
    let bytes = kp.to_bytes().to_vec();
    let json = serde_json::to_string(&bytes).map_err(|e| DelegateError::Store(e.to_string()))?;
    fs::write(path, json).map_err(|e| DelegateError::Store(e.to_string()))
}

/// Signing delegate holding one solana-keygen file per identity.
///
/// Keys are read from disk at signing time and never handed out. Used for
/// the admin key and for local development.
pub struct KeypairDirDelegate {
    dir: PathBuf,
    pinned: HashMap<String, PathBuf>,
    create_lock: Mutex<()>,
}

impl KeypairDirDelegate {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pinned: HashMap::new(),
            create_lock: Mutex::new(()),
        }
    }

    /// Serve `identity` from an existing keypair file outside the directory,
    /// e.g. `~/.config/solana/id.json` for the admin.
    pub fn with_pinned(mut self, identity: &str, path: impl Into<PathBuf>) -> Self {
        self.pinned.insert(identity.to_string(), path.into());
        self
    }

    /// Key file for `user_id`. Unpinned identities must be plain names so
    /// the file stays inside the key directory.
    fn path_for(&self, user_id: &str) -> Result<PathBuf, DelegateError> {
        if let Some(path) = self.pinned.get(user_id) {
            return Ok(path.clone());
        }
        Self::valid_identity(user_id)?;
        Ok(self.dir.join(format!("{user_id}.json")))
    }

    fn handle(user_id: &str, kp: &Keypair) -> WalletHandle {
        WalletHandle {
            wallet_id: user_id.to_string(),
            address: kp.pubkey(),
        }
    }

    fn valid_identity(user_id: &str) -> Result<(), DelegateError> {
        let ok = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if ok {
            Ok(())
        } else {
            Err(DelegateError::Store(format!("invalid identity {user_id:?}")))
        }
    }
}

#[async_trait]
impl SigningDelegate for KeypairDirDelegate {
    async fn map_identity(&self, user_id: &str) -> Result<Option<WalletHandle>, DelegateError> {
        let path = self.path_for(user_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let kp = read_keypair(&path)?;
        Ok(Some(Self::handle(user_id, &kp)))
    }

    async fn create_wallet(&self, user_id: &str) -> Result<WalletHandle, DelegateError> {
        let path = self.path_for(user_id)?;
        let _guard = self.create_lock.lock().await;

        if path.exists() {
            let kp = read_keypair(&path)?;
            info!("[wallets] user {user_id} already has wallet {}", kp.pubkey());
            return Ok(Self::handle(user_id, &kp));
        }

        let kp = Keypair::new();
        write_keypair(&path, &kp)?;
        info!("[wallets] created wallet for user {user_id}: {}", kp.pubkey());
        Ok(Self::handle(user_id, &kp))
    }

    async fn sign(&self, wallet: &WalletHandle, mut tx: Transaction) -> Result<Transaction, DelegateError> {
        let path = self.path_for(&wallet.wallet_id)?;
        if !path.exists() {
            return Err(DelegateError::WalletNotFound(wallet.wallet_id.clone()));
        }
        let kp = read_keypair(&path)?;
        if kp.pubkey() != wallet.address {
            return Err(DelegateError::Signing(format!(
                "wallet {} does not hold key for {}",
                wallet.wallet_id, wallet.address
            )));
        }
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&kp], blockhash)
            .map_err(|e| DelegateError::Signing(e.to_string()))?;
        Ok(tx)
    }

    async fn export_wallet(&self, user_id: &str) -> Result<RecoveryDescriptor, DelegateError> {
        let handle = self
            .map_identity(user_id)
            .await?
            .ok_or_else(|| DelegateError::WalletNotFound(user_id.to_string()))?;
        Ok(RecoveryDescriptor {
            address: handle.address,
            wallet_id: handle.wallet_id,
            recovery_method: KEYPAIR_RECOVERY_METHOD.to_string(),
        })
    }

    fn has_wallet(&self, user_id: &str) -> bool {
        self.path_for(user_id).is_ok_and(|path| path.exists())
    }
}
