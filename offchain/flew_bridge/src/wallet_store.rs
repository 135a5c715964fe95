// offchain/src/wallet_store.rs
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{info, warn};

use crate::delegate::DelegateError;

/// Durable identity -> wallet id map, kept as one JSON object on disk.
///
/// Loaded once at startup; every insert rewrites the whole file.
pub struct WalletStore {
    path: PathBuf,
    mappings: Mutex<BTreeMap<String, String>>,
}

impl WalletStore {
    /// Load the store at `path`. A missing, unreadable or corrupt file
    /// yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mappings = load_mappings(&path);
        Self {
            path,
            mappings: Mutex::new(mappings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, user_id: &str) -> Option<String> {
        self.lock().get(user_id).cloned()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.lock().contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Record `user_id -> wallet_id` and persist the full map.
    ///
    /// The lock is held until the file is written, so concurrent inserts
    /// reach the disk in the same order they reach the map.
    pub fn insert(&self, user_id: &str, wallet_id: &str) -> Result<(), DelegateError> {
        let mut map = self.lock();
        map.insert(user_id.to_string(), wallet_id.to_string());
        self.save(&map)
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), DelegateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DelegateError::Store(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(map).map_err(|e| DelegateError::Store(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| {
            DelegateError::Store(format!("writing {}: {e}", self.path.display()))
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a valid map.
        self.mappings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_mappings(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|data| {
            serde_json::from_str::<BTreeMap<String, String>>(&data).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(map) => {
            info!("[wallets] loaded {} user-wallet mapping(s)", map.len());
            map
        }
        Err(e) => {
            warn!("[wallets] could not load {}: {e}; starting empty", path.display());
            BTreeMap::new()
        }
    }
}
