//! SDK configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use kin_memo::memo::MAX_VERSION;
use kin_memo::CURRENT_VERSION;
use kin_solana::PublicKey;
use kin_storage::{FileStore, TransactionStateCache};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SdkError;

/// Kin token mint on mainnet (`kinXdEcpDQeHPEuQnqmUgtYykqKGVFq6CeVX5iAHJq6`).
pub const MAINNET_KIN_MINT: PublicKey = PublicKey::new([
    11, 51, 56, 160, 171, 44, 200, 65, 213, 176, 20, 188, 106, 60, 247, 86, 41, 24, 116, 179, 25,
    201, 81, 125, 155, 191, 169, 228, 233, 102, 30, 249,
]);

/// Kin token mint on testnet (`KinDesK3dYWo3R2wDk6Ucaf31tvQCCSYyL8Fuqp33GX`).
pub const TESTNET_KIN_MINT: PublicKey = PublicKey::new([
    4, 203, 177, 231, 50, 196, 176, 149, 105, 20, 234, 249, 2, 87, 247, 98, 185, 42, 178, 83, 248,
    34, 205, 159, 214, 224, 55, 133, 9, 93, 219, 12,
]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KinNetwork {
    Mainnet,
    #[default]
    Testnet,
}

impl KinNetwork {
    pub fn name(&self) -> &'static str {
        match self {
            KinNetwork::Mainnet => "Kin Mainnet",
            KinNetwork::Testnet => "Kin Testnet",
        }
    }

    /// Directory name used to keep each network's storage apart.
    pub fn storage_id(&self) -> &'static str {
        match self {
            KinNetwork::Mainnet => "mainnet",
            KinNetwork::Testnet => "testnet",
        }
    }

    pub fn mint(&self) -> PublicKey {
        match self {
            KinNetwork::Mainnet => MAINNET_KIN_MINT,
            KinNetwork::Testnet => TESTNET_KIN_MINT,
        }
    }
}

impl fmt::Display for KinNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the client needs to know about its deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub network: KinNetwork,
    /// App index written into every memo; 0 means no registered app.
    pub app_index: u16,
    /// Memo version to write. Must fit in four bits.
    pub memo_version: u8,
    /// Root of the on-disk cache. `None` keeps the cache in memory.
    pub storage_dir: Option<PathBuf>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            network: KinNetwork::default(),
            app_index: 0,
            memo_version: CURRENT_VERSION,
            storage_dir: None,
        }
    }
}

impl SdkConfig {
    pub fn new(network: KinNetwork) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn with_app_index(mut self, app_index: u16) -> Self {
        self.app_index = app_index;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, SdkError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SdkError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.memo_version > MAX_VERSION {
            return Err(SdkError::InvalidConfig(format!(
                "memo_version {} exceeds {MAX_VERSION}",
                self.memo_version
            )));
        }
        Ok(())
    }

    /// Open the transaction cache this configuration describes, loading any
    /// state already on disk.
    pub fn open_cache(&self) -> Result<TransactionStateCache, SdkError> {
        match &self.storage_dir {
            Some(dir) => {
                info!(dir = ?dir, network = %self.network, "opening file-backed cache");
                Ok(TransactionStateCache::load(FileStore::new(
                    dir,
                    self.network.storage_id(),
                ))?)
            }
            None => Ok(TransactionStateCache::in_memory()),
        }
    }
}
