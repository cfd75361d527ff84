//! Registry snapshot storage
//!
//! The whole registry is written as one bincode record and overwritten on
//! every store. A record that fails to decode, or carries an unknown
//! version, is treated as absent and the registry rebuilds from the chain.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use swarmnet_core::PublicKey;
use tracing::warn;

use crate::errors::{StateError, StateResult};
use crate::quorum::QuorumState;
use crate::rollback::RollbackEvent;
use crate::service_node_info::{KeyImageBlacklistEntry, ServiceNodeInfo, ServiceNodePubkeyInfo};

pub const STORE_VERSION: u8 = 1;

/// Where the registry keeps its snapshot
pub trait ServiceNodeStore: Send + Sync {
    fn load(&self) -> StateResult<Option<Vec<u8>>>;
    fn store(&self, data: &[u8]) -> StateResult<()>;
    fn clear(&self) -> StateResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumStateForHeight {
    pub height: u64,
    pub state: QuorumState,
}

/// Persisted registry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u8,
    pub height: u64,
    pub quorum_states: Vec<QuorumStateForHeight>,
    pub infos: Vec<ServiceNodePubkeyInfo>,
    pub events: Vec<RollbackEvent>,
    pub key_image_blacklist: Vec<KeyImageBlacklistEntry>,
}

impl RegistrySnapshot {
    pub fn encode(&self) -> StateResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// `None` when the bytes are not a snapshot of the current version
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match bincode::deserialize::<Self>(bytes) {
            Ok(snapshot) if snapshot.version == STORE_VERSION => Some(snapshot),
            Ok(snapshot) => {
                warn!(version = snapshot.version, "ignoring registry snapshot with unknown version");
                None
            }
            Err(e) => {
                warn!(error = %e, "registry snapshot does not decode");
                None
            }
        }
    }

    pub fn info_map(&self) -> impl Iterator<Item = (PublicKey, ServiceNodeInfo)> + '_ {
        self.infos.iter().map(|entry| (entry.pubkey, entry.info.clone()))
    }
}

/// Snapshot kept in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceNodeStore for MemoryStore {
    fn load(&self) -> StateResult<Option<Vec<u8>>> {
        Ok(self.data.lock().clone())
    }

    fn store(&self, data: &[u8]) -> StateResult<()> {
        *self.data.lock() = Some(data.to_vec());
        Ok(())
    }

    fn clear(&self) -> StateResult<()> {
        *self.data.lock() = None;
        Ok(())
    }
}

/// Snapshot in a single file, replaced atomically through a temp file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

impl ServiceNodeStore for FileStore {
    fn load(&self) -> StateResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, data: &[u8]) -> StateResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        fs::write(&temp, data)?;
        fs::rename(&temp, &self.path)
            .map_err(|e| StateError::Storage(format!("replacing {}: {e}", self.path.display())))
    }

    fn clear(&self) -> StateResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
