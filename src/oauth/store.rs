//! Durable credential persistence.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BrokerageError, Result};

use super::Credential;

/// Somewhere a credential can be loaded from and saved to.
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, or `CredentialNotFound`.
    fn load(&self) -> Result<Credential>;

    /// Replace the stored credential.
    fn save(&self, credential: &Credential) -> Result<()>;
}

/// JSON file store.
///
/// Saves go to a temp file next to the target and are renamed into place,
/// so readers see either the old file or the new one. The temp file is
/// created owner-only on Unix.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credential> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BrokerageError::CredentialNotFound(
                    self.path.display().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw).map_err(|e| {
            BrokerageError::Config(format!(
                "credential file {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let body = serde_json::to_vec_pretty(credential)
            .map_err(|e| BrokerageError::Config(format!("failed to encode credential: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), "Credential saved");
        Ok(())
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credential> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| BrokerageError::Config("credential store lock poisoned".to_string()))?;
        slot.clone()
            .ok_or_else(|| BrokerageError::CredentialNotFound("memory".to_string()))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| BrokerageError::Config("credential store lock poisoned".to_string()))?;
        *slot = Some(credential.clone());
        Ok(())
    }
}
