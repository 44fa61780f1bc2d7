//! Persisted access-credential storage.
//!
//! The store keeps the current access token in memory and mirrors it to a
//! small versioned JSON record on disk so a restart does not lose the session.
//! Storage problems never reach the caller: anything unreadable is treated as
//! "no credential" and write failures are only logged.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Credential file name in the state directory
const CREDENTIAL_FILE: &str = "credential.json";

/// Current on-disk record version. Records with any other version are ignored.
const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCredential {
    version: u32,
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "savedAt")]
    saved_at: DateTime<Utc>,
}

impl PersistedCredential {
    fn new(access_token: &str) -> Self {
        Self {
            version: RECORD_VERSION,
            access_token: access_token.to_string(),
            saved_at: Utc::now(),
        }
    }

    /// Token carried by a valid record, `None` for anything unusable
    fn into_token(self) -> Option<String> {
        if self.version != RECORD_VERSION {
            return None;
        }
        Some(self.access_token).filter(|t| !t.trim().is_empty())
    }
}

/// Single source of truth for the current access credential.
pub struct CredentialStore {
    path: Option<PathBuf>,
    current: RwLock<Option<String>>,
}

impl CredentialStore {
    /// Open a store persisted under `dir`, loading any saved credential
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(CREDENTIAL_FILE);
        let current = Self::read_record(&path);
        debug!(path = %path.display(), has_credential = current.is_some(), "Credential store opened");
        Self {
            path: Some(path),
            current: RwLock::new(current),
        }
    }

    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
        }
    }

    /// Current credential, if any
    pub fn get(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the current credential. An empty token clears the store.
    pub fn set(&self, token: &str) {
        if token.trim().is_empty() {
            self.clear();
            return;
        }

        // Held through the disk write so the file never lags behind memory
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(token.to_string());

        if let Some(ref path) = self.path {
            if let Err(e) = Self::write_record(path, &PersistedCredential::new(token)) {
                warn!(error = %e, path = %path.display(), "Failed to persist credential");
            }
        }
    }

    /// Forget the current credential, in memory and on disk
    pub fn clear(&self) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = None;

        if let Some(ref path) = self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove credential file"),
            }
        }
    }

    pub fn has_credential(&self) -> bool {
        self.get().is_some()
    }

    fn read_record(path: &Path) -> Option<String> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read credential file");
                return None;
            }
        };

        match serde_json::from_str::<PersistedCredential>(&contents) {
            Ok(record) => {
                let version = record.version;
                let token = record.into_token();
                if token.is_none() {
                    warn!(version, "Ignoring unusable credential record");
                }
                token
            }
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt credential file");
                None
            }
        }
    }

    fn write_record(path: &Path, record: &PersistedCredential) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)
    }
}
