//! Persistent storage for the credential pair.
//!
//! The store is the explicit session context: the gatekeeper and the
//! login/logout flows are the only writers.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::cipher::{CipherError, SealedBlob, SessionCipher};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Written first, then renamed over the session file
const SESSION_TEMP_FILE: &str = "session.json.tmp";

/// Owner read/write only; the file holds the refresh token
#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSlot {
    Access,
    Refresh,
}

impl TokenSlot {
    pub fn key(self) -> &'static str {
        match self {
            TokenSlot::Access => "access_token",
            TokenSlot::Refresh => "refresh_token",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Two named string slots, readable, writable and clearable.
pub trait TokenStore: Send + Sync {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError>;

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError>;

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError> {
        self.remove(TokenSlot::Access)?;
        self.remove(TokenSlot::Refresh)
    }
}

/// In-process store, lost on exit
#[derive(Default)]
pub struct MemoryTokenStore {
    slots: Mutex<HashMap<TokenSlot, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slots.get(&slot).cloned())
    }

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(slot, value.to_string());
        Ok(())
    }

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(&slot);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StoredTokens {
    fn slot(&mut self, slot: TokenSlot) -> &mut Option<String> {
        match slot {
            TokenSlot::Access => &mut self.access_token,
            TokenSlot::Refresh => &mut self.refresh_token,
        }
    }

    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Session file in the cache directory, optionally sealed with a passphrase
pub struct FileTokenStore {
    path: PathBuf,
    cipher: Option<SessionCipher>,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(SESSION_FILE),
            cipher: None,
            lock: Mutex::new(()),
        }
    }

    /// Seal the session file with a key derived from `passphrase`
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.cipher = Some(SessionCipher::new(passphrase));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredTokens, StoreError> {
        if !self.path.exists() {
            return Ok(StoredTokens::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        match self.cipher {
            Some(ref cipher) => {
                let blob: SealedBlob = serde_json::from_str(&contents)?;
                let plaintext = cipher.open(&blob)?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
            None => Ok(serde_json::from_str(&contents)?),
        }
    }

    fn write(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        if tokens.is_empty() {
            return self.remove_file();
        }

        let contents = match self.cipher {
            Some(ref cipher) => {
                let plaintext = serde_json::to_vec(tokens)?;
                serde_json::to_string_pretty(&cipher.seal(&plaintext)?)?
            }
            None => serde_json::to_string_pretty(tokens)?,
        };

        let temp_path = self.path.with_file_name(SESSION_TEMP_FILE);
        if let Some(parent) = temp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_private(&temp_path, contents.as_bytes())?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn remove_file(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed session file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn modify(&self, f: impl FnOnce(&mut StoredTokens)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tokens = match self.read() {
            Ok(tokens) => tokens,
            Err(StoreError::Io(e)) => return Err(StoreError::Io(e)),
            // Plaintext file after a passphrase was set, wrong passphrase, or corruption
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable session file");
                StoredTokens::default()
            }
        };
        f(&mut tokens);
        self.write(&tokens)
    }
}

/// Create or truncate `path` with owner-only permissions and write `contents`
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SESSION_FILE_MODE);
    }
    let mut file = options.open(path)?;
    // An existing file keeps its mode on open
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(Permissions::from_mode(SESSION_FILE_MODE))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}

impl TokenStore for FileTokenStore {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.slot(slot).take())
    }

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError> {
        self.modify(|tokens| *tokens.slot(slot) = Some(value.to_string()))
    }

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError> {
        self.modify(|tokens| *tokens.slot(slot) = None)
    }

    /// Removes the file without reading it, so an undecodable session can
    /// still be logged out of
    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.remove_file()
    }
}
