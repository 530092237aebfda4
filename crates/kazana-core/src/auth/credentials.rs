use keyring::Entry;
use tracing::debug;

use super::store::{StoreError, TokenSlot, TokenStore};

const SERVICE_NAME: &str = "kazana";

/// Token slots kept in the OS keychain, one entry per slot
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, slot: TokenSlot) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, slot.key())?)
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, slot: TokenSlot) -> Result<Option<String>, StoreError> {
        match self.entry(slot)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, slot: TokenSlot, value: &str) -> Result<(), StoreError> {
        self.entry(slot)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, slot: TokenSlot) -> Result<(), StoreError> {
        match self.entry(slot)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(slot = slot.key(), "No keychain entry to delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
