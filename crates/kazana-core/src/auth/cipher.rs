//! Passphrase sealing for the on-disk session file.

use std::sync::Mutex;

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Sealed data is corrupt: {0}")]
    Corrupt(String),

    #[error("Decryption failed - wrong passphrase or tampered file")]
    Decrypt,
}

/// Encrypted payload as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBlob {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// ChaCha20-Poly1305 with a key derived from a passphrase via Argon2.
///
/// Derivation is slow on purpose, so the last derived key is kept per salt.
pub struct SessionCipher {
    passphrase: String,
    derived: Mutex<Option<([u8; SALT_LEN], [u8; KEY_LEN])>>,
}

impl SessionCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            derived: Mutex::new(None),
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, CipherError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::thread_rng();
        // Reuse the cached salt so the key is only derived once per process
        match self.cached_salt() {
            Some(cached) => salt = cached,
            None => rng.fill_bytes(&mut salt),
        }
        rng.fill_bytes(&mut nonce);

        let key = self.key_for(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Corrupt("encryption failed".to_string()))?;

        Ok(SealedBlob {
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    pub fn open(&self, blob: &SealedBlob) -> Result<Vec<u8>, CipherError> {
        let salt: [u8; SALT_LEN] = decode_fixed(&blob.salt, "salt")?;
        let nonce: [u8; NONCE_LEN] = decode_fixed(&blob.nonce, "nonce")?;
        let ciphertext = STANDARD
            .decode(&blob.ciphertext)
            .map_err(|e| CipherError::Corrupt(format!("ciphertext: {}", e)))?;

        let key = self.key_for(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| CipherError::Decrypt)
    }

    fn cached_salt(&self) -> Option<[u8; SALT_LEN]> {
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|(salt, _)| salt)
    }

    fn key_for(&self, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN], CipherError> {
        let mut derived = self.derived.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_salt, key)) = *derived {
            if &cached_salt == salt {
                return Ok(key);
            }
        }

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        *derived = Some((*salt, key));
        Ok(key)
    }
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> Result<[u8; N], CipherError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CipherError::Corrupt(format!("{}: {}", what, e)))?;
    bytes
        .try_into()
        .map_err(|_| CipherError::Corrupt(format!("{} has wrong length", what)))
}
