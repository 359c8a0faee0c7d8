//! AES-GCM record envelope (§4.2, §6): `key_version_byte || nonce ||
//! ciphertext || tag`. Every store can carry more than one key, so that
//! rotating to a fresh key doesn't require re-encrypting the whole file;
//! writes always use the newest key, reads dispatch on the version byte.
//!
//! The teacher carries no crypto dependency; `aes-gcm` is the crate the
//! rest of the retrieval pack reaches for at this exact envelope shape
//! (96-bit nonce, 128-bit tag), so it is used here instead of hand-rolling
//! a cipher.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

pub struct Cipher {
    keys: Vec<Aes256Gcm>,
}

impl Cipher {
    /// `keys` are ordered oldest to newest; the last one is used for all
    /// new writes. `key_version_byte` is simply the key's index, so at
    /// most 256 live key generations are supported per store.
    pub fn new(keys: &[[u8; 32]]) -> Result<Cipher> {
        if keys.is_empty() {
            return Err(Error::StorageError("store requires at least one encryption key".into()));
        }
        if keys.len() > 256 {
            return Err(Error::StorageError("store supports at most 256 key generations".into()));
        }
        let keys = keys
            .iter()
            .map(|k| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k)))
            .collect();
        Ok(Cipher { keys })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let version = (self.keys.len() - 1) as u8;
        let cipher = &self.keys[version as usize];

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = err_at!(
            StorageError,
            cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| e.to_string())
        )?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        out.push(version);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        check_remaining!(envelope, 1 + NONCE_LEN, "crypto-envelope-hdr")?;
        let version = envelope[0] as usize;
        let cipher = self
            .keys
            .get(version)
            .ok_or_else(|| Error::StorageError(format!("unknown key version {}", version)))?;

        let nonce = Nonce::from_slice(&envelope[1..1 + NONCE_LEN]);
        let ciphertext = &envelope[1 + NONCE_LEN..];

        err_at!(
            StorageError,
            cipher
                .decrypt(nonce, ciphertext)
                .map_err(|e| e.to_string())
        )
    }
}

#[cfg(test)]
#[path = "crypto_test.rs"]
mod crypto_test;
