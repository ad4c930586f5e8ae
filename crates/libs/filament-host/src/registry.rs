//! Named payload-cipher capabilities.
//!
//! Implementations are compiled in and resolved by configured name; there
//! is no runtime type scanning.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::config::HostConfig;
use crate::error::HostError;

const NONCE_LEN: usize = 12;

/// Transport-side encryption of an envelope's text payload.
pub trait PayloadCipher: Send + Sync {
    fn name(&self) -> &'static str;
    fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, HostError>;
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, HostError>;
}

/// Passthrough used when a deployment disables payload encryption but the
/// pipeline still wants a cipher slot.
pub struct PlainCipher;

impl PayloadCipher for PlainCipher {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, HostError> {
        Ok(plain.to_vec())
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, HostError> {
        Ok(sealed.to_vec())
    }
}

/// AES-256-GCM with a random nonce prefixed to each sealed payload.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &[u8]) -> Result<Self, HostError> {
        if key.len() != 32 {
            return Err(HostError::Cipher(format!(
                "aes-256-gcm key must be 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) })
    }

    pub fn from_hex_key(hex_key: &str) -> Result<Self, HostError> {
        let key = hex::decode(hex_key)
            .map_err(|err| HostError::Cipher(format!("bad hex key: {err}")))?;
        Self::new(&key)
    }
}

impl PayloadCipher for AesGcmCipher {
    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, HostError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain)
            .map_err(|_| HostError::Cipher("encryption failed".into()))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, HostError> {
        if sealed.len() < NONCE_LEN {
            return Err(HostError::Cipher("sealed payload too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| HostError::Cipher("decryption failed".into()))
    }
}

/// Named cipher implementations, resolved by configuration.
#[derive(Default)]
pub struct CipherRegistry {
    ciphers: HashMap<&'static str, Arc<dyn PayloadCipher>>,
}

impl CipherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in capabilities plus whatever the config keys enable.
    pub fn from_config(config: &HostConfig) -> Result<Self, HostError> {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainCipher));
        if let Some(section) = &config.cipher {
            if let Some(key_hex) = &section.key_hex {
                registry.register(Arc::new(AesGcmCipher::from_hex_key(key_hex)?));
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, cipher: Arc<dyn PayloadCipher>) {
        self.ciphers.insert(cipher.name(), cipher);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn PayloadCipher>> {
        self.ciphers.get(name).cloned()
    }

    /// The cipher the config selects, if any. Selecting an unregistered
    /// name is a configuration error, not a silent fallback.
    pub fn configured(
        &self,
        config: &HostConfig,
    ) -> Result<Option<Arc<dyn PayloadCipher>>, HostError> {
        match &config.cipher {
            None => Ok(None),
            Some(section) => self.resolve(&section.name).map(Some).ok_or_else(|| {
                HostError::Config(format!("unknown payload cipher '{}'", section.name))
            }),
        }
    }
}
