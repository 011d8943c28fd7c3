//! Cryptographic operations for vault security
//!
//! - AES-256-GCM with detached tags for per-entry encryption
//! - Argon2id for the master password hash
//! - Secure memory handling with zeroization

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{AuthError, AuthResult, VaultError, VaultResult};
use crate::models::SealedField;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of Argon2 salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of the stored master password hash
pub const HASH_SIZE: usize = 32;

/// Symmetric key used for every entry in one vault
pub struct EncryptionKey {
    key: Secret<[u8; KEY_SIZE]>,
}

impl EncryptionKey {
    /// Generate fresh key material from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        key
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Secret::new(bytes),
        }
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_SIZE] {
        self.key.expose_secret()
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(self.key.expose_secret().into())
    }

    /// Encrypt `plaintext` under `nonce`, authenticating `aad` alongside it
    pub fn seal(
        &self,
        nonce: [u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> VaultResult<SealedField> {
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher()
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);

        Ok(SealedField {
            nonce,
            ciphertext: buffer,
            tag: tag_bytes,
        })
    }

    /// Decrypt and authenticate a sealed field.
    ///
    /// Any mismatch (ciphertext, tag, associated data or key) is `Tampered`.
    pub fn open(&self, field: &SealedField, aad: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
        let mut buffer = Zeroizing::new(field.ciphertext.clone());
        self.cipher()
            .decrypt_in_place_detached(
                Nonce::from_slice(&field.nonce),
                aad,
                buffer.as_mut_slice(),
                GenericArray::from_slice(&field.tag),
            )
            .map_err(|_| VaultError::Tampered)?;
        Ok(buffer)
    }

    /// Decrypt a version 1 value (tag appended, no associated data)
    pub(crate) fn open_combined(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Tampered)
    }

    #[cfg(test)]
    pub(crate) fn seal_combined(
        &self,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> VaultResult<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| VaultError::Encryption(e.to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Argon2id cost parameters, stored with the master credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kb: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// One-way Argon2id hash of the master password under `salt`
pub fn hash_password(
    password: &[u8],
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> AuthResult<[u8; HASH_SIZE]> {
    let params = Params::new(
        params.memory_kb,
        params.iterations,
        params.parallelism,
        Some(HASH_SIZE),
    )
    .map_err(|e| AuthError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; HASH_SIZE];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| AuthError::KeyDerivation(e.to_string()))?;

    Ok(output)
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Compute SHA-256 checksum of data
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_params() -> KdfParams {
        KdfParams {
            memory_kb: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = EncryptionKey::generate();
        let sealed = key.seal(generate_nonce(), b"Hello, secure world!", b"aad").unwrap();

        assert_eq!(sealed.ciphertext.len(), 20);
        let opened = key.open(&sealed, b"aad").unwrap();
        assert_eq!(opened.as_slice(), b"Hello, secure world!");
    }

    #[test]
    fn test_empty_plaintext_still_authenticated() {
        let key = EncryptionKey::generate();
        let mut sealed = key.seal(generate_nonce(), b"", b"aad").unwrap();
        assert!(key.open(&sealed, b"aad").unwrap().is_empty());

        sealed.tag[0] ^= 0x01;
        assert!(matches!(key.open(&sealed, b"aad"), Err(VaultError::Tampered)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let sealed = key1.seal(generate_nonce(), b"Secret data", b"").unwrap();

        assert!(matches!(key2.open(&sealed, b""), Err(VaultError::Tampered)));
    }

    #[test]
    fn test_associated_data_is_bound() {
        let key = EncryptionKey::generate();
        let sealed = key.seal(generate_nonce(), b"Secret data", b"github.com").unwrap();

        assert!(matches!(key.open(&sealed, b"gitlab.com"), Err(VaultError::Tampered)));
    }

    #[test]
    fn test_combined_layout_roundtrip() {
        let key = EncryptionKey::generate();
        let nonce = generate_nonce();
        let combined = key.seal_combined(&nonce, b"legacy").unwrap();
        assert_eq!(combined.len(), 6 + TAG_SIZE);
        assert_eq!(key.open_combined(&nonce, &combined).unwrap().as_slice(), b"legacy");
    }

    #[test]
    fn test_password_hash_deterministic() {
        let salt = generate_salt();
        let a = hash_password(b"Correct1!", &salt, &light_params()).unwrap();
        let b = hash_password(b"Correct1!", &salt, &light_params()).unwrap();
        let c = hash_password(b"Correct1?", &salt, &light_params()).unwrap();

        assert!(constant_time_eq(&a, &b));
        assert!(!constant_time_eq(&a, &c));
    }

    #[test]
    fn test_password_hash_depends_on_salt() {
        let a = hash_password(b"pw", &generate_salt(), &light_params()).unwrap();
        let b = hash_password(b"pw", &generate_salt(), &light_params()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes([7u8; KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "EncryptionKey([REDACTED])");
    }

    #[test]
    fn test_checksum() {
        let checksum = compute_checksum(b"Some important data");
        assert!(constant_time_eq(&checksum, &compute_checksum(b"Some important data")));
        assert!(!constant_time_eq(&checksum, &compute_checksum(b"Different data")));
    }

    #[test]
    fn test_nonce_uniqueness() {
        assert_ne!(generate_nonce(), generate_nonce());
    }
}
