//! Error types for vault operations

use std::time::Duration;
use thiserror::Error;

use crate::models::EntryId;

/// Errors reading or writing the key-material file.
///
/// These are fatal for the process: without the key no entry can be
/// decrypted, and nothing is attempted locally to recover.
#[derive(Error, Debug)]
pub enum KeyStorageError {
    #[error("Key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key file is malformed: {0}")]
    Malformed(String),

    #[error("Key file format version {0} is not supported")]
    UnsupportedVersion(u8),
}

/// Errors from master password handling
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid master password")]
    Mismatch,

    #[error("Master password is already initialized")]
    AlreadyInitialized,

    #[error("Master password has not been initialized")]
    NotInitialized,

    #[error("Too many failed unlock attempts - try again in {remaining:?}")]
    Backoff { remaining: Duration },

    #[error("Credential file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is malformed: {0}")]
    Format(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),
}

/// Errors that can occur during vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Entry failed authentication - ciphertext, metadata or key does not match")]
    Tampered,

    #[error("Vault container is corrupted: {0}")]
    Corrupt(String),

    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    #[error("Vault is locked - unlock with master password first")]
    SessionLocked,

    #[error("Vault version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error(transparent)]
    Key(#[from] KeyStorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),
}

/// Errors from the breach-check collaborator
#[derive(Error, Debug)]
pub enum BreachCheckError {
    #[error("Breach list unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("Invalid breach list entry on line {line}")]
    InvalidEntry { line: usize },
}

pub type VaultResult<T> = Result<T, VaultError>;
pub type AuthResult<T> = Result<T, AuthError>;
pub type KeyResult<T> = Result<T, KeyStorageError>;
