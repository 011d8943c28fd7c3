//! Data models for vault entries, containers and configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::crypto::{KdfParams, NONCE_SIZE, TAG_SIZE};
use crate::master::BackoffPolicy;

/// Stable identifier of a vault entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Allocate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One AES-256-GCM encryption context: nonce, ciphertext and detached tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedField {
    /// AES-GCM nonce (12 bytes), unique per encryption under a key
    pub nonce: [u8; NONCE_SIZE],

    /// Encrypted bytes, same length as the plaintext
    pub ciphertext: Vec<u8>,

    /// Authentication tag over ciphertext and associated data
    pub tag: [u8; TAG_SIZE],
}

/// Stored credential record.
///
/// `service` and `username` are plaintext metadata so they can be searched;
/// both are bound into the authentication tag of the sealed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: EntryId,
    pub service: String,
    pub username: String,
    pub secret: SealedField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<SealedField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VaultEntry {
    /// Secret-free projection of this entry
    pub fn view(&self) -> EntryView {
        EntryView {
            id: self.id,
            service: self.service.clone(),
            username: self.username.clone(),
            has_notes: self.notes.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Case-insensitive substring match over service and username.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.service.to_lowercase().contains(needle)
            || self.username.to_lowercase().contains(needle)
    }

    /// Every nonce this entry has consumed
    pub fn nonces(&self) -> impl Iterator<Item = &[u8; NONCE_SIZE]> {
        std::iter::once(&self.secret.nonce).chain(self.notes.iter().map(|n| &n.nonce))
    }
}

/// Lightweight entry view handed to callers (never contains plaintext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub id: EntryId,
    pub service: String,
    pub username: String,
    pub has_notes: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vault container file format (also used for exports)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultContainer {
    /// Schema version for migrations
    pub version: u32,

    pub entries: Vec<VaultEntry>,
}

impl VaultContainer {
    pub const CURRENT_VERSION: u32 = 2;
}

/// Only the version field, read before choosing a layout to parse
#[derive(Debug, Deserialize)]
pub(crate) struct ContainerProbe {
    pub version: u32,
}

/// Version 1 container: tag appended to the ciphertext, no associated data,
/// notes kept in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyContainerV1 {
    pub version: u32,
    pub entries: Vec<LegacyEntryV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyEntryV1 {
    pub id: EntryId,
    pub service: String,
    pub username: String,
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vault configuration (non-sensitive, stored in plaintext)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Auto-lock timeout in seconds
    pub auto_lock_timeout_seconds: u64,

    /// Delay before a copied secret is wiped from the clipboard
    pub clipboard_clear_seconds: u64,

    /// Argon2 memory cost in KB
    pub argon2_memory_kb: u32,

    /// Argon2 iterations
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,

    /// Failed unlock attempts allowed before backoff starts
    pub backoff_free_attempts: u32,

    /// First backoff delay in seconds, doubled on every further failure
    pub backoff_base_seconds: u64,

    /// Upper bound for the backoff delay
    pub backoff_max_seconds: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout_seconds: 300, // 5 minutes
            clipboard_clear_seconds: 15,
            argon2_memory_kb: 65536, // 64 MB
            argon2_iterations: 3,
            argon2_parallelism: 4,
            backoff_free_attempts: 3,
            backoff_base_seconds: 1,
            backoff_max_seconds: 300,
        }
    }
}

impl VaultConfig {
    pub fn auto_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_lock_timeout_seconds)
    }

    pub fn clipboard_clear_delay(&self) -> Duration {
        Duration::from_secs(self.clipboard_clear_seconds)
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            memory_kb: self.argon2_memory_kb,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            free_attempts: self.backoff_free_attempts,
            base_delay: Duration::from_secs(self.backoff_base_seconds),
            max_delay: Duration::from_secs(self.backoff_max_seconds),
        }
    }
}
