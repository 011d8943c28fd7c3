//! Master password guard
//!
//! Stores `{salt, hash}` of the master password (Argon2id, never the
//! password itself) and authenticates unlock attempts with a constant-time
//! comparison. Repeated failures are throttled by an exponential backoff.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::crypto::{constant_time_eq, generate_salt, hash_password, KdfParams, HASH_SIZE, SALT_SIZE};
use crate::error::{AuthError, AuthResult};
use crate::models::VaultConfig;
use crate::storage::{read_optional, write_atomic};

/// Persisted master credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCredential {
    /// Schema version for migrations
    pub version: u32,

    /// Argon2 parameters the hash was computed with
    pub kdf: KdfParams,

    /// Argon2 salt (32 bytes)
    pub salt: [u8; SALT_SIZE],

    /// Argon2id output (32 bytes)
    pub hash: [u8; HASH_SIZE],
}

impl MasterCredential {
    pub const CURRENT_VERSION: u32 = 1;

    fn derive(password: &str, kdf: KdfParams) -> AuthResult<Self> {
        let salt = generate_salt();
        let hash = hash_password(password.as_bytes(), &salt, &kdf)?;
        Ok(Self {
            version: Self::CURRENT_VERSION,
            kdf,
            salt,
            hash,
        })
    }

    fn verify(&self, attempt: &str) -> AuthResult<bool> {
        let computed = hash_password(attempt.as_bytes(), &self.salt, &self.kdf)?;
        Ok(constant_time_eq(&computed, &self.hash))
    }
}

/// Delay schedule for failed unlock attempts.
///
/// The first `free_attempts` consecutive failures carry no delay; failure
/// number `free_attempts + k` (k >= 1) blocks further attempts for
/// `base_delay * 2^(k - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub free_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        VaultConfig::default().backoff_policy()
    }
}

impl BackoffPolicy {
    /// Delay imposed after `failures` consecutive failed attempts
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        if failures <= self.free_attempts {
            return None;
        }
        let exponent = (failures - self.free_attempts - 1).min(31);
        let delay = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// Guards access to the vault behind the master password
pub struct MasterPasswordGuard {
    path: PathBuf,
    kdf: KdfParams,
    policy: BackoffPolicy,
    clock: SharedClock,
    credential: Option<MasterCredential>,
    failed_attempts: u32,
    retry_at: Option<Instant>,
}

impl MasterPasswordGuard {
    /// Open the guard, reading the credential file if one exists
    pub async fn open(
        path: impl Into<PathBuf>,
        config: &VaultConfig,
        clock: SharedClock,
    ) -> AuthResult<Self> {
        let path = path.into();
        let credential = match read_optional(&path).await? {
            Some(data) => Some(
                serde_json::from_slice(&data).map_err(|e| AuthError::Format(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            path,
            kdf: config.kdf_params(),
            policy: config.backoff_policy(),
            clock,
            credential,
            failed_attempts: 0,
            retry_at: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.credential.is_some()
    }

    /// Create the master credential. Refuses to overwrite an existing one.
    pub async fn initialize(&mut self, password: &str) -> AuthResult<()> {
        if self.is_initialized() {
            return Err(AuthError::AlreadyInitialized);
        }

        let credential = MasterCredential::derive(password, self.kdf)?;
        self.write(&credential).await?;
        self.credential = Some(credential);

        info!("Master password initialized");
        Ok(())
    }

    /// Check `attempt` against the stored credential.
    ///
    /// While a backoff is pending the attempt is rejected without being
    /// evaluated.
    pub fn authenticate(&mut self, attempt: &str) -> AuthResult<()> {
        let credential = self.credential.as_ref().ok_or(AuthError::NotInitialized)?;

        if let Some(remaining) = self.retry_after() {
            return Err(AuthError::Backoff { remaining });
        }

        if credential.verify(attempt)? {
            self.failed_attempts = 0;
            self.retry_at = None;
            return Ok(());
        }

        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.retry_at = self
            .policy
            .delay_after(self.failed_attempts)
            .map(|delay| self.clock.now() + delay);

        warn!(
            attempts = self.failed_attempts,
            "Master password mismatch"
        );
        Err(AuthError::Mismatch)
    }

    /// Replace the master password after verifying the current one.
    ///
    /// The vault key does not depend on the password, so entries are not
    /// re-encrypted.
    pub async fn change_password(&mut self, current: &str, new: &str) -> AuthResult<()> {
        self.authenticate(current)?;

        let credential = MasterCredential::derive(new, self.kdf)?;
        self.write(&credential).await?;
        self.credential = Some(credential);

        info!("Master password changed");
        Ok(())
    }

    /// Consecutive failed attempts since the last success
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Time left before another attempt is evaluated, if throttled
    pub fn retry_after(&self) -> Option<Duration> {
        let retry_at = self.retry_at?;
        let now = self.clock.now();
        (now < retry_at).then(|| retry_at - now)
    }

    async fn write(&self, credential: &MasterCredential) -> AuthResult<()> {
        let data = serde_json::to_vec_pretty(credential).map_err(|e| AuthError::Format(e.to_string()))?;
        write_atomic(&self.path, &data).await?;
        Ok(())
    }
}
