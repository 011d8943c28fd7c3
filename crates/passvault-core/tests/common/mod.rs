//! Shared fixture for vault integration tests.

#![allow(dead_code)]

use passvault_core::{
    credential_file_path, key_file_path, vault_file_path, KeyManager, ManualClock,
    MasterPasswordGuard, MemoryClipboard, SessionController, VaultConfig, VaultStore,
};
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const MASTER_PASSWORD: &str = "Correct1!";

/// A vault directory plus the simulated clock and clipboard its sessions use
pub struct TestVault {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub clipboard: MemoryClipboard,
    pub config: VaultConfig,
}

impl TestVault {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
            clock: Arc::new(ManualClock::new()),
            clipboard: MemoryClipboard::new(),
            config: VaultConfig {
                argon2_memory_kb: 64,
                argon2_iterations: 1,
                argon2_parallelism: 1,
                ..VaultConfig::default()
            },
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn keys(&self) -> KeyManager {
        KeyManager::new(key_file_path(self.path()))
    }

    pub async fn guard(&self) -> MasterPasswordGuard {
        MasterPasswordGuard::open(
            credential_file_path(self.path()),
            &self.config,
            self.clock.clone(),
        )
        .await
        .expect("open guard")
    }

    pub fn session(&self) -> SessionController {
        SessionController::new(
            &self.config,
            self.clock.clone(),
            Box::new(self.clipboard.clone()),
        )
    }

    /// Store using the persisted key (created on first use), not yet loaded
    pub async fn store(&self) -> VaultStore {
        let key = self.keys().load_or_create_key().await.expect("vault key");
        VaultStore::new(vault_file_path(self.path()), key)
    }

    /// Initialize the master password and return an unlocked session
    pub async fn initialized_session(&self) -> SessionController {
        let mut guard = self.guard().await;
        if !guard.is_initialized() {
            guard.initialize(MASTER_PASSWORD).await.expect("initialize");
        }
        let mut session = self.session();
        session
            .unlock(&mut guard, MASTER_PASSWORD)
            .expect("unlock");
        session
    }
}

pub fn secret(value: &str) -> SecretString {
    SecretString::new(value.to_string())
}
