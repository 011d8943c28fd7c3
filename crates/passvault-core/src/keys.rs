//! Key-material file management.
//!
//! The vault key is random and independent of the master password. The key
//! file is the single point of failure for the vault: if it is lost, every
//! stored entry becomes permanently unreadable.
//!
//! File layout (v1): `PVK` magic, one version byte, then 32 raw key bytes.
//! A file of exactly 32 bytes is read as a legacy headerless key.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{EncryptionKey, KEY_SIZE};
use crate::error::{KeyResult, KeyStorageError};
use crate::storage::{backup_path, read_optional, write_atomic};

/// Key file magic (3 bytes)
pub const KEY_MAGIC: &[u8; 3] = b"PVK";

/// Current key file format version
pub const KEY_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = KEY_MAGIC.len() + 1;

/// Loads, creates and replaces the vault key file
#[derive(Debug, Clone)]
pub struct KeyManager {
    path: PathBuf,
}

impl KeyManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a key file is present
    pub async fn key_exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the persisted key, or `None` if there is no key file
    pub async fn load_key(&self) -> KeyResult<Option<EncryptionKey>> {
        match read_optional(&self.path).await? {
            Some(bytes) => decode_key(&Zeroizing::new(bytes)).map(Some),
            None => Ok(None),
        }
    }

    /// Return the persisted key, generating and persisting one on first use
    pub async fn load_or_create_key(&self) -> KeyResult<EncryptionKey> {
        if let Some(key) = self.load_key().await? {
            debug!("Loaded vault key from {}", self.path.display());
            return Ok(key);
        }

        let key = EncryptionKey::generate();
        write_atomic(&self.path, &encode_key(&key)).await?;

        warn!(
            "Created new vault key at {}. Back this file up: if it is lost, every entry in the vault is unrecoverable",
            self.path.display()
        );
        Ok(key)
    }

    /// Overwrite the key file with `key`, keeping the old file as `<name>.bak`.
    ///
    /// Only valid after every entry has been re-encrypted under `key`.
    pub async fn replace_key(&self, key: &EncryptionKey) -> KeyResult<()> {
        if self.key_exists().await {
            fs::copy(&self.path, backup_path(&self.path)).await?;
        }

        write_atomic(&self.path, &encode_key(key)).await?;
        info!("Replaced vault key at {}", self.path.display());
        Ok(())
    }
}

fn encode_key(key: &EncryptionKey) -> Zeroizing<Vec<u8>> {
    let mut data = Zeroizing::new(Vec::with_capacity(HEADER_LEN + KEY_SIZE));
    data.extend_from_slice(KEY_MAGIC);
    data.push(KEY_FORMAT_VERSION);
    data.extend_from_slice(key.expose());
    data
}

fn decode_key(data: &[u8]) -> KeyResult<EncryptionKey> {
    let raw = if data.len() == KEY_SIZE {
        debug!("Reading legacy headerless key file");
        data
    } else if data.starts_with(KEY_MAGIC) && data.len() >= HEADER_LEN {
        let version = data[KEY_MAGIC.len()];
        if version != KEY_FORMAT_VERSION {
            return Err(KeyStorageError::UnsupportedVersion(version));
        }
        &data[HEADER_LEN..]
    } else {
        return Err(KeyStorageError::Malformed(format!(
            "expected {} or {} bytes, found {}",
            KEY_SIZE,
            HEADER_LEN + KEY_SIZE,
            data.len()
        )));
    };

    let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|_| {
        KeyStorageError::Malformed(format!(
            "key material is {} bytes, expected {}",
            raw.len(),
            KEY_SIZE
        ))
    })?;
    Ok(EncryptionKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_nonce;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> KeyManager {
        KeyManager::new(temp_dir.path().join("vault.key"))
    }

    #[tokio::test]
    async fn test_create_then_load_returns_same_key() {
        let temp_dir = TempDir::new().unwrap();
        let keys = manager(&temp_dir);
        assert!(!keys.key_exists().await);

        let created = keys.load_or_create_key().await.unwrap();
        assert!(keys.key_exists().await);

        let loaded = keys.load_or_create_key().await.unwrap();
        assert_eq!(created.expose(), loaded.expose());
    }

    #[tokio::test]
    async fn test_key_file_has_header() {
        let temp_dir = TempDir::new().unwrap();
        let keys = manager(&temp_dir);
        keys.load_or_create_key().await.unwrap();

        let data = fs::read(keys.path()).await.unwrap();
        assert_eq!(data.len(), HEADER_LEN + KEY_SIZE);
        assert_eq!(&data[..3], KEY_MAGIC);
        assert_eq!(data[3], KEY_FORMAT_VERSION);
    }

    #[tokio::test]
    async fn test_legacy_raw_key_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let keys = manager(&temp_dir);
        fs::write(keys.path(), [9u8; KEY_SIZE]).await.unwrap();

        let key = keys.load_or_create_key().await.unwrap();
        assert_eq!(key.expose(), &[9u8; KEY_SIZE]);
    }

    #[tokio::test]
    async fn test_wrong_length_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let keys = manager(&temp_dir);
        fs::write(keys.path(), [1u8; 17]).await.unwrap();

        assert!(matches!(
            keys.load_or_create_key().await,
            Err(KeyStorageError::Malformed(_))
        ));

        let mut truncated = KEY_MAGIC.to_vec();
        truncated.push(KEY_FORMAT_VERSION);
        truncated.extend_from_slice(&[0u8; 8]);
        fs::write(keys.path(), truncated).await.unwrap();
        assert!(matches!(
            keys.load_key().await,
            Err(KeyStorageError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let keys = manager(&temp_dir);
        let mut data = KEY_MAGIC.to_vec();
        data.push(9);
        data.extend_from_slice(&[0u8; KEY_SIZE]);
        fs::write(keys.path(), data).await.unwrap();

        assert!(matches!(
            keys.load_key().await,
            Err(KeyStorageError::UnsupportedVersion(9))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_store_is_key_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the key file should be cannot be read as a file
        let keys = KeyManager::new(temp_dir.path());

        assert!(matches!(
            keys.load_or_create_key().await,
            Err(KeyStorageError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_key_keeps_backup() {
        let temp_dir = TempDir::new().unwrap();
        let keys = manager(&temp_dir);
        let old = keys.load_or_create_key().await.unwrap();
        let new = EncryptionKey::generate();

        keys.replace_key(&new).await.unwrap();

        let loaded = keys.load_key().await.unwrap().unwrap();
        assert_eq!(loaded.expose(), new.expose());

        let backup = KeyManager::new(temp_dir.path().join("vault.key.bak"));
        let backed_up = backup.load_key().await.unwrap().unwrap();
        assert_eq!(backed_up.expose(), old.expose());

        // Sanity: the replaced key actually encrypts
        let sealed = loaded.seal(generate_nonce(), b"x", b"").unwrap();
        assert!(new.open(&sealed, b"").is_ok());
    }
}
