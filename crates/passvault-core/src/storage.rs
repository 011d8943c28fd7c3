//! Vault directory layout and file primitives
//!
//! Handles reading/writing vault files with:
//! - Atomic writes (write to temp, then rename)
//! - Owner-only permissions on Unix
//! - A single backup of the previous container before overwrite

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::models::VaultConfig;

/// Environment variable overriding the vault directory
pub const VAULT_DIR_ENV: &str = "PASSVAULT_DIR";

/// Default vault directory name
const VAULT_DIR: &str = ".passvault";

/// Main vault file name
const VAULT_FILE: &str = "vault.json";

/// Key material file name
const KEY_FILE: &str = "vault.key";

/// Master credential file name
const CREDENTIAL_FILE: &str = "master.json";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Get the default vault directory path
pub fn default_vault_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(VAULT_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(VAULT_DIR)
}

/// Get the vault file path
pub fn vault_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(VAULT_FILE)
}

/// Sibling path holding the previous version of `path` (`<name>.bak`)
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Get the key material file path
pub fn key_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(KEY_FILE)
}

/// Get the master credential file path
pub fn credential_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CREDENTIAL_FILE)
}

/// Get the config file path
pub fn config_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE)
}

/// Ensure the vault directory exists with proper permissions
pub async fn ensure_vault_dir(base_dir: &Path) -> io::Result<()> {
    if !base_dir.exists() {
        fs::create_dir_all(base_dir).await?;

        // Set directory permissions to 700 (owner only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_dir, perms).await?;
        }
    }
    Ok(())
}

/// Read a whole file, treating "not found" as `None`
pub async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write `data` to `path` through a sibling temp file and a rename, so a
/// crash mid-write leaves the previous file intact.
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let result = write_synced(&temp_path, data).await;
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    fs::rename(&temp_path, path).await?;
    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;

    // Set file permissions to 600 (owner only) on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).await?;
    }

    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Copy the current file at `path` to `backup` (if it exists)
pub async fn backup_existing(path: &Path, backup: &Path) -> io::Result<()> {
    if path.exists() {
        fs::copy(path, backup).await?;
    }
    Ok(())
}

/// Load vault configuration
pub async fn load_config(base_dir: &Path) -> VaultResult<VaultConfig> {
    let config_path = config_file_path(base_dir);

    let Some(content) = read_optional(&config_path).await? else {
        return Ok(VaultConfig::default());
    };

    let content = String::from_utf8(content).map_err(|e| VaultError::Config(e.to_string()))?;
    toml::from_str(&content).map_err(|e| VaultError::Config(e.to_string()))
}

/// Save vault configuration
pub async fn save_config(base_dir: &Path, config: &VaultConfig) -> VaultResult<()> {
    ensure_vault_dir(base_dir).await?;

    let content =
        toml::to_string_pretty(config).map_err(|e| VaultError::Config(e.to_string()))?;
    write_atomic(&config_file_path(base_dir), content.as_bytes()).await?;

    Ok(())
}
