//! Breach checking for stored secrets
//!
//! Checking is opt-in and lives outside the encryption path: a caller that
//! already holds a revealed secret hands it to a [`BreachChecker`]. The
//! shipped checker works offline against a list of SHA-256 digests, so the
//! plaintext never leaves the process.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::crypto::compute_checksum;
use crate::error::BreachCheckError;

/// Something that can tell whether a secret is known to be compromised
pub trait BreachChecker {
    fn check_breached(&self, secret: &SecretString) -> Result<bool, BreachCheckError>;
}

/// Offline checker backed by a set of SHA-256 digests of breached secrets
#[derive(Debug, Clone, Default)]
pub struct HashListChecker {
    digests: HashSet<[u8; 32]>,
}

impl HashListChecker {
    pub fn from_digests(digests: impl IntoIterator<Item = [u8; 32]>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    /// Load a digest list: one hex SHA-256 per line. Blank lines and lines
    /// starting with `#` are skipped.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BreachCheckError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let checker = Self::parse(&content)?;
        debug!(
            "Loaded {} breached digests from {}",
            checker.len(),
            path.as_ref().display()
        );
        Ok(checker)
    }

    fn parse(content: &str) -> Result<Self, BreachCheckError> {
        let mut digests = HashSet::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut digest = [0u8; 32];
            hex::decode_to_slice(line, &mut digest)
                .map_err(|_| BreachCheckError::InvalidEntry { line: index + 1 })?;
            digests.insert(digest);
        }
        Ok(Self { digests })
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl BreachChecker for HashListChecker {
    fn check_breached(&self, secret: &SecretString) -> Result<bool, BreachCheckError> {
        let digest = compute_checksum(secret.expose_secret().as_bytes());
        Ok(self.digests.contains(&digest))
    }
}
