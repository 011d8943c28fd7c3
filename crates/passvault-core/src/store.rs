//! Encrypted entry store
//!
//! Each entry's secret (and optional notes) is sealed with AES-256-GCM under
//! its own random nonce. The entry id, service and username are bound into
//! the authentication tag as associated data, so editing any of them on disk
//! makes the entry fail to open.
//!
//! Every operation that hands out or changes entry data requires an unlocked
//! session. `persist` and `load` only move ciphertext between memory and disk
//! and do not.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::audit::AuditEvent;
use crate::crypto::{generate_nonce, EncryptionKey, NONCE_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::models::{
    ContainerProbe, EntryId, EntryView, LegacyContainerV1, SealedField, VaultContainer, VaultEntry,
};
use crate::session::SessionController;
use crate::storage::{backup_existing, backup_path, read_optional, write_atomic};

/// Domain tag prefixed to every associated-data string
const AAD_DOMAIN: &str = "passvault/v2";

/// Which sealed field of an entry an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Secret,
    Notes,
}

impl Field {
    fn as_str(self) -> &'static str {
        match self {
            Field::Secret => "secret",
            Field::Notes => "notes",
        }
    }
}

/// Associated data for one field: every part length-prefixed
fn associated_data(id: &EntryId, service: &str, username: &str, field: Field) -> Vec<u8> {
    let id = id.to_string();
    let parts = [
        AAD_DOMAIN.as_bytes(),
        id.as_bytes(),
        service.as_bytes(),
        username.as_bytes(),
        field.as_str().as_bytes(),
    ];

    let mut aad = Vec::with_capacity(parts.iter().map(|p| p.len() + 8).sum());
    for part in parts {
        aad.extend_from_slice(&(part.len() as u64).to_le_bytes());
        aad.extend_from_slice(part);
    }
    aad
}

/// Draw a nonce that is not yet in `used`, and mark it used
fn draw_nonce(used: &mut HashSet<[u8; NONCE_SIZE]>) -> [u8; NONCE_SIZE] {
    loop {
        let nonce = generate_nonce();
        if used.insert(nonce) {
            return nonce;
        }
        debug!("Nonce collision, drawing again");
    }
}

/// Seals entry fields under one key with nonces unique to that key
struct Sealer<'a> {
    key: &'a EncryptionKey,
    nonces: &'a mut HashSet<[u8; NONCE_SIZE]>,
}

impl Sealer<'_> {
    fn seal(
        &mut self,
        id: &EntryId,
        service: &str,
        username: &str,
        field: Field,
        plaintext: &[u8],
    ) -> VaultResult<SealedField> {
        let nonce = draw_nonce(self.nonces);
        let aad = associated_data(id, service, username, field);
        self.key.seal(nonce, plaintext, &aad)
    }
}

fn open_field(
    key: &EncryptionKey,
    entry: &VaultEntry,
    field: Field,
) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
    let sealed = match field {
        Field::Secret => &entry.secret,
        Field::Notes => match &entry.notes {
            Some(notes) => notes,
            None => return Ok(None),
        },
    };
    let aad = associated_data(&entry.id, &entry.service, &entry.username, field);
    key.open(sealed, &aad).map(Some)
}

fn into_text(plaintext: Zeroizing<Vec<u8>>) -> VaultResult<SecretString> {
    let text = String::from_utf8(plaintext.to_vec())
        .map_err(|_| VaultError::Corrupt("decrypted field is not valid UTF-8".into()))?;
    Ok(SecretString::new(text))
}

/// Tri-state change to an entry's notes
#[derive(Debug, Clone, Default)]
pub enum NotesUpdate {
    #[default]
    Keep,
    Set(String),
    Clear,
}

/// Fields to change in [`VaultStore::update_entry`]; `None` keeps the value
#[derive(Debug, Default)]
pub struct EntryUpdate {
    pub secret: Option<SecretString>,
    pub username: Option<String>,
    pub notes: NotesUpdate,
}

/// How imported entries combine with the current set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Match by id; keep whichever copy was updated last
    #[default]
    Merge,
    /// Discard the current set
    Replace,
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Lazy, restartable sequence of entry views matching a query
#[derive(Debug, Clone)]
pub struct Matches<'a> {
    entries: std::slice::Iter<'a, VaultEntry>,
    needle: String,
}

impl Iterator for Matches<'_> {
    type Item = EntryView;

    fn next(&mut self) -> Option<EntryView> {
        let needle = &self.needle;
        self.entries.find(|e| e.matches(needle)).map(VaultEntry::view)
    }
}

#[derive(Serialize)]
struct ContainerRef<'a> {
    version: u32,
    entries: &'a [VaultEntry],
}

/// The entry collection of one vault, backed by a container file
pub struct VaultStore {
    path: PathBuf,
    key: EncryptionKey,
    entries: Vec<VaultEntry>,
    nonces: HashSet<[u8; NONCE_SIZE]>,
    dirty: bool,
}

impl VaultStore {
    /// Empty store backed by `path`; call [`load`](Self::load) to read it
    pub fn new(path: impl Into<PathBuf>, key: EncryptionKey) -> Self {
        Self {
            path: path.into(),
            key,
            entries: Vec::new(),
            nonces: HashSet::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether there are changes not yet written by `persist`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn sealer(&mut self) -> Sealer<'_> {
        Sealer {
            key: &self.key,
            nonces: &mut self.nonces,
        }
    }

    fn position(&self, id: &EntryId) -> VaultResult<usize> {
        self.entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or(VaultError::NotFound(*id))
    }

    fn entry(&self, id: &EntryId) -> VaultResult<&VaultEntry> {
        self.position(id).map(|i| &self.entries[i])
    }

    /// Encrypt and store a new entry
    pub fn add_entry(
        &mut self,
        session: &mut SessionController,
        service: &str,
        username: &str,
        secret: &SecretString,
        notes: Option<&str>,
    ) -> VaultResult<EntryId> {
        session.ensure_unlocked()?;

        let id = EntryId::generate();
        let mut sealer = self.sealer();
        let sealed_secret = sealer.seal(
            &id,
            service,
            username,
            Field::Secret,
            secret.expose_secret().as_bytes(),
        )?;
        let sealed_notes = notes
            .map(|n| sealer.seal(&id, service, username, Field::Notes, n.as_bytes()))
            .transpose()?;

        let now = Utc::now();
        self.entries.push(VaultEntry {
            id,
            service: service.to_string(),
            username: username.to_string(),
            secret: sealed_secret,
            notes: sealed_notes,
            created_at: now,
            updated_at: now,
        });
        self.dirty = true;

        session.record(AuditEvent::EntryCreated {
            entry_id: id,
            service: service.to_string(),
        });
        session.touch();
        Ok(id)
    }

    /// Entries whose service or username contains `query`, ignoring case.
    /// An empty query matches every entry.
    pub fn find_entries<'a>(
        &'a self,
        session: &mut SessionController,
        query: &str,
    ) -> VaultResult<Matches<'a>> {
        session.ensure_unlocked()?;
        session.touch();

        Ok(Matches {
            entries: self.entries.iter(),
            needle: query.to_lowercase(),
        })
    }

    pub fn get_entry(&self, session: &mut SessionController, id: &EntryId) -> VaultResult<EntryView> {
        session.ensure_unlocked()?;
        let view = self.entry(id)?.view();
        session.touch();
        Ok(view)
    }

    /// Decrypt an entry's secret
    pub fn reveal_secret(
        &self,
        session: &mut SessionController,
        id: &EntryId,
    ) -> VaultResult<SecretString> {
        session.ensure_unlocked()?;

        let entry = self.entry(id)?;
        let plaintext = open_field(&self.key, entry, Field::Secret)?
            .ok_or_else(|| VaultError::Corrupt("entry has no secret".into()))?;
        let secret = into_text(plaintext)?;

        session.record(AuditEvent::SecretRevealed {
            entry_id: *id,
            service: entry.service.clone(),
            field: Field::Secret.as_str().to_string(),
        });
        session.touch();
        Ok(secret)
    }

    /// Decrypt an entry's notes, `None` if it has none
    pub fn reveal_notes(
        &self,
        session: &mut SessionController,
        id: &EntryId,
    ) -> VaultResult<Option<SecretString>> {
        session.ensure_unlocked()?;

        let entry = self.entry(id)?;
        let notes = open_field(&self.key, entry, Field::Notes)?
            .map(into_text)
            .transpose()?;

        if notes.is_some() {
            session.record(AuditEvent::SecretRevealed {
                entry_id: *id,
                service: entry.service.clone(),
                field: Field::Notes.as_str().to_string(),
            });
        }
        session.touch();
        Ok(notes)
    }

    /// Change an entry's secret, username or notes.
    ///
    /// Changed fields are sealed under fresh nonces. A new username changes
    /// the associated data, so the existing secret and notes are re-sealed
    /// too. On any error the entry is left as it was.
    pub fn update_entry(
        &mut self,
        session: &mut SessionController,
        id: &EntryId,
        update: EntryUpdate,
    ) -> VaultResult<()> {
        session.ensure_unlocked()?;

        let index = self.position(id)?;
        let current = &self.entries[index];
        let service = current.service.clone();
        let username = update
            .username
            .clone()
            .unwrap_or_else(|| current.username.clone());
        let rebind = username != current.username;

        let mut fields = Vec::new();
        if rebind {
            fields.push("username");
        }

        // Everything that must be re-sealed is opened before anything changes
        let kept_secret = match (&update.secret, rebind) {
            (None, true) => open_field(&self.key, current, Field::Secret)?,
            _ => None,
        };
        let kept_notes = match (&update.notes, rebind) {
            (NotesUpdate::Keep, true) => open_field(&self.key, current, Field::Notes)?,
            _ => None,
        };
        let old_secret = current.secret.clone();
        let old_notes = current.notes.clone();

        let mut sealer = self.sealer();
        let secret = match (&update.secret, kept_secret) {
            (Some(new), _) => {
                fields.push("secret");
                sealer.seal(id, &service, &username, Field::Secret, new.expose_secret().as_bytes())?
            }
            (None, Some(plain)) => sealer.seal(id, &service, &username, Field::Secret, &plain)?,
            (None, None) => old_secret,
        };
        let notes = match (update.notes, kept_notes) {
            (NotesUpdate::Set(text), _) => {
                fields.push("notes");
                Some(sealer.seal(id, &service, &username, Field::Notes, text.as_bytes())?)
            }
            (NotesUpdate::Clear, _) => {
                fields.push("notes");
                None
            }
            (NotesUpdate::Keep, Some(plain)) => {
                Some(sealer.seal(id, &service, &username, Field::Notes, &plain)?)
            }
            (NotesUpdate::Keep, None) => old_notes,
        };

        let entry = &mut self.entries[index];
        entry.username = username;
        entry.secret = secret;
        entry.notes = notes;
        entry.updated_at = Utc::now();
        self.dirty = true;

        session.record(AuditEvent::EntryUpdated {
            entry_id: *id,
            service,
            fields: fields.into_iter().map(String::from).collect(),
        });
        session.touch();
        Ok(())
    }

    pub fn delete_entry(&mut self, session: &mut SessionController, id: &EntryId) -> VaultResult<()> {
        session.ensure_unlocked()?;

        let index = self.position(id)?;
        let removed = self.entries.remove(index);
        self.dirty = true;

        session.record(AuditEvent::EntryDeleted {
            entry_id: removed.id,
            service: removed.service,
        });
        session.touch();
        Ok(())
    }

    /// Write the container, keeping the previous file as `<name>.bak`
    pub async fn persist(&mut self) -> VaultResult<()> {
        let data = self.encode()?;
        backup_existing(&self.path, &backup_path(&self.path)).await?;
        write_atomic(&self.path, &data).await?;

        self.dirty = false;
        info!("Persisted {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    /// Read the container and authenticate every entry before accepting it.
    ///
    /// Fails with `Corrupt` if the file cannot be parsed and `Tampered` if
    /// any entry does not authenticate; the in-memory set is left unchanged
    /// on failure. A missing file loads as an empty vault.
    pub async fn load(&mut self) -> VaultResult<()> {
        self.read(true).await
    }

    /// Like [`load`](Self::load) but without authenticating entries up front;
    /// a damaged entry fails on its own when revealed.
    pub async fn load_deferred(&mut self) -> VaultResult<()> {
        self.read(false).await
    }

    async fn read(&mut self, verify: bool) -> VaultResult<()> {
        let Some(data) = read_optional(&self.path).await? else {
            debug!("No container at {}, starting empty", self.path.display());
            self.entries.clear();
            self.nonces.clear();
            self.dirty = false;
            return Ok(());
        };

        let decoded = decode_container(&data, &self.key)?;
        if verify {
            verify_entries(&self.key, &decoded.entries)?;
        }
        let nonces = index_entries(&decoded.entries)?;

        info!(
            "Loaded {} entries from {}",
            decoded.entries.len(),
            self.path.display()
        );
        self.entries = decoded.entries;
        self.nonces = nonces;
        self.dirty = decoded.migrated;
        Ok(())
    }

    fn encode(&self) -> VaultResult<Vec<u8>> {
        let container = ContainerRef {
            version: VaultContainer::CURRENT_VERSION,
            entries: &self.entries,
        };
        Ok(serde_json::to_vec_pretty(&container)?)
    }

    /// Write every entry to `path` in the container format. The file can
    /// only be read back with this vault's key.
    pub async fn export(
        &self,
        session: &mut SessionController,
        path: impl AsRef<Path>,
    ) -> VaultResult<usize> {
        session.ensure_unlocked()?;

        let path = path.as_ref();
        write_atomic(path, &self.encode()?).await?;

        let count = self.entries.len();
        session.record(AuditEvent::VaultExported {
            destination: path.display().to_string(),
            count,
        });
        session.touch();
        Ok(count)
    }

    /// Read a container written by [`export`](Self::export) and combine it
    /// with the current entries. Every imported entry is authenticated first;
    /// nothing changes unless all of them pass.
    pub async fn import(
        &mut self,
        session: &mut SessionController,
        path: impl AsRef<Path>,
        mode: ImportMode,
    ) -> VaultResult<ImportSummary> {
        session.ensure_unlocked()?;

        let path = path.as_ref();
        let data = fs::read(path).await?;
        let imported = decode_container(&data, &self.key)?.entries;
        verify_entries(&self.key, &imported)?;
        index_entries(&imported)?;

        let mut summary = ImportSummary::default();
        let merged = match mode {
            ImportMode::Replace => {
                summary.added = imported.len();
                imported
            }
            ImportMode::Merge => {
                let mut merged = self.entries.clone();
                for entry in imported {
                    match merged.iter_mut().find(|e| e.id == entry.id) {
                        Some(existing) if entry.updated_at > existing.updated_at => {
                            *existing = entry;
                            summary.updated += 1;
                        }
                        Some(_) => summary.unchanged += 1,
                        None => {
                            merged.push(entry);
                            summary.added += 1;
                        }
                    }
                }
                merged
            }
        };

        let nonces = index_entries(&merged)?;
        self.entries = merged;
        self.nonces.extend(nonces);
        self.dirty = true;

        session.record(AuditEvent::VaultImported {
            source: path.display().to_string(),
            added: summary.added,
            updated: summary.updated,
            replaced: mode == ImportMode::Replace,
        });
        session.touch();
        Ok(summary)
    }

    /// Re-encrypt every entry under `new_key` with fresh nonces.
    ///
    /// The store keeps the old key until every entry has been re-sealed; the
    /// caller must persist both the container and the new key file.
    pub fn rekey(&mut self, session: &mut SessionController, new_key: EncryptionKey) -> VaultResult<()> {
        session.ensure_unlocked()?;

        let mut nonces = HashSet::with_capacity(self.entries.len() * 2);
        let mut sealer = Sealer {
            key: &new_key,
            nonces: &mut nonces,
        };

        let mut rekeyed = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let secret = open_field(&self.key, entry, Field::Secret)?
                .ok_or_else(|| VaultError::Corrupt("entry has no secret".into()))?;
            let notes = open_field(&self.key, entry, Field::Notes)?;

            let (id, service, username) = (&entry.id, &entry.service, &entry.username);
            rekeyed.push(VaultEntry {
                secret: sealer.seal(id, service, username, Field::Secret, &secret)?,
                notes: notes
                    .map(|n| sealer.seal(id, service, username, Field::Notes, &n))
                    .transpose()?,
                ..entry.clone()
            });
        }

        self.entries = rekeyed;
        self.nonces = nonces;
        self.key = new_key;
        self.dirty = true;

        session.record(AuditEvent::VaultRekeyed {
            count: self.entries.len(),
        });
        session.touch();
        info!("Re-encrypted {} entries under a new key", self.entries.len());
        Ok(())
    }
}

struct Decoded {
    entries: Vec<VaultEntry>,
    migrated: bool,
}

fn corrupt(e: serde_json::Error) -> VaultError {
    VaultError::Corrupt(e.to_string())
}

/// Parse a container of any supported version into current-format entries
fn decode_container(data: &[u8], key: &EncryptionKey) -> VaultResult<Decoded> {
    let probe: ContainerProbe = serde_json::from_slice(data).map_err(corrupt)?;

    match probe.version {
        VaultContainer::CURRENT_VERSION => {
            let container: VaultContainer = serde_json::from_slice(data).map_err(corrupt)?;
            Ok(Decoded {
                entries: container.entries,
                migrated: false,
            })
        }
        1 => {
            let legacy: LegacyContainerV1 = serde_json::from_slice(data).map_err(corrupt)?;
            Ok(Decoded {
                entries: migrate_v1(legacy, key)?,
                migrated: true,
            })
        }
        found if found > VaultContainer::CURRENT_VERSION => Err(VaultError::UnsupportedVersion {
            found,
            supported: VaultContainer::CURRENT_VERSION,
        }),
        found => Err(VaultError::Corrupt(format!(
            "unknown container version {found}"
        ))),
    }
}

/// Re-seal version 1 entries with associated data and encrypted notes
fn migrate_v1(legacy: LegacyContainerV1, key: &EncryptionKey) -> VaultResult<Vec<VaultEntry>> {
    info!("Migrating {} entries from container version 1", legacy.entries.len());

    let mut nonces = HashSet::with_capacity(legacy.entries.len() * 2);
    let mut sealer = Sealer {
        key,
        nonces: &mut nonces,
    };

    legacy
        .entries
        .into_iter()
        .map(|old| -> VaultResult<VaultEntry> {
            let secret = key.open_combined(&old.nonce, &old.ciphertext)?;
            let (id, service, username) = (&old.id, &old.service, &old.username);
            Ok(VaultEntry {
                id: old.id,
                secret: sealer.seal(id, service, username, Field::Secret, &secret)?,
                notes: old
                    .notes
                    .as_deref()
                    .map(|n| sealer.seal(id, service, username, Field::Notes, n.as_bytes()))
                    .transpose()?,
                service: old.service.clone(),
                username: old.username.clone(),
                created_at: old.created_at,
                updated_at: old.updated_at,
            })
        })
        .collect()
}

/// Authenticate every sealed field, discarding the plaintext
fn verify_entries(key: &EncryptionKey, entries: &[VaultEntry]) -> VaultResult<()> {
    for entry in entries {
        open_field(key, entry, Field::Secret)?;
        open_field(key, entry, Field::Notes)?;
    }
    Ok(())
}

/// Collect the nonces in use, rejecting repeated ids or nonces
fn index_entries(entries: &[VaultEntry]) -> VaultResult<HashSet<[u8; NONCE_SIZE]>> {
    let mut ids = HashSet::with_capacity(entries.len());
    let mut nonces = HashSet::with_capacity(entries.len() * 2);

    for entry in entries {
        if !ids.insert(entry.id) {
            return Err(VaultError::Corrupt(format!("duplicate entry id {}", entry.id)));
        }
        for nonce in entry.nonces() {
            if !nonces.insert(*nonce) {
                return Err(VaultError::Corrupt(format!(
                    "nonce reused by entry {}",
                    entry.id
                )));
            }
        }
    }
    Ok(nonces)
}
