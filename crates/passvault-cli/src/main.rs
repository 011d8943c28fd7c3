//! Passvault CLI
//!
//! Local password manager: entries are encrypted at rest and only decrypted
//! one at a time, on request, after the master password is verified.

use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zeroize::Zeroizing;

use passvault_core::{
    config_file_path, credential_file_path, default_vault_dir, ensure_vault_dir, key_file_path,
    load_config, save_config, spawn_watchdog, vault_file_path, AuthError, BreachChecker,
    ClipboardBackend, CommandClipboard, EncryptionKey, EntryId, EntryUpdate, EntryView,
    HashListChecker, ImportMode, KeyManager, MasterPasswordGuard, MemoryClipboard, NotesUpdate,
    SessionController, SessionEvent, SharedClock, SharedSession, SystemClock, VaultConfig,
    VaultError, VaultStore, VAULT_DIR_ENV,
};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Password prompts allowed per command before giving up
const MAX_PROMPTS: u32 = 3;

/// Minimum master password length accepted by `init` and `passwd`
const MIN_PASSWORD_LEN: usize = 8;

/// Placeholder printed wherever a secret is not revealed
const SECRET_MASK: &str = "********";

const NO_VAULT: &str = "No vault found. Run 'passvault init' first.";

#[derive(Parser)]
#[command(name = "passvault")]
#[command(version)]
#[command(about = "Passvault - encrypted local credential vault")]
#[command(after_help = "EXAMPLES:
  passvault init                          Create a new vault
  passvault add github.com alice          Add an entry (prompts for the secret)
  passvault find git                      Search services and usernames
  passvault copy github.com               Copy a secret, cleared after 15s
  passvault show github.com --reveal      Print the secret on a terminal

The vault lives in $PASSVAULT_DIR, or ~/.passvault by default.")]
struct Cli {
    /// Vault directory (overrides $PASSVAULT_DIR)
    #[arg(long, global = true)]
    vault_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault: master password and key file
    Init,

    /// Add an entry (the secret is prompted for, never passed as an argument)
    Add {
        /// Service name, e.g. github.com
        service: String,
        /// Username or login for the service
        username: String,
        /// Free-form notes, stored encrypted
        #[arg(long)]
        notes: Option<String>,
    },

    /// List entries whose service or username contains QUERY
    Find {
        /// Case-insensitive search text (lists everything when omitted)
        query: Option<String>,
    },

    /// Show an entry; the secret is masked unless --reveal on a terminal
    Show {
        /// Entry id, id prefix or service name
        entry: String,
        /// Print the full secret and notes
        #[arg(long)]
        reveal: bool,
    },

    /// Copy an entry's secret to the clipboard, clearing it afterwards
    Copy {
        /// Entry id, id prefix or service name
        entry: String,
    },

    /// Change an entry's secret, username or notes
    #[command(after_help = "EXAMPLES:
  passvault update github.com --secret          Prompt for a new secret
  passvault update github.com --username bob    Rename the login
  passvault update github.com --clear-notes     Remove the notes")]
    Update {
        /// Entry id, id prefix or service name
        entry: String,
        /// Prompt for a new secret
        #[arg(long)]
        secret: bool,
        /// New username
        #[arg(long)]
        username: Option<String>,
        /// Replace the notes
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        /// Remove the notes
        #[arg(long)]
        clear_notes: bool,
    },

    /// Remove an entry
    Remove {
        /// Entry id, id prefix or service name
        entry: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Write an encrypted backup (readable only with this vault's key file)
    Export {
        /// Destination file
        path: PathBuf,
    },

    /// Read an encrypted backup into the vault
    Import {
        /// Backup file written by 'passvault export'
        path: PathBuf,
        /// Replace every entry instead of merging by id
        #[arg(long)]
        replace: bool,
    },

    /// Change the master password
    Passwd,

    /// Re-encrypt every entry under a freshly generated key
    Rekey,

    /// Check stored secrets against an offline list of breached SHA-256 digests
    Check {
        /// File with one hex SHA-256 digest per line
        list: PathBuf,
    },

    /// Show vault location, files and integrity (no password needed)
    Status,
}

/// Initialize logging
fn init_logging() {
    // Log to stderr so command output on stdout stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => {
            println!("Passvault - encrypted local credential vault");
            println!();
            println!("Run 'passvault --help' for usage information.");
            println!("Run 'passvault init' to create a new vault.");
        }
        Some(cmd) => {
            let vault_dir = cli.vault_dir.unwrap_or_else(default_vault_dir);
            debug!("Using vault directory {}", vault_dir.display());

            if let Err(e) = handle_command(cmd, &vault_dir).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn handle_command(cmd: Commands, vault_dir: &Path) -> CliResult {
    match cmd {
        Commands::Init => handle_init(vault_dir).await?,
        Commands::Add {
            service,
            username,
            notes,
        } => handle_add(vault_dir, &service, &username, notes.as_deref()).await?,
        Commands::Find { query } => handle_find(vault_dir, query.as_deref().unwrap_or("")).await?,
        Commands::Show { entry, reveal } => handle_show(vault_dir, &entry, reveal).await?,
        Commands::Copy { entry } => handle_copy(vault_dir, &entry).await?,
        Commands::Update {
            entry,
            secret,
            username,
            notes,
            clear_notes,
        } => {
            let notes = match (notes, clear_notes) {
                (Some(text), _) => NotesUpdate::Set(text),
                (None, true) => NotesUpdate::Clear,
                (None, false) => NotesUpdate::Keep,
            };
            handle_update(vault_dir, &entry, secret, username, notes).await?
        }
        Commands::Remove { entry, yes } => handle_remove(vault_dir, &entry, yes).await?,
        Commands::Export { path } => handle_export(vault_dir, &path).await?,
        Commands::Import { path, replace } => handle_import(vault_dir, &path, replace).await?,
        Commands::Passwd => handle_passwd(vault_dir).await?,
        Commands::Rekey => handle_rekey(vault_dir).await?,
        Commands::Check { list } => handle_check(vault_dir, &list).await?,
        Commands::Status => handle_status(vault_dir).await?,
    }

    Ok(())
}

// === Vault access ===

/// An unlocked vault for the duration of one command
struct OpenVault {
    keys: KeyManager,
    store: VaultStore,
    session: SessionController,
}

async fn open_vault(vault_dir: &Path, clipboard: Box<dyn ClipboardBackend>) -> CliResult<OpenVault> {
    let config = load_config(vault_dir).await?;
    let clock: SharedClock = Arc::new(SystemClock);

    let mut guard =
        MasterPasswordGuard::open(credential_file_path(vault_dir), &config, clock.clone()).await?;
    if !guard.is_initialized() {
        return Err(NO_VAULT.into());
    }

    let keys = KeyManager::new(key_file_path(vault_dir));
    let key = keys.load_key().await?.ok_or_else(|| {
        format!(
            "Key file {} is missing. Entries in this vault cannot be decrypted without it; restore it from a backup.",
            keys.path().display()
        )
    })?;

    let mut session = SessionController::new(&config, clock, clipboard);
    unlock(&mut guard, &mut session)?;

    let mut store = VaultStore::new(vault_file_path(vault_dir), key);
    store.load().await?;
    if store.is_dirty() {
        store.persist().await?;
        info!("Upgraded vault container to the current format");
    }

    Ok(OpenVault {
        keys,
        store,
        session,
    })
}

/// Prompt for the master password until it is accepted or prompts run out
fn unlock(guard: &mut MasterPasswordGuard, session: &mut SessionController) -> CliResult {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let password = Zeroizing::new(prompt_password("Master password: ")?);

        match session.unlock(guard, &password) {
            Ok(()) => return Ok(()),
            Err(VaultError::Auth(AuthError::Mismatch)) if attempt < MAX_PROMPTS => {
                eprintln!("Wrong password, try again.");
            }
            Err(VaultError::Auth(AuthError::Backoff { remaining })) => {
                return Err(format!(
                    "Too many failed attempts. Try again in {}s.",
                    remaining.as_secs().max(1)
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Resolve an entry selector: full id, unique id prefix, or unique service name
fn resolve_entry(
    store: &VaultStore,
    session: &mut SessionController,
    selector: &str,
) -> CliResult<EntryId> {
    if let Ok(id) = selector.parse::<EntryId>() {
        return Ok(id);
    }

    let views: Vec<EntryView> = store.find_entries(session, "")?.collect();

    let prefix = selector.to_lowercase();
    let by_prefix: Vec<&EntryView> = views
        .iter()
        .filter(|v| v.id.to_string().starts_with(&prefix))
        .collect();
    if prefix.len() >= 4 && by_prefix.len() == 1 {
        return Ok(by_prefix[0].id);
    }

    let by_service: Vec<&EntryView> = views
        .iter()
        .filter(|v| v.service.eq_ignore_ascii_case(selector))
        .collect();
    match by_service.as_slice() {
        [one] => Ok(one.id),
        [] => Err(format!("No entry matches '{}'", selector).into()),
        many => Err(format!(
            "'{}' matches {} entries. Use an id prefix from 'passvault find'.",
            selector,
            many.len()
        )
        .into()),
    }
}

// === Command Handlers ===

async fn handle_init(vault_dir: &Path) -> CliResult {
    let config = load_config(vault_dir).await?;
    let clock: SharedClock = Arc::new(SystemClock);
    let mut guard =
        MasterPasswordGuard::open(credential_file_path(vault_dir), &config, clock).await?;

    if guard.is_initialized() {
        println!("Vault already exists at {}", vault_dir.display());
        return Ok(());
    }

    let keys = KeyManager::new(key_file_path(vault_dir));
    ensure_key_not_lost(vault_dir, &keys).await?;

    println!("Creating new vault at {}", vault_dir.display());
    println!();

    let password = prompt_new_password("Enter master password: ")?;

    ensure_vault_dir(vault_dir).await?;
    if !config_file_path(vault_dir).exists() {
        save_config(vault_dir, &VaultConfig::default()).await?;
    }

    let key = keys.load_or_create_key().await?;
    let mut store = VaultStore::new(vault_file_path(vault_dir), key);
    store.load().await?;
    guard.initialize(&password).await?;
    store.persist().await?;

    println!();
    println!("Vault created successfully!");
    println!();
    println!("IMPORTANT: back up {}.", keys.path().display());
    println!("Without it no entry can ever be decrypted, even with the master password.");
    println!();
    println!("Next steps:");
    println!("  passvault add <service> <username>   Add an entry");
    println!("  Set {} to use another vault directory", VAULT_DIR_ENV);

    Ok(())
}

/// Refuse to create a key next to a container sealed by a key that is gone
async fn ensure_key_not_lost(vault_dir: &Path, keys: &KeyManager) -> CliResult {
    let container = vault_file_path(vault_dir);
    if container.exists() && !keys.key_exists().await {
        return Err(format!(
            "{} exists but its key file {} is missing. A new key could never decrypt \
             those entries; restore the key file from a backup first.",
            container.display(),
            keys.path().display()
        )
        .into());
    }
    Ok(())
}

async fn handle_add(vault_dir: &Path, service: &str, username: &str, notes: Option<&str>) -> CliResult {
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;

    let secret = prompt_secret()?;
    let id = vault
        .store
        .add_entry(&mut vault.session, service, username, &secret, notes)?;
    vault.store.persist().await?;

    println!("Value: {}", SECRET_MASK);
    println!("Added {} ({}) as {}", service, username, short_id(&id));

    Ok(())
}

async fn handle_find(vault_dir: &Path, query: &str) -> CliResult {
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;

    let views: Vec<EntryView> = vault.store.find_entries(&mut vault.session, query)?.collect();
    if views.is_empty() {
        println!("No entries found.");
        return Ok(());
    }

    println!("{:<10} {:<30} {:<24} UPDATED", "ID", "SERVICE", "USERNAME");
    for view in &views {
        println!(
            "{:<10} {:<30} {:<24} {}",
            short_id(&view.id),
            view.service,
            view.username,
            view.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    println!("{} entr{}", views.len(), if views.len() == 1 { "y" } else { "ies" });

    Ok(())
}

async fn handle_show(vault_dir: &Path, selector: &str, reveal: bool) -> CliResult {
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;
    let id = resolve_entry(&vault.store, &mut vault.session, selector)?;
    let view = vault.store.get_entry(&mut vault.session, &id)?;

    println!("Id:       {}", view.id);
    println!("Service:  {}", view.service);
    println!("Username: {}", view.username);
    println!("Created:  {}", view.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Updated:  {}", view.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    if should_reveal(reveal, atty::is(atty::Stream::Stdout)) {
        let secret = vault.store.reveal_secret(&mut vault.session, &id)?;
        println!("Secret:   {}", secret.expose_secret());
        if let Some(notes) = vault.store.reveal_notes(&mut vault.session, &id)? {
            println!("Notes:    {}", notes.expose_secret());
        }
    } else {
        println!("Secret:   {}", SECRET_MASK);
        if view.has_notes {
            println!("Notes:    (encrypted, use --reveal)");
        }
        if reveal {
            println!();
            println!("--reveal requires direct terminal access.");
        }
    }

    Ok(())
}

async fn handle_copy(vault_dir: &Path, selector: &str) -> CliResult {
    let clipboard = CommandClipboard::detect()
        .ok_or("No clipboard utility found (pbcopy, wl-copy, xclip, xsel or clip)")?;
    debug!("Using clipboard program {}", clipboard.program());

    let OpenVault {
        store, mut session, ..
    } = open_vault(vault_dir, Box::new(clipboard)).await?;

    let id = resolve_entry(&store, &mut session, selector)?;
    let view = store.get_entry(&mut session, &id)?;
    let secret = store.reveal_secret(&mut session, &id)?;
    session.copy_secret_to_clipboard(&secret)?;
    drop(secret);

    let delay = session.clipboard_pending().unwrap_or_default();
    println!(
        "Copied secret for {} ({}). Clipboard clears in {}s; Ctrl-C clears it now.",
        view.service,
        view.username,
        delay.as_secs()
    );

    let shared: SharedSession = Arc::new(tokio::sync::Mutex::new(session));
    let (watchdog, mut events) = spawn_watchdog(shared.clone(), Duration::from_millis(250));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::ClipboardCleared) | None => break,
                Some(SessionEvent::Locked(reason)) => debug!(?reason, "Session locked while waiting"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    shared.lock().await.terminate();
    watchdog.await?;
    println!("Clipboard cleared.");

    Ok(())
}

async fn handle_update(
    vault_dir: &Path,
    selector: &str,
    new_secret: bool,
    username: Option<String>,
    notes: NotesUpdate,
) -> CliResult {
    if !new_secret && username.is_none() && matches!(notes, NotesUpdate::Keep) {
        return Err("Nothing to update. Use --secret, --username, --notes or --clear-notes.".into());
    }

    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;
    let id = resolve_entry(&vault.store, &mut vault.session, selector)?;

    let secret = if new_secret {
        let secret = prompt_secret()?;
        println!("Value: {}", SECRET_MASK);
        Some(secret)
    } else {
        None
    };

    vault.store.update_entry(
        &mut vault.session,
        &id,
        EntryUpdate {
            secret,
            username,
            notes,
        },
    )?;
    vault.store.persist().await?;

    println!("Entry {} updated", short_id(&id));

    Ok(())
}

async fn handle_remove(vault_dir: &Path, selector: &str, yes: bool) -> CliResult {
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;
    let id = resolve_entry(&vault.store, &mut vault.session, selector)?;
    let view = vault.store.get_entry(&mut vault.session, &id)?;

    if !yes {
        print!("Delete {} ({})? [y/N]: ", view.service, view.username);
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    vault.store.delete_entry(&mut vault.session, &id)?;
    vault.store.persist().await?;

    println!("Removed {} ({})", view.service, view.username);

    Ok(())
}

async fn handle_export(vault_dir: &Path, path: &Path) -> CliResult {
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;
    let count = vault.store.export(&mut vault.session, path).await?;

    println!("Exported {} entries to {}", count, path.display());
    println!("The export is encrypted and can only be imported with the key file of this vault.");

    Ok(())
}

async fn handle_import(vault_dir: &Path, path: &Path, replace: bool) -> CliResult {
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;
    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Merge
    };

    let summary = vault.store.import(&mut vault.session, path, mode).await?;
    vault.store.persist().await?;

    println!(
        "Imported from {}: {} added, {} updated, {} unchanged",
        path.display(),
        summary.added,
        summary.updated,
        summary.unchanged
    );

    Ok(())
}

async fn handle_passwd(vault_dir: &Path) -> CliResult {
    let config = load_config(vault_dir).await?;
    let clock: SharedClock = Arc::new(SystemClock);
    let mut guard =
        MasterPasswordGuard::open(credential_file_path(vault_dir), &config, clock).await?;
    if !guard.is_initialized() {
        return Err(NO_VAULT.into());
    }

    let current = Zeroizing::new(prompt_password("Current master password: ")?);
    let new = prompt_new_password("New master password: ")?;
    guard.change_password(&current, &new).await?;

    println!("Master password changed. Entries did not need re-encryption.");

    Ok(())
}

async fn handle_rekey(vault_dir: &Path) -> CliResult {
    let OpenVault {
        keys,
        mut store,
        mut session,
        ..
    } = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;

    store.rekey(&mut session, EncryptionKey::generate())?;

    // The old key stays in <key>.bak until the container is rewritten
    keys.replace_key(store.key()).await?;
    store.persist().await?;

    println!("Re-encrypted {} entries under a new key.", store.len());
    println!("Back up {} again; older backups no longer match.", keys.path().display());

    Ok(())
}

async fn handle_check(vault_dir: &Path, list: &Path) -> CliResult {
    let checker = HashListChecker::load(list).await?;
    let mut vault = open_vault(vault_dir, Box::new(MemoryClipboard::new())).await?;
    println!("Checking against {} known breached secrets", checker.len());
    println!();

    let views: Vec<EntryView> = vault.store.find_entries(&mut vault.session, "")?.collect();
    let mut breached = 0;
    for view in &views {
        let secret = vault.store.reveal_secret(&mut vault.session, &view.id)?;
        if checker.check_breached(&secret)? {
            breached += 1;
            println!("[!!] {} ({}) uses a breached secret", view.service, view.username);
        }
    }

    if breached == 0 {
        println!("[OK] None of {} entries use a known breached secret", views.len());
    } else {
        println!();
        println!("{} of {} entries should be changed", breached, views.len());
    }

    Ok(())
}

async fn handle_status(vault_dir: &Path) -> CliResult {
    println!("Vault Status");
    println!("============");
    println!();

    let config = match load_config(vault_dir).await {
        Ok(config) => config,
        Err(e) => {
            println!("[!!] {}", e);
            VaultConfig::default()
        }
    };
    let clock: SharedClock = Arc::new(SystemClock);
    let guard = MasterPasswordGuard::open(credential_file_path(vault_dir), &config, clock).await?;
    if guard.is_initialized() {
        println!("[OK] Vault found at {}", vault_dir.display());
    } else {
        println!("[!!] {}", NO_VAULT);
        return Ok(());
    }

    let vault_path = vault_file_path(vault_dir);
    let keys = KeyManager::new(key_file_path(vault_dir));
    #[cfg(unix)]
    for path in [vault_path.as_path(), keys.path(), guard.path()] {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode() & 0o777;
            if mode == 0o600 {
                println!("[OK] {}: 600 (owner only)", path.display());
            } else {
                println!("[!!] {}: {:o} (should be 600)", path.display(), mode);
            }
        }
    }

    let Some(key) = keys.load_key().await? else {
        println!("[!!] Key file missing at {}: entries cannot be decrypted", keys.path().display());
        return Ok(());
    };

    let mut store = VaultStore::new(&vault_path, key);
    match store.load().await {
        Ok(()) => println!("[OK] {} entries, all authenticate", store.len()),
        Err(VaultError::Tampered) => {
            store.load_deferred().await?;
            println!(
                "[!!] {} entries, at least one fails authentication (modified file or wrong key)",
                store.len()
            );
        }
        Err(e) => println!("[!!] Vault file unreadable: {}", e),
    }

    println!();
    println!("Auto-lock after {}s of inactivity", config.auto_lock_timeout_seconds);
    println!("Clipboard cleared after {}s", config.clipboard_clear_seconds);

    Ok(())
}

// === Helper Functions ===

fn prompt_password(prompt: &str) -> CliResult<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    Ok(password)
}

/// Prompt twice for a new master password and check it
fn prompt_new_password(prompt: &str) -> CliResult<Zeroizing<String>> {
    let password = Zeroizing::new(prompt_password(prompt)?);
    let confirm = Zeroizing::new(prompt_password("Confirm master password: ")?);

    if password != confirm {
        return Err("Passwords do not match".into());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {} characters", MIN_PASSWORD_LEN).into());
    }
    Ok(password)
}

fn prompt_secret() -> CliResult<SecretString> {
    let secret = prompt_password("Secret: ")?;
    let confirm = Zeroizing::new(prompt_password("Confirm secret: ")?);
    if secret != *confirm {
        return Err("Secrets do not match".into());
    }
    Ok(SecretString::new(secret))
}

fn short_id(id: &EntryId) -> String {
    id.to_string().chars().take(8).collect()
}

/// Secrets are only decrypted for `--reveal` on a terminal, never into a pipe
fn should_reveal(requested: bool, stdout_is_tty: bool) -> bool {
    requested && stdout_is_tty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_only_revealed_on_request_to_terminal() {
        assert!(should_reveal(true, true));
        assert!(!should_reveal(true, false));
        assert!(!should_reveal(false, true));
        assert!(!should_reveal(false, false));
    }

    #[tokio::test]
    async fn test_init_refuses_container_without_key() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let keys = KeyManager::new(key_file_path(temp_dir.path()));

        ensure_key_not_lost(temp_dir.path(), &keys).await.unwrap();

        std::fs::write(vault_file_path(temp_dir.path()), b"{}").unwrap();
        assert!(ensure_key_not_lost(temp_dir.path(), &keys).await.is_err());
        assert!(!keys.key_exists().await);

        keys.load_or_create_key().await.unwrap();
        ensure_key_not_lost(temp_dir.path(), &keys).await.unwrap();
    }

    #[test]
    fn test_cli_parses_update_flags() {
        let cli = Cli::try_parse_from([
            "passvault",
            "update",
            "github.com",
            "--username",
            "bob",
            "--clear-notes",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Update {
                entry,
                secret,
                username,
                notes,
                clear_notes,
            }) => {
                assert_eq!(entry, "github.com");
                assert!(!secret);
                assert_eq!(username.as_deref(), Some("bob"));
                assert!(notes.is_none());
                assert!(clear_notes);
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_notes_and_clear_notes_conflict() {
        let result = Cli::try_parse_from([
            "passvault",
            "update",
            "x",
            "--notes",
            "n",
            "--clear-notes",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_vault_dir_is_global() {
        let cli = Cli::try_parse_from(["passvault", "status", "--vault-dir", "/tmp/v"]).unwrap();
        assert_eq!(cli.vault_dir, Some(PathBuf::from("/tmp/v")));
    }
}
