//! End-to-end vault workflows across key, master password, store and session.

mod common;

use common::{secret, TestVault, MASTER_PASSWORD};
use passvault_core::{
    AuditEvent, AuthError, EncryptionKey, EntryUpdate, ImportMode, LockReason, SessionState,
    VaultError,
};
use secrecy::ExposeSecret;
use std::time::Duration;

#[tokio::test]
async fn test_add_find_reveal_delete_scenario() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    store.load().await.unwrap();

    let id = store
        .add_entry(&mut session, "github.com", "alice", &secret("s3cr3t"), None)
        .unwrap();

    let found: Vec<_> = store.find_entries(&mut session, "git").unwrap().collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].service, "github.com");

    let revealed = store.reveal_secret(&mut session, &found[0].id).unwrap();
    assert_eq!(revealed.expose_secret(), "s3cr3t");

    store.delete_entry(&mut session, &id).unwrap();
    assert_eq!(store.find_entries(&mut session, "git").unwrap().count(), 0);
}

#[tokio::test]
async fn test_persist_then_reopen_reproduces_vault() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;

    let github = store
        .add_entry(&mut session, "github.com", "alice", &secret("s3cr3t"), Some("recovery codes"))
        .unwrap();
    let bank = store
        .add_entry(&mut session, "bank|main", "alice:x", &secret("p|a:s\ns"), None)
        .unwrap();
    store.persist().await.unwrap();
    let before: Vec<_> = store.find_entries(&mut session, "").unwrap().collect();
    drop(store);
    drop(session);

    // A fresh process: new guard, new session, key read back from disk
    let mut session = vault.initialized_session().await;
    let mut reopened = vault.store().await;
    reopened.load().await.unwrap();

    let after: Vec<_> = reopened.find_entries(&mut session, "").unwrap().collect();
    assert_eq!(before, after);
    assert_eq!(
        reopened.reveal_secret(&mut session, &github).unwrap().expose_secret(),
        "s3cr3t"
    );
    assert_eq!(
        reopened.reveal_secret(&mut session, &bank).unwrap().expose_secret(),
        "p|a:s\ns"
    );
    let notes = reopened.reveal_notes(&mut session, &github).unwrap().unwrap();
    assert_eq!(notes.expose_secret(), "recovery codes");
}

#[tokio::test]
async fn test_lost_key_file_fails_every_entry() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    let ids = [
        store
            .add_entry(&mut session, "github.com", "alice", &secret("one"), None)
            .unwrap(),
        store
            .add_entry(&mut session, "mail", "alice", &secret("two"), Some("n"))
            .unwrap(),
    ];
    store.persist().await.unwrap();
    drop(store);

    tokio::fs::remove_file(vault.keys().path()).await.unwrap();

    // A new key is generated in place of the lost one
    let mut store = vault.store().await;
    assert!(matches!(store.load().await, Err(VaultError::Tampered)));

    store.load_deferred().await.unwrap();
    assert_eq!(store.len(), 2);
    for id in &ids {
        assert!(matches!(
            store.reveal_secret(&mut session, id),
            Err(VaultError::Tampered)
        ));
    }
}

#[tokio::test]
async fn test_timeout_blocks_store_until_reauthenticated() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    let id = store
        .add_entry(&mut session, "svc", "user", &secret("pw"), None)
        .unwrap();

    vault.clock.advance(Duration::from_secs(299));
    store.reveal_secret(&mut session, &id).unwrap();

    vault.clock.advance(Duration::from_secs(300));
    assert!(matches!(
        store.reveal_secret(&mut session, &id),
        Err(VaultError::SessionLocked)
    ));
    assert_eq!(session.state(), SessionState::Locked);

    let mut guard = vault.guard().await;
    session.unlock(&mut guard, MASTER_PASSWORD).unwrap();
    assert_eq!(
        store.reveal_secret(&mut session, &id).unwrap().expose_secret(),
        "pw"
    );
}

#[tokio::test]
async fn test_copied_secret_is_wiped() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    let id = store
        .add_entry(&mut session, "github.com", "alice", &secret("s3cr3t"), None)
        .unwrap();

    let revealed = store.reveal_secret(&mut session, &id).unwrap();
    session.copy_secret_to_clipboard(&revealed).unwrap();
    assert_eq!(vault.clipboard.contents().as_deref(), Some("s3cr3t"));

    vault.clock.advance(Duration::from_secs(14));
    session.poll();
    assert_eq!(vault.clipboard.contents().as_deref(), Some("s3cr3t"));

    vault.clock.advance(Duration::from_secs(1));
    session.poll();
    assert_eq!(vault.clipboard.contents(), None);
}

#[tokio::test]
async fn test_manual_lock_wipes_clipboard_early() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    session.copy_secret_to_clipboard(&secret("s3cr3t")).unwrap();

    vault.clock.advance(Duration::from_secs(3));
    session.lock(LockReason::Manual);
    assert_eq!(vault.clipboard.contents(), None);
    assert!(matches!(
        session.copy_secret_to_clipboard(&secret("again")),
        Err(VaultError::SessionLocked)
    ));
}

#[tokio::test]
async fn test_rekey_and_replace_key_file() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    let id = store
        .add_entry(&mut session, "svc", "user", &secret("pw"), None)
        .unwrap();
    store.persist().await.unwrap();

    store.rekey(&mut session, EncryptionKey::generate()).unwrap();
    vault.keys().replace_key(store.key()).await.unwrap();
    store.persist().await.unwrap();
    drop(store);

    let mut reopened = vault.store().await;
    reopened.load().await.unwrap();
    assert_eq!(
        reopened.reveal_secret(&mut session, &id).unwrap().expose_secret(),
        "pw"
    );
    assert!(vault.path().join("vault.key.bak").exists());
}

#[tokio::test]
async fn test_password_change_keeps_entries_readable() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    let id = store
        .add_entry(&mut session, "svc", "user", &secret("pw"), None)
        .unwrap();
    store.persist().await.unwrap();

    let mut guard = vault.guard().await;
    guard.change_password(MASTER_PASSWORD, "Different2@").await.unwrap();

    let mut session = vault.session();
    assert!(matches!(
        session.unlock(&mut guard, MASTER_PASSWORD),
        Err(VaultError::Auth(AuthError::Mismatch))
    ));
    session.unlock(&mut guard, "Different2@").unwrap();

    let mut reopened = vault.store().await;
    reopened.load().await.unwrap();
    assert_eq!(
        reopened.reveal_secret(&mut session, &id).unwrap().expose_secret(),
        "pw"
    );
}

#[tokio::test]
async fn test_repeated_failures_back_off() {
    let vault = TestVault::new();
    drop(vault.initialized_session().await);

    let mut guard = vault.guard().await;
    let mut session = vault.session();
    for _ in 0..4 {
        assert!(matches!(
            session.unlock(&mut guard, "Correct1?"),
            Err(VaultError::Auth(AuthError::Mismatch))
        ));
    }

    assert!(matches!(
        session.unlock(&mut guard, MASTER_PASSWORD),
        Err(VaultError::Auth(AuthError::Backoff { .. }))
    ));
    assert_eq!(session.state(), SessionState::LockedInitial);

    vault.clock.advance(Duration::from_secs(1));
    session.unlock(&mut guard, MASTER_PASSWORD).unwrap();
}

#[tokio::test]
async fn test_export_to_other_vault_directory_needs_same_key() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    store
        .add_entry(&mut session, "svc", "user", &secret("pw"), None)
        .unwrap();
    let export_path = vault.path().join("export.json");
    store.export(&mut session, &export_path).await.unwrap();

    let other = TestVault::new();
    let mut other_session = other.initialized_session().await;
    let mut other_store = other.store().await;
    assert!(matches!(
        other_store
            .import(&mut other_session, &export_path, ImportMode::Merge)
            .await,
        Err(VaultError::Tampered)
    ));
    assert!(other_store.is_empty());
}

#[tokio::test]
async fn test_audit_trail_never_holds_secrets() {
    let vault = TestVault::new();
    let mut session = vault.initialized_session().await;
    let mut store = vault.store().await;
    let id = store
        .add_entry(&mut session, "svc", "user", &secret("hunter2"), Some("pin 0000"))
        .unwrap();
    store.reveal_secret(&mut session, &id).unwrap();
    store
        .update_entry(
            &mut session,
            &id,
            EntryUpdate {
                secret: Some(secret("hunter3")),
                ..EntryUpdate::default()
            },
        )
        .unwrap();

    let events: Vec<_> = session.audit_trail().events().cloned().collect();
    assert!(events.contains(&AuditEvent::EntryCreated {
        entry_id: id,
        service: "svc".into()
    }));

    let json = serde_json::to_string(&events).unwrap();
    assert!(!json.contains("hunter"));
    assert!(!json.contains("pin 0000"));
}
