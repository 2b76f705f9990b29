//! Multi-device sync flows over the in-process collaborators.
use std::sync::Arc;

use vaultly_core::cache::LocalVaultCache;
use vaultly_core::crypto::derive_vault_key;
use vaultly_core::ledger::{MemoryPointerLedger, ScriptedOutcome};
use vaultly_core::remote::MemoryRemoteStore;
use vaultly_core::{SessionPhase, SyncState, VaultError, VaultKey};

mod common;
use common::{init_tracing, record, Device, ALICE};

struct World {
    remote: Arc<MemoryRemoteStore>,
    ledger: Arc<MemoryPointerLedger>,
    dir: tempfile::TempDir,
}

impl World {
    fn new() -> Self {
        init_tracing();
        Self {
            remote: Arc::new(MemoryRemoteStore::new()),
            ledger: Arc::new(MemoryPointerLedger::new()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn device(&self, name: &str) -> Device {
        Device::new(&self.dir.path().join(name), &self.remote, &self.ledger)
    }
}

fn key() -> VaultKey {
    derive_vault_key("0x1234abcd", b"Vaultly AES key v1").unwrap()
}

#[tokio::test]
async fn test_second_device_sees_committed_vault() {
    let world = World::new();
    let laptop = world.device("laptop");
    let phone = world.device("phone");
    let key = key();

    let write = laptop
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    assert_eq!(laptop.engine.sync_state(ALICE), SyncState::Dirty);
    laptop.engine.commit_pointer(ALICE).await.unwrap();
    assert_eq!(world.ledger.pointer(ALICE).as_deref(), Some(write.cid.as_str()));

    assert_eq!(phone.engine.sync_state(ALICE), SyncState::Empty);
    let snapshot = phone.engine.refresh(&key, ALICE).await.unwrap();
    let acme = snapshot.get("acme.com").unwrap();
    assert_eq!(acme.username, "alice");
    assert_eq!(acme.password, "hunter2");
    assert_eq!(phone.engine.sync_state(ALICE), SyncState::Loaded);
    assert_eq!(phone.engine.current_cid(ALICE).unwrap(), Some(write.cid));
}

#[tokio::test]
async fn test_delete_unpins_previous_vault() {
    let world = World::new();
    let device = world.device("laptop");
    let key = key();

    device
        .engine
        .add_or_update(&key, ALICE, record("foo.com", "a", "1"))
        .await
        .unwrap();
    let before = device
        .engine
        .add_or_update(&key, ALICE, record("bar.com", "b", "2"))
        .await
        .unwrap();

    let after = device.engine.delete(&key, ALICE, "foo.com").await.unwrap();
    assert_ne!(after.cid, before.cid);
    assert!(after.snapshot.get("foo.com").is_none());
    assert!(after.snapshot.get("bar.com").is_some());
    assert!(world.remote.unpinned().contains(&before.cid));
    assert!(!world.remote.is_pinned(&before.cid));
    assert_eq!(world.remote.pin_count(), 1);
}

#[tokio::test]
async fn test_wrong_key_cannot_read_vault() {
    let world = World::new();
    let laptop = world.device("laptop");
    let phone = world.device("phone");

    laptop
        .engine
        .add_or_update(&key(), ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    laptop.engine.commit_pointer(ALICE).await.unwrap();

    let other = derive_vault_key("0xffff", b"Vaultly AES key v1").unwrap();
    assert!(matches!(
        phone.engine.refresh(&other, ALICE).await,
        Err(VaultError::AuthenticationFailure)
    ));
    assert_eq!(phone.engine.current_cid(ALICE).unwrap(), None);
}

#[tokio::test]
async fn test_rejected_commit_keeps_local_vault_usable() {
    let world = World::new();
    let device = world.device("laptop");
    let key = key();

    let write = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    world.ledger.signer().push(ScriptedOutcome::Reject);

    let err = device.engine.commit_pointer(ALICE).await.unwrap_err();
    assert!(matches!(err, VaultError::UserRejected));
    assert!(err.is_recoverable());
    assert_eq!(device.engine.sync_state(ALICE), SyncState::Dirty);
    assert_eq!(world.ledger.pointer(ALICE), None);

    let snapshot = device.engine.snapshot(&key, ALICE).unwrap();
    assert_eq!(snapshot, write.snapshot);

    device.engine.commit_pointer(ALICE).await.unwrap();
    assert_eq!(world.ledger.pointer(ALICE), Some(write.cid));
    assert_eq!(device.engine.sync_state(ALICE), SyncState::Loaded);
}

#[tokio::test]
async fn test_repeated_upsert_is_idempotent() {
    let world = World::new();
    let device = world.device("laptop");
    let key = key();

    let first = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    let second = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    assert_eq!(first.snapshot, second.snapshot);
    assert_eq!(second.snapshot.len(), 1);

    let updated = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "correct horse"))
        .await
        .unwrap();
    assert_eq!(updated.snapshot.len(), 1);
    assert_eq!(updated.snapshot.get("acme.com").unwrap().password, "correct horse");
}

#[tokio::test]
async fn test_failed_refresh_leaves_cache_untouched() {
    let world = World::new();
    let device = world.device("laptop");
    let key = key();

    let write = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    device.engine.commit_pointer(ALICE).await.unwrap();

    world
        .remote
        .insert_raw("corrupt-cid", b"{\"wallet\":\"x\",\"vault\":42}".to_vec())
        .unwrap();
    world.ledger.set_pointer(ALICE, "corrupt-cid");
    assert!(matches!(
        device.engine.refresh(&key, ALICE).await,
        Err(VaultError::Decode(_))
    ));
    assert_eq!(device.engine.current_cid(ALICE).unwrap(), Some(write.cid.clone()));

    world.ledger.set_pointer(ALICE, "missing-cid");
    assert!(matches!(
        device.engine.refresh(&key, ALICE).await,
        Err(VaultError::NotFound { .. })
    ));
    assert_eq!(device.engine.current_cid(ALICE).unwrap(), Some(write.cid));
    assert_eq!(device.engine.snapshot(&key, ALICE).unwrap(), write.snapshot);
}

#[tokio::test]
async fn test_refresh_after_rejected_commit_keeps_local_edit() {
    let world = World::new();
    let device = world.device("laptop");
    let key = key();

    let committed = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "p1"))
        .await
        .unwrap();
    device.engine.commit_pointer(ALICE).await.unwrap();

    // The previous pin stays fetchable, so a refresh could pull it back.
    world.remote.set_fail_unpins(true);
    let edited = device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "p2-new"))
        .await
        .unwrap();
    world.ledger.signer().push(ScriptedOutcome::Reject);
    assert!(matches!(
        device.engine.commit_pointer(ALICE).await,
        Err(VaultError::UserRejected)
    ));
    assert!(world.remote.is_pinned(&committed.cid));

    let snapshot = device.engine.refresh(&key, ALICE).await.unwrap();
    assert_eq!(snapshot.get("acme.com").unwrap().password, "p2-new");
    assert_eq!(device.engine.sync_state(ALICE), SyncState::Dirty);
    assert_eq!(device.engine.current_cid(ALICE).unwrap(), Some(edited.cid.clone()));

    // Still pending after a restart.
    let reopened = world.device("laptop");
    let snapshot = reopened.engine.refresh(&key, ALICE).await.unwrap();
    assert_eq!(snapshot.get("acme.com").unwrap().password, "p2-new");
    assert_eq!(reopened.engine.sync_state(ALICE), SyncState::Dirty);

    reopened.engine.commit_pointer(ALICE).await.unwrap();
    assert_eq!(world.ledger.pointer(ALICE), Some(edited.cid));
    assert_eq!(reopened.engine.sync_state(ALICE), SyncState::Loaded);
}

#[tokio::test]
async fn test_unreadable_pointer_keeps_cached_vault() {
    let world = World::new();
    let laptop = world.device("laptop");
    let phone = world.device("phone");
    let key = key();

    let mine = laptop
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    laptop.engine.commit_pointer(ALICE).await.unwrap();

    // Another device publishes a vault sealed under a different key.
    let other = derive_vault_key("0xffff", b"Vaultly AES key v1").unwrap();
    phone
        .engine
        .add_or_update(&other, ALICE, record("evil.com", "mallory", "x"))
        .await
        .unwrap();
    phone.engine.commit_pointer(ALICE).await.unwrap();
    assert_ne!(world.ledger.pointer(ALICE), Some(mine.cid.clone()));

    assert!(matches!(
        laptop.engine.refresh(&key, ALICE).await,
        Err(VaultError::AuthenticationFailure)
    ));
    assert_eq!(laptop.engine.current_cid(ALICE).unwrap(), Some(mine.cid));
    assert_eq!(laptop.engine.snapshot(&key, ALICE).unwrap(), mine.snapshot);
    assert_eq!(laptop.engine.sync_state(ALICE), SyncState::Loaded);
}

#[tokio::test]
async fn test_unreachable_ledger_still_serves_cached_vault() {
    let world = World::new();
    let device = world.device("laptop");
    let key = key();

    device
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    world.ledger.set_fail_reads(true);

    let err = device.engine.refresh(&key, ALICE).await.unwrap_err();
    assert!(matches!(err, VaultError::Network { .. }));
    assert!(err.is_recoverable());
    assert_eq!(device.engine.snapshot(&key, ALICE).unwrap().len(), 1);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let world = World::new();
    let key = key();
    let cid = {
        let device = world.device("laptop");
        device
            .engine
            .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
            .await
            .unwrap()
            .cid
    };

    let reopened = world.device("laptop");
    assert_eq!(reopened.engine.sync_state(ALICE), SyncState::Dirty);
    assert_eq!(reopened.engine.current_cid(ALICE).unwrap(), Some(cid));
    let snapshot = reopened.engine.snapshot(&key, ALICE).unwrap();
    assert_eq!(snapshot.get("acme.com").unwrap().password, "hunter2");
}

#[tokio::test]
async fn test_unlocked_session_drives_engine() {
    let world = World::new();
    let laptop = world.device("laptop");

    laptop
        .session
        .unlock_with(ALICE, world.ledger.signer())
        .await
        .unwrap();
    assert_eq!(laptop.session.phase(), SessionPhase::Unlocked);
    let key = laptop.session.key().unwrap();

    laptop
        .engine
        .add_or_update(&key, ALICE, record("acme.com", "alice", "hunter2"))
        .await
        .unwrap();
    laptop.engine.commit_pointer(ALICE).await.unwrap();

    // The same wallet signs the same unlock message on another device.
    let phone = world.device("phone");
    phone
        .session
        .unlock_with(ALICE, world.ledger.signer())
        .await
        .unwrap();
    let snapshot = phone
        .engine
        .refresh(&phone.session.key().unwrap(), ALICE)
        .await
        .unwrap();
    assert_eq!(snapshot.get("acme.com").unwrap().username, "alice");

    laptop.session.logout().await.unwrap();
    assert!(matches!(laptop.session.key(), Err(VaultError::Locked)));
    assert!(!laptop.session.restore().await.unwrap());
    assert!(laptop.cache.get_cid(ALICE).unwrap().is_some());
}

#[tokio::test]
async fn test_rejected_unlock_leaves_session_locked() {
    let world = World::new();
    let device = world.device("laptop");
    world.ledger.signer().push(ScriptedOutcome::Reject);

    assert!(matches!(
        device.session.unlock_with(ALICE, world.ledger.signer()).await,
        Err(VaultError::UserRejected)
    ));
    assert_eq!(device.session.phase(), SessionPhase::Locked);

    device
        .session
        .unlock_with(ALICE, world.ledger.signer())
        .await
        .unwrap();
    assert_eq!(device.session.phase(), SessionPhase::Unlocked);
}
