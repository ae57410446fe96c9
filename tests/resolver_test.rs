//! Contact resolver integration tests
//!
//! Covers:
//! - The protocol feed (transaction counterparties before engine contacts)
//! - Per-source failure isolation
//! - Permission-gated phone book reads
//! - Link / unlink, favorites, renames and delete cascade
//! - Directory persistence through the contact store

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use wallet_reconciler::contacts::{ContactResolver, RefreshOutcome, ResolveError};
use wallet_reconciler::engine::{EngineContact, MemoryEngine, WalletEngine};
use wallet_reconciler::model::{
    ContactIdentity, ContactKey, Direction, PhoneContact, ProtocolContact, Tx, TxStatus,
};
use wallet_reconciler::phonebook::{
    ContactPermission, MemoryPhoneBook, PhoneBookEntry, PhoneBookProvider,
};
use wallet_reconciler::storage::ContactStore;

struct Harness {
    engine: Arc<MemoryEngine>,
    phone_book: Arc<MemoryPhoneBook>,
    store: Arc<ContactStore>,
    permission: ContactPermission,
    resolver: ContactResolver,
}

fn harness(granted: bool) -> Harness {
    let engine = Arc::new(MemoryEngine::new(16));
    let phone_book = Arc::new(MemoryPhoneBook::default());
    let store = Arc::new(ContactStore::open_in_memory().unwrap());
    let permission = ContactPermission::new(granted);
    let resolver = ContactResolver::new(
        Arc::clone(&engine) as Arc<dyn WalletEngine>,
        Arc::clone(&phone_book) as Arc<dyn PhoneBookProvider>,
        permission.clone(),
        Arc::clone(&store),
        false,
    );
    Harness {
        engine,
        phone_book,
        store,
        permission,
        resolver,
    }
}

fn contact(address: &str, alias: &str, is_favorite: bool) -> EngineContact {
    EngineContact {
        address: address.into(),
        alias: alias.into(),
        is_favorite,
    }
}

fn mined_with(id: u64, address: &str, ts: u64) -> Tx {
    Tx::new(id, Direction::Inbound, TxStatus::Mined, ts).with_counterparty(address)
}

async fn refresh(resolver: &ContactResolver) -> RefreshOutcome {
    resolver.refresh(&AtomicBool::new(false)).await
}

fn addresses(resolver: &ContactResolver) -> Vec<String> {
    resolver
        .snapshot()
        .entries
        .iter()
        .filter_map(|e| e.wallet_address().map(str::to_string))
        .collect()
}

// =============================================================================
// Protocol feed
// =============================================================================

#[tokio::test]
async fn test_transaction_contacts_come_first_with_latest_timestamp() {
    let h = harness(false);
    h.engine.add_contact(contact("E", "Engine only", false));
    h.engine.add_contact(contact("A", "Alice", true));
    h.engine.record(mined_with(1, "A", 100));
    h.engine.record(mined_with(2, "A", 300));
    h.engine.record(mined_with(3, "B", 200));

    assert_eq!(refresh(&h.resolver).await, RefreshOutcome::Committed);
    assert_eq!(addresses(&h.resolver), vec!["A", "B", "E"]);

    let a = h.resolver.contact_by_address("A").unwrap();
    let ContactIdentity::Protocol(a) = a else {
        panic!("expected protocol contact");
    };
    assert_eq!(a.alias.as_deref(), Some("Alice"));
    assert!(a.is_favorite);
    assert_eq!(a.last_used_timestamp, Some(300));

    let e = h.resolver.contact_by_address("E").unwrap();
    assert_eq!(e.protocol_half().unwrap().last_used_timestamp, None);
}

#[tokio::test]
async fn test_coinbase_and_blank_counterparties_are_skipped() {
    let h = harness(false);
    let mut coinbase = mined_with(1, "MINER", 100);
    coinbase.is_coinbase = true;
    h.engine.record(coinbase);
    h.engine.record(mined_with(2, "  ", 100));
    h.engine.record(mined_with(3, "B", 100));

    refresh(&h.resolver).await;
    assert_eq!(addresses(&h.resolver), vec!["B"]);
}

#[tokio::test]
async fn test_engine_contact_failure_keeps_transaction_contacts() {
    let h = harness(false);
    h.engine.add_contact(contact("E", "Engine only", false));
    h.engine.record(mined_with(1, "A", 100));
    h.engine.fail("contacts", 3);

    assert_eq!(refresh(&h.resolver).await, RefreshOutcome::Committed);
    assert_eq!(addresses(&h.resolver), vec!["A"]);
}

#[tokio::test]
async fn test_phone_failure_does_not_block_protocol_fold() {
    let h = harness(true);
    h.phone_book.upsert(PhoneBookEntry::new("1", "Alice"));
    h.phone_book.set_failing(true);
    h.engine.add_contact(contact("A", "", false));

    refresh(&h.resolver).await;
    let dir = h.resolver.snapshot();
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.entries[0].wallet_address(), Some("A"));
}

#[tokio::test]
async fn test_second_identical_pass_is_unchanged() {
    let h = harness(true);
    h.engine.add_contact(contact("A", "", false));
    h.phone_book.upsert(PhoneBookEntry::new("1", "Alice"));

    assert_eq!(refresh(&h.resolver).await, RefreshOutcome::Committed);
    assert_eq!(refresh(&h.resolver).await, RefreshOutcome::Unchanged);
}

#[tokio::test]
async fn test_torn_down_pass_is_discarded() {
    let h = harness(false);
    h.engine.add_contact(contact("A", "", false));

    let outcome = h.resolver.refresh(&AtomicBool::new(true)).await;
    assert_eq!(outcome, RefreshOutcome::Discarded);
    assert!(h.resolver.snapshot().is_empty());
}

// =============================================================================
// Phone book
// =============================================================================

#[tokio::test]
async fn test_phone_book_needs_permission() {
    let h = harness(false);
    h.phone_book.upsert(PhoneBookEntry::new("1", "Alice"));

    refresh(&h.resolver).await;
    assert!(h.resolver.snapshot().is_empty());
    assert_eq!(h.phone_book.snapshot_count(), 0);

    assert!(h.permission.grant());
    refresh(&h.resolver).await;
    let dir = h.resolver.snapshot();
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.entries[0].alias(), Some("Alice"));
}

#[tokio::test]
async fn test_custom_field_link_waits_for_protocol_contact() {
    let h = harness(true);
    h.phone_book
        .upsert(PhoneBookEntry::new("1", "Alice").with_wallet_address("A"));

    refresh(&h.resolver).await;
    let dir = h.resolver.snapshot();
    assert_eq!(dir.entries[0].kind(), "phone");
    assert_eq!(dir.entries[0].wallet_address(), None);

    h.engine.add_contact(contact("A", "", false));
    refresh(&h.resolver).await;
    let dir = h.resolver.snapshot();
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.entries[0].kind(), "merged");
}

// =============================================================================
// Link / unlink
// =============================================================================

async fn linked_pair(h: &Harness) -> (ContactIdentity, ContactIdentity) {
    h.engine.add_contact(contact("A", "", false));
    h.phone_book
        .upsert(PhoneBookEntry::new("1", "Alice").starred(true));
    refresh(&h.resolver).await;
    let dir = h.resolver.snapshot();
    let protocol = dir.find_by_address("A").unwrap().clone();
    let phone = dir.find_by_phone_id("1").unwrap().clone();
    (protocol, phone)
}

#[tokio::test]
async fn test_link_ors_favorites() {
    let h = harness(true);
    linked_pair(&h).await;

    let merged = h.resolver.link_contacts("A", "1").await.unwrap();
    assert!(merged.is_favorite());
    assert_eq!(merged.alias(), Some("Alice"));
    assert_eq!(h.resolver.snapshot().len(), 1);
    assert_eq!(h.store.links().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unlink_restores_original_entries() {
    let h = harness(true);
    let (protocol, phone) = linked_pair(&h).await;

    h.resolver.link_contacts("A", "1").await.unwrap();
    let (p, ph) = h.resolver.unlink_contact("A").await.unwrap();
    assert_eq!(p, protocol);
    assert_eq!(ph, phone);

    let dir = h.resolver.snapshot();
    assert_eq!(dir.len(), 2);
    assert!(dir.entries.contains(&protocol));
    assert!(dir.entries.contains(&phone));
    assert!(h.store.links().unwrap().is_empty());

    // The next pass must not merge them again.
    refresh(&h.resolver).await;
    assert_eq!(h.resolver.snapshot().len(), 2);
}

#[tokio::test]
async fn test_link_survives_refresh_and_restart() {
    let h = harness(true);
    linked_pair(&h).await;
    h.resolver.link_contacts("A", "1").await.unwrap();

    refresh(&h.resolver).await;
    assert_eq!(h.resolver.snapshot().entries[0].kind(), "merged");

    let fresh = ContactResolver::new(
        Arc::clone(&h.engine) as Arc<dyn WalletEngine>,
        Arc::clone(&h.phone_book) as Arc<dyn PhoneBookProvider>,
        h.permission.clone(),
        Arc::clone(&h.store),
        false,
    );
    refresh(&fresh).await;
    let dir = fresh.snapshot();
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.entries[0].kind(), "merged");
}

#[tokio::test]
async fn test_link_contract_violations() {
    let h = harness(true);
    linked_pair(&h).await;

    assert_eq!(
        h.resolver.link_contacts("Z", "1").await,
        Err(ResolveError::NotFound(ContactKey::Address("Z".into())))
    );
    assert_eq!(
        h.resolver.link_contacts("A", "9").await,
        Err(ResolveError::NotFound(ContactKey::PhoneId("9".into())))
    );
    assert_eq!(
        h.resolver.link_contacts(" ", "1").await,
        Err(ResolveError::NotLinkable(ContactKey::Address(" ".into())))
    );
    assert_eq!(
        h.resolver.unlink_contact("A").await,
        Err(ResolveError::NotMerged(ContactKey::Address("A".into())))
    );

    h.resolver.link_contacts("A", "1").await.unwrap();
    assert_eq!(
        h.resolver.link_contacts("A", "1").await,
        Err(ResolveError::AlreadyLinked(ContactKey::Address("A".into())))
    );
    assert_eq!(h.resolver.snapshot().len(), 1);
}

// =============================================================================
// Favorites, renames, delete
// =============================================================================

#[tokio::test]
async fn test_toggle_favorite_on_merged_flips_both_halves() {
    let h = harness(true);
    linked_pair(&h).await;
    let merged = h.resolver.link_contacts("A", "1").await.unwrap();
    assert!(merged.is_favorite());

    let toggled = h.resolver.toggle_favorite(&merged.key()).await.unwrap();
    let ContactIdentity::Merged(m) = &toggled else {
        panic!("expected merged contact");
    };
    assert!(!m.protocol.is_favorite);
    assert!(!m.phone.is_favorite);
    assert!(m.phone.dirty);
    assert!(!h.engine.contact("A").unwrap().is_favorite);

    // Next pass writes the phone half back and clears the flag.
    refresh(&h.resolver).await;
    assert!(!h.phone_book.get("1").unwrap().starred);
    let dir = h.resolver.snapshot();
    assert!(!dir.entries[0].phone_half().unwrap().dirty);
    assert!(!dir.entries[0].is_favorite());
}

#[tokio::test]
async fn test_rename_merged_marks_phone_dirty_and_pushes_alias() {
    let h = harness(true);
    linked_pair(&h).await;
    let merged = h.resolver.link_contacts("A", "1").await.unwrap();

    let renamed = h
        .resolver
        .update_contact_info(&merged, "  Alice Cooper ")
        .await
        .unwrap();
    let ContactIdentity::Merged(m) = &renamed else {
        panic!("expected merged contact");
    };
    assert_eq!(m.protocol.alias.as_deref(), Some("Alice Cooper"));
    assert_eq!(m.phone.alias.as_deref(), Some("Alice Cooper"));
    assert!(m.phone.dirty);
    assert_eq!(h.engine.contact("A").unwrap().alias, "Alice Cooper");

    refresh(&h.resolver).await;
    assert_eq!(h.phone_book.get("1").unwrap().display_name, "Alice Cooper");
    assert!(!h.resolver.snapshot().entries[0].phone_half().unwrap().dirty);
}

#[tokio::test]
async fn test_rename_to_address_sends_empty_alias() {
    let h = harness(false);
    h.engine.add_contact(contact("A", "Old", false));
    refresh(&h.resolver).await;
    let entry = h.resolver.contact_by_address("A").unwrap();

    h.resolver.update_contact_info(&entry, "A").await.unwrap();
    assert_eq!(h.engine.contact("A").unwrap().alias, "");
}

#[tokio::test]
async fn test_rename_transient_contact_inserts_it() {
    let h = harness(false);
    let tx = mined_with(1, "NEW", 10);
    let transient = h.resolver.contact_for_transaction(&tx);
    assert_eq!(transient, ContactIdentity::Protocol(ProtocolContact::new("NEW")));
    assert!(h.resolver.snapshot().is_empty());

    h.resolver
        .update_contact_info(&transient, "Newcomer")
        .await
        .unwrap();
    let entry = h.resolver.contact_by_address("NEW").unwrap();
    assert_eq!(entry.alias(), Some("Newcomer"));
    assert_eq!(h.engine.contact("NEW").unwrap().alias, "Newcomer");
}

#[tokio::test]
async fn test_rename_phone_only_contact() {
    let h = harness(true);
    h.phone_book.upsert(PhoneBookEntry::new("1", "Bob"));
    refresh(&h.resolver).await;
    let phone = h.resolver.snapshot().entries[0].clone();

    let renamed = h.resolver.update_contact_info(&phone, "Robert").await.unwrap();
    assert_eq!(
        renamed,
        ContactIdentity::Phone(PhoneContact {
            alias: Some("Robert".into()),
            dirty: true,
            ..PhoneContact::new("1")
        })
    );
}

#[tokio::test]
async fn test_delete_merged_cascades_to_both_sources() {
    let h = harness(true);
    linked_pair(&h).await;
    let merged = h.resolver.link_contacts("A", "1").await.unwrap();

    let removed = h.resolver.delete_contact(&merged.key()).await.unwrap();
    assert_eq!(removed.kind(), "merged");
    assert!(h.resolver.snapshot().is_empty());
    assert!(h.engine.contact("A").is_none());
    assert!(h.phone_book.get("1").is_none());
    assert!(h.store.links().unwrap().is_empty());

    refresh(&h.resolver).await;
    assert!(h.resolver.snapshot().is_empty());
}

#[tokio::test]
async fn test_delete_unknown_contact_fails() {
    let h = harness(false);
    let key = ContactKey::Address("nobody".into());
    assert_eq!(
        h.resolver.delete_contact(&key).await,
        Err(ResolveError::NotFound(key))
    );
}

// =============================================================================
// Rejected edits
// =============================================================================

#[tokio::test]
async fn test_favorite_rejected_by_engine_changes_nothing() {
    let h = harness(false);
    h.engine.add_contact(contact("A", "Alice", false));
    refresh(&h.resolver).await;
    let before = h.resolver.snapshot();

    h.engine.fail("update_contact", 7);
    let key = ContactKey::Address("A".into());
    assert!(matches!(
        h.resolver.toggle_favorite(&key).await,
        Err(ResolveError::Engine(_))
    ));
    assert_eq!(*h.resolver.snapshot(), *before);
    assert!(!h.engine.contact("A").unwrap().is_favorite);

    h.engine.heal("update_contact");
    let toggled = h.resolver.toggle_favorite(&key).await.unwrap();
    assert!(toggled.is_favorite());
    refresh(&h.resolver).await;
    assert!(h.resolver.contact_by_address("A").unwrap().is_favorite());
}

#[tokio::test]
async fn test_rename_rejected_by_engine_changes_nothing() {
    let h = harness(false);
    h.engine.add_contact(contact("A", "Alice", false));
    refresh(&h.resolver).await;
    let entry = h.resolver.contact_by_address("A").unwrap();
    let before = h.resolver.snapshot();

    h.engine.fail("update_contact", 7);
    assert!(matches!(
        h.resolver.update_contact_info(&entry, "Alicia").await,
        Err(ResolveError::Engine(_))
    ));
    assert_eq!(*h.resolver.snapshot(), *before);
    assert_eq!(h.engine.contact("A").unwrap().alias, "Alice");

    h.engine.heal_all();
    refresh(&h.resolver).await;
    assert_eq!(h.resolver.contact_by_address("A").unwrap().alias(), Some("Alice"));
}

#[tokio::test]
async fn test_delete_without_permission_keeps_phone_contact() {
    let h = harness(true);
    h.phone_book.upsert(PhoneBookEntry::new("1", "Bob"));
    refresh(&h.resolver).await;
    let key = ContactKey::PhoneId("1".into());

    h.permission.revoke();
    assert!(matches!(
        h.resolver.delete_contact(&key).await,
        Err(ResolveError::PhoneBook(_))
    ));
    assert_eq!(h.resolver.snapshot().len(), 1);
    assert!(h.phone_book.get("1").is_some());

    h.permission.grant();
    h.resolver.delete_contact(&key).await.unwrap();
    refresh(&h.resolver).await;
    assert!(h.resolver.snapshot().is_empty());
    assert!(h.phone_book.get("1").is_none());
}

#[tokio::test]
async fn test_delete_phone_failure_restores_engine_contact() {
    let h = harness(true);
    linked_pair(&h).await;
    let merged = h.resolver.link_contacts("A", "1").await.unwrap();
    let before = h.resolver.snapshot();

    h.phone_book.set_failing(true);
    assert!(matches!(
        h.resolver.delete_contact(&merged.key()).await,
        Err(ResolveError::PhoneBook(_))
    ));
    assert_eq!(*h.resolver.snapshot(), *before);
    assert!(h.engine.contact("A").is_some());
    assert!(h.phone_book.get("1").is_some());
    assert_eq!(h.store.links().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_engine_failure_leaves_every_source() {
    let h = harness(true);
    linked_pair(&h).await;
    let merged = h.resolver.link_contacts("A", "1").await.unwrap();
    let before = h.resolver.snapshot();

    h.engine.fail("remove_contact", 9);
    assert!(matches!(
        h.resolver.delete_contact(&merged.key()).await,
        Err(ResolveError::Engine(_))
    ));
    assert_eq!(*h.resolver.snapshot(), *before);
    assert!(h.engine.contact("A").is_some());
    assert!(h.phone_book.get("1").is_some());
    assert_eq!(h.store.links().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_transaction_contact_absent_from_engine() {
    let h = harness(false);
    h.engine.record(mined_with(1, "T", 10));
    refresh(&h.resolver).await;
    assert!(h.engine.contact("T").is_none());

    let key = ContactKey::Address("T".into());
    let removed = h.resolver.delete_contact(&key).await.unwrap();
    assert_eq!(removed.wallet_address(), Some("T"));
    assert!(h.resolver.contact_by_address("T").is_none());
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_directory_restored_on_construction() {
    let h = harness(false);
    let persisting = ContactResolver::new(
        Arc::clone(&h.engine) as Arc<dyn WalletEngine>,
        Arc::clone(&h.phone_book) as Arc<dyn PhoneBookProvider>,
        h.permission.clone(),
        Arc::clone(&h.store),
        true,
    );
    h.engine.add_contact(contact("A", "Alice", false));
    refresh(&persisting).await;

    let restored = ContactResolver::new(
        Arc::clone(&h.engine) as Arc<dyn WalletEngine>,
        Arc::clone(&h.phone_book) as Arc<dyn PhoneBookProvider>,
        h.permission.clone(),
        Arc::clone(&h.store),
        true,
    );
    assert_eq!(restored.snapshot().len(), 1);
    assert_eq!(
        restored.contact_by_address("A").and_then(|c| c.alias().map(str::to_string)),
        Some("Alice".to_string())
    );
}
