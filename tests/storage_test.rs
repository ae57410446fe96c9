//! Contact store persistence integration tests

use tempfile::TempDir;
use wallet_reconciler::model::{
    ContactDirectory, ContactIdentity, MergedContact, PhoneContact, ProtocolContact,
};
use wallet_reconciler::storage::{ContactStore, LinkRecord};

fn link(phone: &str, address: &str) -> LinkRecord {
    LinkRecord {
        phone_contact_id: phone.into(),
        wallet_address: address.into(),
    }
}

#[test]
fn test_links_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = ContactStore::open(dir.path()).unwrap();
        store.put_link(&link("1", "A")).unwrap();
        store.put_link(&link("2", "B")).unwrap();
    }

    let store = ContactStore::open(dir.path()).unwrap();
    let mut links = store.links().unwrap();
    links.sort_by(|a, b| a.phone_contact_id.cmp(&b.phone_contact_id));
    assert_eq!(links, vec![link("1", "A"), link("2", "B")]);
}

#[test]
fn test_relinking_phone_moves_address() {
    let dir = TempDir::new().unwrap();
    let store = ContactStore::open(dir.path()).unwrap();
    store.put_link(&link("1", "A")).unwrap();
    store.put_link(&link("1", "B")).unwrap();
    assert_eq!(store.links().unwrap(), vec![link("1", "B")]);
}

#[test]
fn test_remove_link_reports_presence() {
    let store = ContactStore::open_in_memory().unwrap();
    store.put_link(&link("1", "A")).unwrap();
    assert!(store.remove_link("1").unwrap());
    assert!(!store.remove_link("1").unwrap());
    assert!(store.links().unwrap().is_empty());
}

#[test]
fn test_remove_links_for_address() {
    let store = ContactStore::open_in_memory().unwrap();
    store.put_link(&link("1", "A")).unwrap();
    store.put_link(&link("2", "B")).unwrap();
    assert_eq!(store.remove_links_for_address("A").unwrap(), 1);
    assert_eq!(store.remove_links_for_address("A").unwrap(), 0);
    assert_eq!(store.links().unwrap(), vec![link("2", "B")]);
}

#[test]
fn test_directory_snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let directory = ContactDirectory::new(vec![
        ContactIdentity::Merged(MergedContact::new(
            ProtocolContact::new("A").favorite(true),
            PhoneContact::new("1").with_alias("Alice"),
        )),
        ContactIdentity::Protocol(ProtocolContact::new("B").with_alias("Bob")),
        ContactIdentity::Phone(PhoneContact::new("2").with_alias("Carol")),
    ]);
    {
        let store = ContactStore::open(dir.path()).unwrap();
        assert!(store.load_directory().unwrap().is_none());
        store.save_directory(&directory).unwrap();
    }

    let store = ContactStore::open(dir.path()).unwrap();
    let restored = store.load_directory().unwrap().expect("snapshot saved");
    assert_eq!(restored.len(), 3);
    let alice = restored.find_by_address("A").expect("merged entry");
    assert_eq!(alice.kind(), "merged");
    assert_eq!(alice.alias(), Some("Alice"));
    assert!(alice.is_favorite());
    assert!(restored.find_by_phone_id("2").is_some());
}

#[test]
fn test_save_directory_overwrites_previous() {
    let store = ContactStore::open_in_memory().unwrap();
    store
        .save_directory(&ContactDirectory::new(vec![ContactIdentity::Protocol(
            ProtocolContact::new("A"),
        )]))
        .unwrap();
    store.save_directory(&ContactDirectory::default()).unwrap();
    assert!(store.load_directory().unwrap().unwrap().is_empty());
}
