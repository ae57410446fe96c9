//! Contact identities and the directory that holds them
//!
//! A counterparty can be known through three sources: the wallet engine's
//! own contact list (or its transaction history), the device phone book,
//! and a user-created link between the two. [`ContactIdentity`] is the closed
//! union of those shapes; [`ContactDirectory`] is the resolved list.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A contact known to the wallet engine, keyed by wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolContact {
    pub wallet_address: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    /// Timestamp (seconds) of the most recent transaction with this address.
    #[serde(default)]
    pub last_used_timestamp: Option<u64>,
}

impl ProtocolContact {
    pub fn new(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            alias: None,
            is_favorite: false,
            last_used_timestamp: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

/// A contact from the device phone book, keyed by its device-local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneContact {
    pub contact_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub avatar_uri: Option<String>,
    /// Wallet address this contact is waiting to be merged with.
    #[serde(default)]
    pub linked_emoji_address: Option<String>,
    /// Local edits not yet written back to the phone book.
    #[serde(default)]
    pub dirty: bool,
}

impl PhoneContact {
    pub fn new(contact_id: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            alias: None,
            is_favorite: false,
            avatar_uri: None,
            linked_emoji_address: None,
            dirty: false,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// The address of a link that is recorded but not yet resolved.
    pub fn pending_link(&self) -> Option<&str> {
        self.linked_emoji_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// One protocol contact and one phone contact explicitly linked together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedContact {
    pub protocol: ProtocolContact,
    pub phone: PhoneContact,
}

impl MergedContact {
    pub fn new(protocol: ProtocolContact, mut phone: PhoneContact) -> Self {
        phone.linked_emoji_address = Some(protocol.wallet_address.clone());
        Self { protocol, phone }
    }

    pub fn is_favorite(&self) -> bool {
        self.protocol.is_favorite || self.phone.is_favorite
    }

    /// The phone book name wins; fall back to the protocol alias.
    pub fn alias(&self) -> Option<&str> {
        non_blank(self.phone.alias.as_deref()).or_else(|| non_blank(self.protocol.alias.as_deref()))
    }
}

/// Identity key of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactKey {
    Address(String),
    PhoneId(String),
}

impl fmt::Display for ContactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactKey::Address(a) => write!(f, "address:{a}"),
            ContactKey::PhoneId(id) => write!(f, "phone:{id}"),
        }
    }
}

/// Something the presentation layer can offer for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactAction {
    Send,
    Link,
    Unlink,
    OpenProfile,
    EditName,
    Favorite,
    Unfavorite,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactIdentity {
    Protocol(ProtocolContact),
    Phone(PhoneContact),
    Merged(MergedContact),
}

impl ContactIdentity {
    pub fn key(&self) -> ContactKey {
        match self {
            ContactIdentity::Protocol(p) => ContactKey::Address(p.wallet_address.clone()),
            ContactIdentity::Merged(m) => ContactKey::Address(m.protocol.wallet_address.clone()),
            ContactIdentity::Phone(p) => ContactKey::PhoneId(p.contact_id.clone()),
        }
    }

    /// Absent only for phone contacts, which are keyed by their device id.
    pub fn wallet_address(&self) -> Option<&str> {
        match self {
            ContactIdentity::Protocol(p) => Some(&p.wallet_address),
            ContactIdentity::Merged(m) => Some(&m.protocol.wallet_address),
            ContactIdentity::Phone(_) => None,
        }
    }

    pub fn phone_contact_id(&self) -> Option<&str> {
        match self {
            ContactIdentity::Phone(p) => Some(&p.contact_id),
            ContactIdentity::Merged(m) => Some(&m.phone.contact_id),
            ContactIdentity::Protocol(_) => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            ContactIdentity::Protocol(p) => non_blank(p.alias.as_deref()),
            ContactIdentity::Phone(p) => non_blank(p.alias.as_deref()),
            ContactIdentity::Merged(m) => m.alias(),
        }
    }

    pub fn is_favorite(&self) -> bool {
        match self {
            ContactIdentity::Protocol(p) => p.is_favorite,
            ContactIdentity::Phone(p) => p.is_favorite,
            ContactIdentity::Merged(m) => m.is_favorite(),
        }
    }

    pub fn protocol_half(&self) -> Option<&ProtocolContact> {
        match self {
            ContactIdentity::Protocol(p) => Some(p),
            ContactIdentity::Merged(m) => Some(&m.protocol),
            ContactIdentity::Phone(_) => None,
        }
    }

    pub fn phone_half(&self) -> Option<&PhoneContact> {
        match self {
            ContactIdentity::Phone(p) => Some(p),
            ContactIdentity::Merged(m) => Some(&m.phone),
            ContactIdentity::Protocol(_) => None,
        }
    }

    pub fn phone_half_mut(&mut self) -> Option<&mut PhoneContact> {
        match self {
            ContactIdentity::Phone(p) => Some(p),
            ContactIdentity::Merged(m) => Some(&mut m.phone),
            ContactIdentity::Protocol(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContactIdentity::Protocol(_) => "protocol",
            ContactIdentity::Phone(_) => "phone",
            ContactIdentity::Merged(_) => "merged",
        }
    }

    /// Case-insensitive match on alias or wallet address.
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.to_lowercase();
        let alias_hit = |alias: Option<&str>| {
            alias.is_some_and(|a| a.to_lowercase().contains(&needle))
        };
        let address_hit = self
            .wallet_address()
            .is_some_and(|a| a.to_lowercase().contains(&needle));
        match self {
            ContactIdentity::Merged(m) => {
                address_hit
                    || alias_hit(m.phone.alias.as_deref())
                    || alias_hit(m.protocol.alias.as_deref())
            }
            other => address_hit || alias_hit(other.alias()),
        }
    }

    pub fn available_actions(&self) -> Vec<ContactAction> {
        let mut actions = Vec::with_capacity(6);
        match self {
            ContactIdentity::Protocol(_) => {
                actions.push(ContactAction::Send);
                actions.push(ContactAction::Link);
            }
            ContactIdentity::Merged(_) => {
                actions.push(ContactAction::Send);
                actions.push(ContactAction::Unlink);
            }
            ContactIdentity::Phone(_) => {}
        }
        actions.push(ContactAction::OpenProfile);
        actions.push(ContactAction::EditName);
        actions.push(if self.is_favorite() {
            ContactAction::Unfavorite
        } else {
            ContactAction::Favorite
        });
        actions.push(ContactAction::Delete);
        actions
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// The resolved, authoritative contact list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDirectory {
    pub entries: Vec<ContactIdentity>,
}

impl ContactDirectory {
    pub fn new(entries: Vec<ContactIdentity>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ContactKey) -> Option<&ContactIdentity> {
        self.position(key).map(|i| &self.entries[i])
    }

    pub fn position(&self, key: &ContactKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key() == key)
    }

    /// Finds the protocol or merged entry for an address.
    pub fn find_by_address(&self, address: &str) -> Option<&ContactIdentity> {
        self.entries
            .iter()
            .find(|e| e.wallet_address() == Some(address))
    }

    /// Finds the phone or merged entry for a phone-book id.
    pub fn find_by_phone_id(&self, contact_id: &str) -> Option<&ContactIdentity> {
        self.entries
            .iter()
            .find(|e| e.phone_contact_id() == Some(contact_id))
    }

    pub fn filtered(&self, text: &str) -> Vec<&ContactIdentity> {
        self.entries.iter().filter(|e| e.matches(text)).collect()
    }

    /// Entries worth showing, optionally without phone contacts that have no name.
    pub fn visible(&self, hide_unnamed: bool) -> Vec<&ContactIdentity> {
        self.entries
            .iter()
            .filter(|e| match e {
                ContactIdentity::Phone(p) if hide_unnamed => non_blank(p.alias.as_deref()).is_some(),
                _ => true,
            })
            .collect()
    }

    pub fn favorites(&self) -> Vec<&ContactIdentity> {
        self.entries.iter().filter(|e| e.is_favorite()).collect()
    }

    /// Folds entries sharing a wallet address or a phone id, keeping the first.
    pub fn dedupe(mut self) -> Self {
        let mut seen: HashSet<ContactKey> = HashSet::new();
        let mut seen_phone: HashSet<String> = HashSet::new();
        self.entries.retain(|e| {
            if !seen.insert(e.key()) {
                return false;
            }
            match e.phone_contact_id() {
                Some(id) => seen_phone.insert(id.to_string()),
                None => true,
            }
        });
        self
    }
}
