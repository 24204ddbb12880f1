#![forbid(unsafe_code)]

//! Store capabilities consumed by the evaluators.
//!
//! The evaluators never persist anything. They read entries and consult the
//! secondary indices a store maintains, always through a read transaction
//! token so that one candidate's evaluation observes a single snapshot.

use std::sync::Arc;

use crate::entry::{Dn, Entry, Rdn};
use crate::schema::AttributeType;
use crate::types::{EntryId, Result};

/// LRU cache of alias flags.
pub mod alias_cache;
pub mod memory;

pub use alias_cache::AliasCache;
pub use memory::{MemStore, MemTxn};

/// Read access to a directory store and its indices.
pub trait Store: Send + Sync + 'static {
    /// Read transaction token threaded through every candidate evaluation.
    type Txn;

    /// Fetches an entry; `Ok(None)` when it no longer exists.
    fn fetch(&self, tx: &Self::Txn, id: EntryId) -> Result<Option<Arc<Entry>>>;

    /// Identifier of the context (suffix) entry.
    fn suffix_id(&self, tx: &Self::Txn) -> Result<EntryId>;

    /// Handle of the user index on `attr`, if one is maintained.
    fn index(&self, attr: &AttributeType) -> Option<IndexHandle>;

    /// Whether a user index exists on `attr`.
    fn has_index_on(&self, attr: &AttributeType) -> bool {
        self.index(attr).is_some()
    }

    /// Presence index, if the store maintains one.
    fn presence_index(&self) -> Option<&dyn PresenceIndex<Self::Txn>>;

    /// Alias index (alias entry -> target name).
    fn alias_index(&self) -> &dyn AliasIndex<Self::Txn>;

    /// Cache in front of the alias index.
    fn alias_cache(&self) -> Option<&AliasCache> {
        None
    }

    /// Version of the alias index visible through `tx`.
    ///
    /// Two transactions reporting the same generation see identical alias
    /// membership. Stores returning `None` bypass the alias cache.
    fn alias_generation(&self, _tx: &Self::Txn) -> Option<u64> {
        None
    }

    /// Index of entries reachable from a base only through an alias.
    fn sub_alias_index(&self) -> &dyn SubAliasIndex<Self::Txn>;

    /// Parent/RDN index.
    fn rdn_index(&self) -> &dyn RdnIndex<Self::Txn>;

    /// Rough number of stored entries, used for scan-cost estimates.
    fn estimated_entry_count(&self) -> Option<u64> {
        None
    }
}

/// Handle on a user attribute index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexHandle {
    attribute: String,
    estimated_count: u64,
}

impl IndexHandle {
    /// Creates a handle for the index on `attribute` (OID).
    pub fn new(attribute: impl Into<String>, estimated_count: u64) -> Self {
        Self {
            attribute: attribute.into(),
            estimated_count,
        }
    }

    /// OID of the indexed attribute type.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Rough number of entries carrying the attribute.
    pub fn estimated_count(&self) -> u64 {
        self.estimated_count
    }
}

/// Records which entries hold at least one value of an attribute type.
pub trait PresenceIndex<T> {
    /// Whether entry `id` holds a value under exactly `attr_oid`.
    fn contains(&self, tx: &T, attr_oid: &str, id: EntryId) -> Result<bool>;
}

/// Maps alias entries to the name they point at.
pub trait AliasIndex<T> {
    /// Alias target of `id`, `None` when `id` is not an alias.
    fn reverse_lookup(&self, tx: &T, id: EntryId) -> Result<Option<Dn>>;

    /// Whether `id` is an alias entry.
    fn is_alias(&self, tx: &T, id: EntryId) -> Result<bool> {
        Ok(self.reverse_lookup(tx, id)?.is_some())
    }
}

/// Entries brought into a base's subtree by an alias.
pub trait SubAliasIndex<T> {
    /// Whether `id` is reachable from `base` through an alias indirection.
    fn contains(&self, tx: &T, base: EntryId, id: EntryId) -> Result<bool>;
}

/// Parent pointer of a stored entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
    /// Parent identifier; [`EntryId::ROOT`] for the suffix entry.
    pub parent: EntryId,
    /// RDN of the child under that parent.
    pub rdn: Rdn,
}

/// Reverse parent lookup used for ancestry walks.
pub trait RdnIndex<T> {
    /// Parent link of `id`, `None` when `id` is unknown.
    fn reverse_lookup(&self, tx: &T, id: EntryId) -> Result<Option<ParentLink>>;
}
