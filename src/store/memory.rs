//! In-memory reference store.
//!
//! Writers clone the shared state on demand and publish a new snapshot; a
//! [`MemTxn`] pins whichever snapshot was current when it began, so every
//! read through it is consistent even while writers keep going.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use super::{
    AliasCache, AliasIndex, IndexHandle, ParentLink, PresenceIndex, RdnIndex, Store,
    SubAliasIndex,
};
use crate::entry::{AttrValue, Dn, Entry};
use crate::schema::{oids, AttributeType};
use crate::types::{DirError, EntryId, Result};

const ALIAS_CLASS: &str = "alias";

#[derive(Clone, Default)]
struct MemState {
    entries: FxHashMap<EntryId, Arc<Entry>>,
    parents: FxHashMap<EntryId, ParentLink>,
    children: FxHashMap<EntryId, usize>,
    by_dn: FxHashMap<String, EntryId>,
    suffix: Option<EntryId>,
    presence: FxHashMap<String, FxHashSet<EntryId>>,
    aliases: FxHashMap<EntryId, Dn>,
    // bumped whenever `aliases` changes
    alias_generation: u64,
    sub_aliases: FxHashSet<(EntryId, EntryId)>,
}

/// Read transaction over one [`MemStore`] snapshot.
#[derive(Clone)]
pub struct MemTxn {
    snapshot: Arc<MemState>,
}

impl MemTxn {
    /// Number of entries visible in this snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.entries.len()
    }

    /// Returns true when the snapshot holds no entry.
    pub fn is_empty(&self) -> bool {
        self.snapshot.entries.is_empty()
    }

    /// Identifiers visible in this snapshot, ascending.
    pub fn ids(&self) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self.snapshot.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Alias generation of this snapshot.
    pub fn alias_generation(&self) -> u64 {
        self.snapshot.alias_generation
    }
}

impl std::fmt::Debug for MemTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTxn")
            .field("entries", &self.snapshot.entries.len())
            .finish()
    }
}

/// Snapshot-isolated directory store kept entirely in memory.
pub struct MemStore {
    state: RwLock<Arc<MemState>>,
    indexed: RwLock<FxHashSet<String>>,
    presence_enabled: bool,
    alias_cache: Option<AliasCache>,
    next_id: AtomicU64,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Store with a presence index and a default-sized alias cache.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(MemState::default())),
            indexed: RwLock::new(FxHashSet::default()),
            presence_enabled: true,
            alias_cache: Some(AliasCache::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Disables the presence index so presence checks read entries.
    pub fn without_presence_index(mut self) -> Self {
        self.presence_enabled = false;
        self
    }

    /// Replaces the alias cache; `None` sends every lookup to the alias index.
    pub fn with_alias_cache(mut self, cache: Option<AliasCache>) -> Self {
        self.alias_cache = cache;
        self
    }

    /// Starts a read transaction on the current snapshot.
    pub fn begin_read(&self) -> MemTxn {
        MemTxn {
            snapshot: Arc::clone(&self.state.read()),
        }
    }

    /// Declares a user index on `attr`.
    pub fn create_index(&self, attr: &AttributeType) {
        self.indexed.write().insert(attr.oid().to_owned());
        debug!(attribute = attr.display_name(), "declared attribute index");
    }

    /// Adds `entry` and returns its identifier.
    ///
    /// The first entry becomes the suffix. Every later entry needs its parent
    /// to be stored already.
    pub fn add(&self, entry: Entry) -> Result<EntryId> {
        let alias = alias_target(&entry)?;
        let mut guard = self.state.write();
        let state = Arc::make_mut(&mut guard);
        let key = entry.dn().normalized();
        if state.by_dn.contains_key(&key) {
            return Err(DirError::Store(format!("entry '{}' already exists", entry.dn())));
        }
        let rdn = entry
            .dn()
            .rdn()
            .cloned()
            .ok_or_else(|| DirError::Store("cannot store the root DSE".into()))?;
        let parent = match state.suffix {
            None => EntryId::ROOT,
            Some(_) => {
                let parent_dn = entry.dn().parent().unwrap_or_default();
                *state.by_dn.get(&parent_dn.normalized()).ok_or_else(|| {
                    DirError::Store(format!("parent of '{}' does not exist", entry.dn()))
                })?
            }
        };

        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if state.suffix.is_none() {
            state.suffix = Some(id);
        } else {
            *state.children.entry(parent).or_default() += 1;
        }
        for attr in entry.attributes() {
            state
                .presence
                .entry(attr.oid().to_owned())
                .or_default()
                .insert(id);
        }
        if let Some(target) = alias {
            state.aliases.insert(id, target);
            state.alias_generation += 1;
        }
        state.by_dn.insert(key, id);
        state.parents.insert(id, ParentLink { parent, rdn });
        debug!(id = %id, dn = %entry.dn(), "stored entry");
        state.entries.insert(id, Arc::new(entry));
        drop(guard);

        self.invalidate_alias(id);
        Ok(id)
    }

    /// Deletes a leaf entry. Returns false when `id` is not stored.
    pub fn delete(&self, id: EntryId) -> Result<bool> {
        let mut guard = self.state.write();
        if !guard.entries.contains_key(&id) {
            return Ok(false);
        }
        if guard.children.get(&id).copied().unwrap_or(0) > 0 {
            return Err(DirError::Store(format!("entry {id} still has children")));
        }
        let state = Arc::make_mut(&mut guard);
        let Some(entry) = state.entries.remove(&id) else {
            return Ok(false);
        };
        state.by_dn.remove(&entry.dn().normalized());
        if let Some(link) = state.parents.remove(&id) {
            if let Some(count) = state.children.get_mut(&link.parent) {
                *count = count.saturating_sub(1);
            }
        }
        for ids in state.presence.values_mut() {
            ids.remove(&id);
        }
        if state.aliases.remove(&id).is_some() {
            state.alias_generation += 1;
        }
        state
            .sub_aliases
            .retain(|(base, member)| *base != id && *member != id);
        if state.suffix == Some(id) {
            state.suffix = None;
        }
        drop(guard);

        self.invalidate_alias(id);
        debug!(id = %id, "deleted entry");
        Ok(true)
    }

    /// Records `id` as an alias pointing at `target`.
    pub fn mark_alias(&self, id: EntryId, target: Dn) -> Result<()> {
        let mut guard = self.state.write();
        if !guard.entries.contains_key(&id) {
            return Err(DirError::Store(format!("entry {id} does not exist")));
        }
        let state = Arc::make_mut(&mut guard);
        state.aliases.insert(id, target);
        state.alias_generation += 1;
        drop(guard);
        self.invalidate_alias(id);
        Ok(())
    }

    /// Records that `member` is reachable from `base` through an alias.
    pub fn add_sub_alias(&self, base: EntryId, member: EntryId) {
        let mut guard = self.state.write();
        Arc::make_mut(&mut guard).sub_aliases.insert((base, member));
        trace!(base = %base, member = %member, "recorded sub-alias");
    }

    /// Identifier of the entry named `dn` in the current snapshot.
    pub fn lookup(&self, dn: &Dn) -> Option<EntryId> {
        self.state.read().by_dn.get(&dn.normalized()).copied()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn invalidate_alias(&self, id: EntryId) {
        if let Some(cache) = &self.alias_cache {
            cache.invalidate(id);
        }
    }
}

fn alias_target(entry: &Entry) -> Result<Option<Dn>> {
    let is_alias = entry.get(oids::OBJECT_CLASS).is_some_and(|classes| {
        classes
            .values()
            .iter()
            .filter_map(AttrValue::as_str)
            .any(|class| class.trim().eq_ignore_ascii_case(ALIAS_CLASS))
    });
    if !is_alias {
        return Ok(None);
    }
    let target = entry
        .get(oids::ALIASED_OBJECT_NAME)
        .and_then(|attr| attr.values().first())
        .and_then(AttrValue::as_str)
        .ok_or_else(|| {
            DirError::invalid_value("aliasedObjectName", "alias entry without a target name")
        })?;
    Dn::parse(target).map(Some)
}

impl Store for MemStore {
    type Txn = MemTxn;

    fn fetch(&self, tx: &MemTxn, id: EntryId) -> Result<Option<Arc<Entry>>> {
        Ok(tx.snapshot.entries.get(&id).cloned())
    }

    fn suffix_id(&self, tx: &MemTxn) -> Result<EntryId> {
        tx.snapshot
            .suffix
            .ok_or_else(|| DirError::Store("store has no suffix entry".into()))
    }

    fn index(&self, attr: &AttributeType) -> Option<IndexHandle> {
        if !self.indexed.read().contains(attr.oid()) {
            return None;
        }
        let count = self
            .state
            .read()
            .presence
            .get(attr.oid())
            .map_or(0, |ids| ids.len() as u64);
        Some(IndexHandle::new(attr.oid(), count))
    }

    fn presence_index(&self) -> Option<&dyn PresenceIndex<MemTxn>> {
        if self.presence_enabled {
            Some(self as &dyn PresenceIndex<MemTxn>)
        } else {
            None
        }
    }

    fn alias_index(&self) -> &dyn AliasIndex<MemTxn> {
        self
    }

    fn alias_cache(&self) -> Option<&AliasCache> {
        self.alias_cache.as_ref()
    }

    fn alias_generation(&self, tx: &MemTxn) -> Option<u64> {
        Some(tx.snapshot.alias_generation)
    }

    fn sub_alias_index(&self) -> &dyn SubAliasIndex<MemTxn> {
        self
    }

    fn rdn_index(&self) -> &dyn RdnIndex<MemTxn> {
        self
    }

    fn estimated_entry_count(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl PresenceIndex<MemTxn> for MemStore {
    fn contains(&self, tx: &MemTxn, attr_oid: &str, id: EntryId) -> Result<bool> {
        Ok(tx
            .snapshot
            .presence
            .get(attr_oid)
            .is_some_and(|ids| ids.contains(&id)))
    }
}

impl AliasIndex<MemTxn> for MemStore {
    fn reverse_lookup(&self, tx: &MemTxn, id: EntryId) -> Result<Option<Dn>> {
        Ok(tx.snapshot.aliases.get(&id).cloned())
    }
}

impl SubAliasIndex<MemTxn> for MemStore {
    fn contains(&self, tx: &MemTxn, base: EntryId, id: EntryId) -> Result<bool> {
        Ok(tx.snapshot.sub_aliases.contains(&(base, id)))
    }
}

impl RdnIndex<MemTxn> for MemStore {
    fn reverse_lookup(&self, tx: &MemTxn, id: EntryId) -> Result<Option<ParentLink>> {
        Ok(tx.snapshot.parents.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn person(registry: &SchemaRegistry, dn: &str, cn: &str) -> Entry {
        let oc = registry.lookup("objectClass").unwrap();
        let cn_at = registry.lookup("cn").unwrap();
        Entry::new(Dn::parse(dn).unwrap())
            .with(&oc, ["top", "person"])
            .with(&cn_at, [cn])
    }

    fn domain(registry: &SchemaRegistry) -> Entry {
        let oc = registry.lookup("objectClass").unwrap();
        let dc = registry.lookup("dc").unwrap();
        Entry::new(Dn::parse("dc=example").unwrap())
            .with(&oc, ["top", "domain"])
            .with(&dc, ["example"])
    }

    #[test]
    fn first_entry_is_suffix_and_parents_link_up() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        let root = store.add(domain(&registry)).unwrap();
        let bob = store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        let tx = store.begin_read();
        assert_eq!(store.suffix_id(&tx).unwrap(), root);
        let link = RdnIndex::reverse_lookup(&store, &tx, bob).unwrap().unwrap();
        assert_eq!(link.parent, root);
        assert_eq!(link.rdn.normalized_value(), "bob");
        let top = RdnIndex::reverse_lookup(&store, &tx, root).unwrap().unwrap();
        assert_eq!(top.parent, EntryId::ROOT);
    }

    #[test]
    fn orphans_and_duplicates_are_rejected() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        assert!(store
            .add(person(&registry, "cn=x,ou=missing,dc=example", "x"))
            .is_err());
        store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        assert!(store
            .add(person(&registry, "CN=Bob,DC=Example", "bob"))
            .is_err());
    }

    #[test]
    fn read_transaction_keeps_its_snapshot() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        let bob = store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        let before = store.begin_read();
        assert!(store.delete(bob).unwrap());
        let after = store.begin_read();
        assert!(store.fetch(&before, bob).unwrap().is_some());
        assert!(store.fetch(&after, bob).unwrap().is_none());
        assert!(!store.delete(bob).unwrap());
    }

    #[test]
    fn deleting_a_parent_with_children_fails() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        let root = store.add(domain(&registry)).unwrap();
        store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        assert!(matches!(store.delete(root), Err(DirError::Store(_))));
    }

    #[test]
    fn presence_and_user_indices() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        let bob = store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        let cn = registry.lookup("cn").unwrap();
        assert!(store.index(&cn).is_none());
        store.create_index(&cn);
        assert_eq!(store.index(&cn).unwrap().estimated_count(), 1);
        assert!(store.has_index_on(&cn));

        let tx = store.begin_read();
        let presence = store.presence_index().unwrap();
        assert!(presence.contains(&tx, oids::CN, bob).unwrap());
        assert!(!presence.contains(&tx, oids::MAIL, bob).unwrap());
        assert!(MemStore::new()
            .without_presence_index()
            .presence_index()
            .is_none());
    }

    #[test]
    fn escaped_separator_names_a_different_entry() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        store.add(person(&registry, "b=c,dc=example", "c")).unwrap();
        let nested = store.add(person(&registry, "cn=a,b=c,dc=example", "a")).unwrap();
        let flat = store
            .add(person(&registry, "cn=a\\,b=c,dc=example", "a,b=c"))
            .unwrap();
        assert_ne!(nested, flat);
        assert_eq!(store.lookup(&Dn::parse("cn=a,b=c,dc=example").unwrap()), Some(nested));
        assert_eq!(store.lookup(&Dn::parse("cn=a\\,b=c,dc=example").unwrap()), Some(flat));
        let tx = store.begin_read();
        let shown = store.fetch(&tx, flat).unwrap().unwrap().dn().to_string();
        assert_eq!(shown, "cn=a\\,b\\=c,dc=example");
    }

    #[test]
    fn alias_entries_are_indexed_from_object_class() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        let oc = registry.lookup("objectClass").unwrap();
        let aliased = registry.lookup("aliasedObjectName").unwrap();
        let alias = Entry::new(Dn::parse("cn=link,dc=example").unwrap())
            .with(&oc, ["top", "alias"])
            .with(&aliased, ["cn=bob,dc=example"]);
        let id = store.add(alias).unwrap();
        let tx = store.begin_read();
        assert!(store.alias_index().is_alias(&tx, id).unwrap());
        let target = store.alias_index().reverse_lookup(&tx, id).unwrap().unwrap();
        assert_eq!(target.normalized(), "cn=bob,dc=example");

        let broken = Entry::new(Dn::parse("cn=broken,dc=example").unwrap()).with(&oc, ["alias"]);
        assert!(store.add(broken).is_err());
    }

    #[test]
    fn writes_invalidate_the_alias_cache() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        let bob = store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        let generation = store.begin_read().alias_generation();
        let cache = store.alias_cache().unwrap();
        cache.insert(bob, generation, false);
        store
            .mark_alias(bob, Dn::parse("dc=example").unwrap())
            .unwrap();
        assert_eq!(cache.get(bob, generation), None);
    }

    #[test]
    fn alias_generation_moves_only_with_alias_membership() {
        let registry = SchemaRegistry::with_core_schema();
        let store = MemStore::new();
        store.add(domain(&registry)).unwrap();
        let before = store.begin_read();
        let bob = store.add(person(&registry, "cn=bob,dc=example", "bob")).unwrap();
        assert_eq!(store.begin_read().alias_generation(), before.alias_generation());

        store
            .mark_alias(bob, Dn::parse("dc=example").unwrap())
            .unwrap();
        let marked = store.begin_read();
        assert!(marked.alias_generation() > before.alias_generation());
        assert_eq!(store.alias_generation(&before), Some(before.alias_generation()));

        store.delete(bob).unwrap();
        assert!(store.begin_read().alias_generation() > marked.alias_generation());
    }
}
