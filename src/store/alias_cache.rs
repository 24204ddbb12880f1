use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::EntryId;

const DEFAULT_CAPACITY: usize = 1024;

/// Bounded cache of "is this entry an alias" answers.
///
/// Sits in front of the alias index. Every answer is tagged with the alias
/// generation of the snapshot it was read from, and a lookup only hits when
/// the reader's snapshot carries the same generation. Readers pinned to an
/// older snapshot therefore never see answers published by newer writes, and
/// the reverse.
pub struct AliasCache {
    inner: Mutex<LruCache<EntryId, (u64, bool)>>,
}

impl AliasCache {
    /// Creates a cache holding at most `capacity` answers (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached answer for `id` as seen by a snapshot at `generation`.
    pub fn get(&self, id: EntryId, generation: u64) -> Option<bool> {
        match self.inner.lock().get(&id) {
            Some(&(stored, is_alias)) if stored == generation => Some(is_alias),
            _ => None,
        }
    }

    /// Records the answer for `id` read at `generation`.
    ///
    /// An answer from an older generation never replaces a newer one.
    pub fn insert(&self, id: EntryId, generation: u64, is_alias: bool) {
        let mut inner = self.inner.lock();
        if let Some(&(stored, _)) = inner.peek(&id) {
            if stored > generation {
                return;
            }
        }
        inner.put(id, (generation, is_alias));
    }

    /// Forgets the answer for `id`.
    pub fn invalidate(&self, id: EntryId) {
        self.inner.lock().pop(&id);
    }

    /// Forgets every answer.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of cached answers.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AliasCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for AliasCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasCache").field("len", &self.len()).finish()
    }
}
