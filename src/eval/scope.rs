use std::sync::Arc;

use tracing::{debug, trace};

use super::{full_scan_cost, Candidate, Evaluator, Match};
use crate::config::EvaluatorConfig;
use crate::entry::{Dn, Entry};
use crate::filter::{AliasDerefMode, FilterNode};
use crate::profile::{profile_timer, record_profile_timer, EvalProfileKind};
use crate::store::Store;
use crate::types::{DirError, EntryId, Result};

/// Restricts candidates to the subtree below (and including) a base entry.
///
/// Ancestry is derived from the store's parent index, so this evaluator only
/// works on candidates that carry an identifier. When aliases are
/// dereferenced while searching, alias entries themselves are excluded and
/// entries reachable from the base only through an alias are included.
pub struct SubtreeScopeEvaluator<S: Store> {
    node: FilterNode,
    store: Arc<S>,
    base_id: EntryId,
    base_dn: Dn,
    deref: AliasDerefMode,
    base_is_context_entry: bool,
    max_ancestor_depth: usize,
    full_cost: u64,
}

impl<S: Store> SubtreeScopeEvaluator<S> {
    /// Builds the evaluator for a `Scope` node, resolving whether its base is
    /// the store's suffix entry through `tx`.
    pub fn new(
        node: &FilterNode,
        store: Arc<S>,
        tx: &S::Txn,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        let FilterNode::Scope(scope) = node else {
            return Err(DirError::InvalidFilter("expected a subtree scope"));
        };
        let base_is_context_entry = store.suffix_id(tx)? == scope.base_id;
        debug!(
            base = %scope.base_dn,
            base_id = %scope.base_id,
            deref = %scope.deref,
            base_is_context_entry,
            "built subtree scope"
        );
        let full_cost = full_scan_cost(&*store, config);
        Ok(Self {
            node: node.clone(),
            base_id: scope.base_id,
            base_dn: scope.base_dn.clone(),
            deref: scope.deref,
            base_is_context_entry,
            max_ancestor_depth: config.max_ancestor_depth,
            full_cost,
            store,
        })
    }

    /// Whether the base is the suffix, which puts every entry in scope.
    pub fn base_is_context_entry(&self) -> bool {
        self.base_is_context_entry
    }

    fn is_descendant(&self, id: EntryId, entry: &Entry, tx: &S::Txn) -> Result<bool> {
        if self.base_is_context_entry
            || id == self.base_id
            || entry.dn().is_descendant_of(&self.base_dn)
        {
            return Ok(true);
        }
        let rdn_index = self.store.rdn_index();
        let mut current = id;
        for depth in 0..self.max_ancestor_depth {
            let Some(link) = rdn_index.reverse_lookup(tx, current)? else {
                trace!(id = %id, depth, "parent chain broken");
                return Ok(false);
            };
            if link.parent == self.base_id {
                trace!(id = %id, depth, "reached base");
                return Ok(true);
            }
            if link.parent.is_root() {
                return Ok(false);
            }
            current = link.parent;
        }
        Err(DirError::Corruption("parent chain exceeds the maximum ancestor depth"))
    }

    fn is_alias(&self, id: EntryId, tx: &S::Txn) -> Result<bool> {
        let cache = self
            .store
            .alias_cache()
            .zip(self.store.alias_generation(tx));
        if let Some((cache, generation)) = cache {
            if let Some(cached) = cache.get(id, generation) {
                return Ok(cached);
            }
        }
        let is_alias = self.store.alias_index().is_alias(tx, id)?;
        if let Some((cache, generation)) = cache {
            cache.insert(id, generation, is_alias);
        }
        Ok(is_alias)
    }

    fn in_scope(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<bool> {
        let Some(entry) = candidate.resolve(&*self.store, tx)? else {
            return Ok(false);
        };
        let id = candidate.id();
        let descendant = self.is_descendant(id, &entry, tx)?;
        if !self.deref.is_deref_in_searching() {
            return Ok(descendant);
        }
        if self.is_alias(id, tx)? {
            trace!(id = %id, "alias excluded from dereferencing search");
            return Ok(false);
        }
        if descendant {
            return Ok(true);
        }
        self.store.sub_alias_index().contains(tx, self.base_id, id)
    }
}

impl<S: Store> Evaluator<S> for SubtreeScopeEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        let timer = profile_timer();
        let in_scope = self.in_scope(candidate, tx);
        record_profile_timer(EvalProfileKind::Scope, timer);
        in_scope.map(Match::from)
    }

    fn evaluate_entry(&self, _entry: &Entry) -> Result<bool> {
        Err(DirError::Unsupported(
            "subtree scope needs a candidate identifier to resolve ancestry",
        ))
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.node.count().unwrap_or(self.full_cost)
    }

    fn describe(&self) -> String {
        format!(
            "SubtreeScope base=\"{}\" deref={} context={} cost={}",
            self.base_dn,
            self.deref,
            self.base_is_context_entry,
            self.estimated_cost()
        )
    }
}
