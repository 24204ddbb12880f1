use std::sync::Arc;

use super::leaf::LeafResolver;
use super::{Candidate, Evaluator, Match, PRESENCE_SELECTIVITY_PCT};
use crate::config::EvaluatorConfig;
use crate::entry::Entry;
use crate::filter::FilterNode;
use crate::profile::{profile_timer, record_profile_timer, EvalProfileKind};
use crate::schema::SchemaRegistry;
use crate::store::Store;
use crate::types::{DirError, Result, RuleUsage};

/// Evaluates `(attr=*)`.
///
/// Attribute types listed in [`EvaluatorConfig::implicit_presence`] are
/// present on every stored entry and match without reading anything.
///
/// When the store keeps a presence index, the index answers for the
/// candidate's id even if the candidate already carries an entry, so a
/// [`Candidate::with_entry`] for an id the store does not hold is a non-match.
pub struct PresenceEvaluator<S: Store> {
    node: FilterNode,
    leaf: LeafResolver<S>,
    implicit: bool,
}

impl<S: Store> PresenceEvaluator<S> {
    /// Resolves the attribute type of a `Presence` node.
    pub fn new(
        node: &FilterNode,
        store: Arc<S>,
        registry: &SchemaRegistry,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        let FilterNode::Presence(assertion) = node else {
            return Err(DirError::InvalidFilter("expected a presence assertion"));
        };
        let leaf = LeafResolver::resolve(
            store,
            registry,
            config,
            &assertion.attribute,
            RuleUsage::Equality,
        )?;
        let implicit = config.is_implicitly_present(leaf.attribute.oid());
        Ok(Self {
            node: node.clone(),
            leaf,
            implicit,
        })
    }

    /// Whether the attribute type is treated as always present.
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    fn indexed_presence(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Option<bool>> {
        let Some(index) = self.leaf.store.presence_index() else {
            return Ok(None);
        };
        let id = candidate.id();
        if index.contains(tx, self.leaf.attribute.oid(), id)? {
            return Ok(Some(true));
        }
        for subtype in &self.leaf.subtypes {
            if index.contains(tx, subtype.oid(), id)? {
                return Ok(Some(true));
            }
        }
        Ok(Some(false))
    }
}

impl<S: Store> Evaluator<S> for PresenceEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        if self.implicit {
            return Ok(Match::yes());
        }
        let timer = profile_timer();
        let present = match self.indexed_presence(candidate, tx)? {
            Some(present) => present,
            None => match self.leaf.fetch(candidate, tx)? {
                Some(entry) => self.leaf.present_in(&entry),
                None => false,
            },
        };
        record_profile_timer(EvalProfileKind::Leaf, timer);
        Ok(Match::from(present))
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        Ok(self.implicit || self.leaf.present_in(entry))
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        if self.implicit {
            return self.node.count().unwrap_or_else(|| self.leaf.full_cost());
        }
        self.leaf.cost(self.node.count(), PRESENCE_SELECTIVITY_PCT)
    }

    fn describe(&self) -> String {
        format!(
            "{} {} implicit={} indexed={}",
            self.node.kind(),
            self.node,
            self.implicit,
            self.leaf.index.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::test_support::Fixture;
    use crate::store::MemStore;
    use crate::types::EntryId;

    fn build(fx: &Fixture, attr: &str) -> PresenceEvaluator<MemStore> {
        PresenceEvaluator::new(
            &FilterNode::present(attr),
            Arc::clone(&fx.store),
            &fx.registry,
            &EvaluatorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn implicit_attributes_always_match() {
        let fx = Fixture::new();
        let eval = build(&fx, "objectClass");
        assert!(eval.is_implicit());
        let bare = fx.entry("cn=x,dc=example", &[]);
        assert!(eval.evaluate_entry(&bare).unwrap());
        let tx = fx.store.begin_read();
        assert!(eval
            .evaluate(&mut Candidate::new(EntryId(4242)), &tx)
            .unwrap()
            .matched());
        assert_eq!(Evaluator::<MemStore>::estimated_cost(&eval), 1);
    }

    #[test]
    fn presence_index_covers_subtypes() {
        let fx = Fixture::new();
        let id = fx.add("cn=bob,dc=example", &[("sn", &["Smith"])]);
        let name = build(&fx, "name");
        let mail = build(&fx, "mail");
        let tx = fx.store.begin_read();
        assert!(name.evaluate(&mut Candidate::new(id), &tx).unwrap().matched());
        assert!(!mail.evaluate(&mut Candidate::new(id), &tx).unwrap().matched());
    }

    #[test]
    fn falls_back_to_entry_without_presence_index() {
        let registry = Arc::new(crate::schema::SchemaRegistry::with_core_schema());
        let store = Arc::new(MemStore::new().without_presence_index());
        let fx = Fixture {
            registry,
            store,
            suffix: EntryId::ROOT,
        };
        fx.add("dc=example", &[("dc", &["example"])]);
        let id = fx.add("cn=bob,dc=example", &[("cn", &["bob"])]);
        let eval = build(&fx, "cn");
        let tx = fx.store.begin_read();
        assert!(eval.evaluate(&mut Candidate::new(id), &tx).unwrap().matched());
        assert!(!eval
            .evaluate(&mut Candidate::new(EntryId(999)), &tx)
            .unwrap()
            .matched());
    }

    #[test]
    fn presence_index_wins_over_a_carried_entry() {
        let fx = Fixture::new();
        let eval = build(&fx, "cn");
        let carried = Arc::new(fx.entry("cn=ghost,dc=example", &[("cn", &["ghost"])]));
        let tx = fx.store.begin_read();
        let mut unknown = Candidate::with_entry(EntryId(9999), Arc::clone(&carried));
        assert!(!eval.evaluate(&mut unknown, &tx).unwrap().matched());
        assert!(eval.evaluate_entry(&carried).unwrap());

        let stored = fx.add("cn=bob,dc=example", &[("cn", &["bob"])]);
        let bare = Arc::new(fx.entry("cn=bob,dc=example", &[]));
        let mut known = Candidate::with_entry(stored, bare);
        assert!(eval.evaluate(&mut known, &fx.store.begin_read()).unwrap().matched());
    }

    #[test]
    fn entry_mode_checks_subtypes() {
        let fx = Fixture::new();
        let eval = build(&fx, "name");
        let with_cn = fx.entry("cn=x,dc=example", &[("cn", &["x"])]);
        let without = fx.entry("cn=x,dc=example", &[("mail", &["x@example.org"])]);
        assert!(eval.evaluate_entry(&with_cn).unwrap());
        assert!(!eval.evaluate_entry(&without).unwrap());
    }
}
