use std::sync::Arc;

use super::leaf::LeafResolver;
use super::{
    Candidate, Evaluator, Match, APPROXIMATE_SELECTIVITY_PCT, EQUALITY_SELECTIVITY_PCT,
};
use crate::config::EvaluatorConfig;
use crate::entry::{AttrValue, Entry};
use crate::filter::{AssertionNode, FilterNode};
use crate::profile::{profile_timer, record_profile_timer, EvalProfileKind};
use crate::schema::SchemaRegistry;
use crate::store::Store;
use crate::types::{DirError, Result, RuleUsage};

/// Evaluates `(attr=value)` and `(attr~=value)`.
///
/// Approximate assertions use the equality rule unchanged; there is no
/// phonetic or edit-distance matching.
pub struct EqualityEvaluator<S: Store> {
    node: FilterNode,
    leaf: LeafResolver<S>,
    raw: AttrValue,
    normalized: AttrValue,
}

impl<S: Store> EqualityEvaluator<S> {
    /// Resolves the equality rule for `node`, which must be an equality or
    /// approximate assertion.
    pub fn new(
        node: &FilterNode,
        store: Arc<S>,
        registry: &SchemaRegistry,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        let assertion = match node {
            FilterNode::Equality(a) | FilterNode::Approximate(a) => a,
            _ => return Err(DirError::InvalidFilter("expected an equality assertion")),
        };
        Self::from_assertion(node.clone(), assertion, store, registry, config)
    }

    fn from_assertion(
        node: FilterNode,
        assertion: &AssertionNode,
        store: Arc<S>,
        registry: &SchemaRegistry,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        let leaf = LeafResolver::resolve(
            store,
            registry,
            config,
            &assertion.attribute,
            RuleUsage::Equality,
        )?;
        let normalized = leaf.normalize(&assertion.value)?;
        Ok(Self {
            raw: assertion.value.clone(),
            node,
            leaf,
            normalized,
        })
    }

    fn matches(&self, entry: &Entry) -> Result<bool> {
        let timer = profile_timer();
        let found = self.leaf.find_value(entry, |value| {
            if *value == self.raw {
                return Ok(true);
            }
            let value = self.leaf.normalize(value)?;
            Ok(self.leaf.compare(&value, &self.normalized)?.is_eq())
        })?;
        record_profile_timer(EvalProfileKind::Leaf, timer);
        Ok(found.is_some())
    }

    fn selectivity(&self) -> u64 {
        match self.node {
            FilterNode::Approximate(_) => APPROXIMATE_SELECTIVITY_PCT,
            _ => EQUALITY_SELECTIVITY_PCT,
        }
    }
}

impl<S: Store> Evaluator<S> for EqualityEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        match self.leaf.fetch(candidate, tx)? {
            Some(entry) => self.matches(&entry).map(Match::from),
            None => Ok(Match::no()),
        }
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        self.matches(entry)
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.leaf.cost(self.node.count(), self.selectivity())
    }

    fn describe(&self) -> String {
        format!(
            "{} {} rule={} indexed={}",
            self.node.kind(),
            self.node,
            self.leaf.rule_name(),
            self.leaf.index.is_some()
        )
    }
}
