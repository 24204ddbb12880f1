use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::leaf::LeafResolver;
use super::{Candidate, Evaluator, Match, ORDERING_SELECTIVITY_PCT};
use crate::config::EvaluatorConfig;
use crate::entry::{AttrValue, Entry};
use crate::filter::FilterNode;
use crate::profile::{profile_timer, record_profile_timer, EvalProfileKind};
use crate::schema::SchemaRegistry;
use crate::store::Store;
use crate::types::{DirError, Result, RuleUsage};

/// Direction of an ordering assertion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bound {
    /// `(attr<=value)`
    LessEq,
    /// `(attr>=value)`
    GreaterEq,
}

impl Bound {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Bound::LessEq => ord.is_le(),
            Bound::GreaterEq => ord.is_ge(),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::LessEq => write!(f, "<="),
            Bound::GreaterEq => write!(f, ">="),
        }
    }
}

/// Evaluates `(attr<=value)` and `(attr>=value)`.
///
/// Uses the ordering rule of the attribute type, or its equality rule when
/// no ordering rule is declared. A matching candidate reports the raw value
/// that satisfied the bound.
pub struct OrderingEvaluator<S: Store> {
    node: FilterNode,
    leaf: LeafResolver<S>,
    bound: Bound,
    normalized: AttrValue,
}

impl<S: Store> OrderingEvaluator<S> {
    /// Resolves the ordering rule for a `LessEq` or `GreaterEq` node.
    ///
    /// Fails with [`DirError::NoMatchingRule`] when the attribute type has
    /// neither an ordering nor an equality rule.
    pub fn new(
        node: &FilterNode,
        store: Arc<S>,
        registry: &SchemaRegistry,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        let (assertion, bound) = match node {
            FilterNode::LessEq(a) => (a, Bound::LessEq),
            FilterNode::GreaterEq(a) => (a, Bound::GreaterEq),
            _ => return Err(DirError::InvalidFilter("expected an ordering assertion")),
        };
        let leaf = LeafResolver::resolve(
            store,
            registry,
            config,
            &assertion.attribute,
            RuleUsage::Ordering,
        )?;
        let normalized = leaf.normalize(&assertion.value)?;
        Ok(Self {
            node: node.clone(),
            leaf,
            bound,
            normalized,
        })
    }

    /// Direction of the assertion.
    pub fn bound(&self) -> Bound {
        self.bound
    }

    fn matching_value<'e>(&self, entry: &'e Entry) -> Result<Option<&'e AttrValue>> {
        let timer = profile_timer();
        let found = self.leaf.find_value(entry, |value| {
            let value = self.leaf.normalize(value)?;
            Ok(self.bound.accepts(self.leaf.compare(&value, &self.normalized)?))
        });
        record_profile_timer(EvalProfileKind::Leaf, timer);
        found
    }
}

impl<S: Store> Evaluator<S> for OrderingEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        let Some(entry) = self.leaf.fetch(candidate, tx)? else {
            return Ok(Match::no());
        };
        Ok(match self.matching_value(&entry)? {
            Some(value) => Match::with_value(value.clone()),
            None => Match::no(),
        })
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        Ok(self.matching_value(entry)?.is_some())
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.leaf.cost(self.node.count(), ORDERING_SELECTIVITY_PCT)
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
