use tracing::debug;

use super::{Candidate, Evaluator, Match};
use crate::entry::Entry;
use crate::filter::FilterNode;
use crate::profile::{profile_timer, record_profile_timer, EvalProfileKind};
use crate::store::Store;
use crate::types::{DirError, Result};

/// Conjunction over child evaluators.
///
/// Children run cheapest first so the most selective predicate gets the
/// first chance to reject a candidate. The boolean result does not depend on
/// the order. On a match, the value reported by the last child that reported
/// one is passed up.
pub struct AndEvaluator<S: Store> {
    node: FilterNode,
    children: Vec<Box<dyn Evaluator<S>>>,
}

impl<S: Store> AndEvaluator<S> {
    /// Wraps `children`, reordering them by ascending estimated cost.
    pub fn new(node: FilterNode, mut children: Vec<Box<dyn Evaluator<S>>>) -> Self {
        children.sort_by_key(|child| child.estimated_cost());
        debug!(
            filter = %node,
            costs = ?children.iter().map(|c| c.estimated_cost()).collect::<Vec<_>>(),
            "ordered conjunction"
        );
        Self { node, children }
    }
}

impl<S: Store> Evaluator<S> for AndEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        let timer = profile_timer();
        let mut outcome = Match::yes();
        for child in &self.children {
            let answer = child.evaluate(candidate, tx)?;
            if !answer.matched() {
                outcome = Match::no();
                break;
            }
            if answer.value().is_some() {
                outcome = answer;
            }
        }
        record_profile_timer(EvalProfileKind::Logical, timer);
        Ok(outcome)
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        for child in &self.children {
            if !child.evaluate_entry(entry)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.node.count().unwrap_or_else(|| {
            self.children
                .iter()
                .map(|child| child.estimated_cost())
                .min()
                .unwrap_or(0)
        })
    }

    fn describe(&self) -> String {
        format!("And cost={}", self.estimated_cost())
    }

    fn children(&self) -> &[Box<dyn Evaluator<S>>] {
        &self.children
    }
}

/// Disjunction over child evaluators, largest candidate set first.
///
/// Returns the accepting child's outcome unchanged.
pub struct OrEvaluator<S: Store> {
    node: FilterNode,
    children: Vec<Box<dyn Evaluator<S>>>,
}

impl<S: Store> OrEvaluator<S> {
    /// Wraps `children`, reordering them by descending estimated cost.
    pub fn new(node: FilterNode, mut children: Vec<Box<dyn Evaluator<S>>>) -> Self {
        children.sort_by_key(|child| std::cmp::Reverse(child.estimated_cost()));
        Self { node, children }
    }
}

impl<S: Store> Evaluator<S> for OrEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        let timer = profile_timer();
        let mut outcome = Match::no();
        for child in &self.children {
            let answer = child.evaluate(candidate, tx)?;
            if answer.matched() {
                outcome = answer;
                break;
            }
        }
        record_profile_timer(EvalProfileKind::Logical, timer);
        Ok(outcome)
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        for child in &self.children {
            if child.evaluate_entry(entry)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.node.count().unwrap_or_else(|| {
            self.children
                .iter()
                .fold(0u64, |acc, child| acc.saturating_add(child.estimated_cost()))
        })
    }

    fn describe(&self) -> String {
        format!("Or cost={}", self.estimated_cost())
    }

    fn children(&self) -> &[Box<dyn Evaluator<S>>] {
        &self.children
    }
}

/// Negation of exactly one child.
///
/// Never consults an index itself, so a negated predicate usually forces a
/// wide scan upstream.
pub struct NotEvaluator<S: Store> {
    node: FilterNode,
    child: [Box<dyn Evaluator<S>>; 1],
    full_cost: u64,
}

impl<S: Store> NotEvaluator<S> {
    /// Wraps a single child. `full_cost` is the scan cost reported upward.
    pub fn new(
        node: FilterNode,
        mut children: Vec<Box<dyn Evaluator<S>>>,
        full_cost: u64,
    ) -> Result<Self> {
        let child = match (children.pop(), children.is_empty()) {
            (Some(child), true) => child,
            _ => return Err(DirError::InvalidFilter("not requires exactly one operand")),
        };
        Ok(Self {
            node,
            child: [child],
            full_cost,
        })
    }
}

impl<S: Store> Evaluator<S> for NotEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        let timer = profile_timer();
        let inner = self.child[0].evaluate(candidate, tx)?;
        record_profile_timer(EvalProfileKind::Logical, timer);
        Ok(Match::from(!inner.matched()))
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        Ok(!self.child[0].evaluate_entry(entry)?)
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.node.count().unwrap_or(self.full_cost)
    }

    fn describe(&self) -> String {
        format!("Not cost={}", self.estimated_cost())
    }

    fn children(&self) -> &[Box<dyn Evaluator<S>>] {
        &self.child
    }
}
