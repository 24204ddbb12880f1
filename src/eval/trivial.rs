use super::{Candidate, Evaluator, Match};
use crate::entry::Entry;
use crate::filter::FilterNode;
use crate::store::Store;
use crate::types::Result;

/// Accepts every candidate.
#[derive(Clone, Debug)]
pub struct PassThroughEvaluator {
    node: FilterNode,
    cost: u64,
}

impl PassThroughEvaluator {
    /// `cost` is normally the full scan cost of the store.
    pub fn new(node: FilterNode, cost: u64) -> Self {
        Self { node, cost }
    }
}

impl<S: Store> Evaluator<S> for PassThroughEvaluator {
    fn evaluate(&self, _candidate: &mut Candidate, _tx: &S::Txn) -> Result<Match> {
        Ok(Match::yes())
    }

    fn evaluate_entry(&self, _entry: &Entry) -> Result<bool> {
        Ok(true)
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        self.cost
    }

    fn describe(&self) -> String {
        format!("PassThrough cost={}", self.cost)
    }
}

/// Rejects every candidate.
#[derive(Clone, Debug)]
pub struct EmptyEvaluator {
    node: FilterNode,
}

impl EmptyEvaluator {
    /// Wraps the statically empty or unsupported node.
    pub fn new(node: FilterNode) -> Self {
        Self { node }
    }
}

impl<S: Store> Evaluator<S> for EmptyEvaluator {
    fn evaluate(&self, _candidate: &mut Candidate, _tx: &S::Txn) -> Result<Match> {
        Ok(Match::no())
    }

    fn evaluate_entry(&self, _entry: &Entry) -> Result<bool> {
        Ok(false)
    }

    fn expression(&self) -> &FilterNode {
        &self.node
    }

    fn estimated_cost(&self) -> u64 {
        0
    }

    fn describe(&self) -> String {
        "Empty cost=0".to_owned()
    }
}
