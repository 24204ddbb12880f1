#![forbid(unsafe_code)]

//! Filter evaluators.
//!
//! A filter is compiled once into a tree of boxed [`Evaluator`]s (see
//! [`EvaluatorBuilder`]) and the root is then asked about every candidate a
//! search surfaces. Evaluators are immutable after construction and can be
//! shared across threads.

use std::sync::Arc;

use tracing::trace;

use crate::config::EvaluatorConfig;
use crate::entry::{AttrValue, Entry};
use crate::filter::FilterNode;
use crate::profile;
use crate::store::Store;
use crate::types::{EntryId, Result};

mod builder;
mod equality;
mod leaf;
mod logical;
mod ordering;
mod presence;
mod scope;
mod substring;
mod trivial;

pub use builder::EvaluatorBuilder;
pub use equality::EqualityEvaluator;
pub use logical::{AndEvaluator, NotEvaluator, OrEvaluator};
pub use ordering::{Bound, OrderingEvaluator};
pub use presence::PresenceEvaluator;
pub use scope::SubtreeScopeEvaluator;
pub use substring::{SubstringEvaluator, SubstringPattern};
pub use trivial::{EmptyEvaluator, PassThroughEvaluator};

pub(crate) const EQUALITY_SELECTIVITY_PCT: u64 = 5;
pub(crate) const APPROXIMATE_SELECTIVITY_PCT: u64 = 5;
pub(crate) const ORDERING_SELECTIVITY_PCT: u64 = 30;
pub(crate) const SUBSTRING_SELECTIVITY_PCT: u64 = 20;
pub(crate) const PRESENCE_SELECTIVITY_PCT: u64 = 50;

/// A record offered for evaluation: its identifier plus the entry once fetched.
#[derive(Clone, Debug)]
pub struct Candidate {
    id: EntryId,
    entry: Option<Arc<Entry>>,
}

impl Candidate {
    /// Candidate whose entry has not been fetched yet.
    pub fn new(id: EntryId) -> Self {
        Self { id, entry: None }
    }

    /// Candidate with an already materialized entry.
    pub fn with_entry(id: EntryId, entry: Arc<Entry>) -> Self {
        Self {
            id,
            entry: Some(entry),
        }
    }

    /// Identifier of the candidate.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Cached entry, if already resolved.
    pub fn entry(&self) -> Option<&Arc<Entry>> {
        self.entry.as_ref()
    }

    /// Returns the entry, fetching and caching it on first use.
    ///
    /// `Ok(None)` means the entry vanished after the candidate was
    /// enumerated; callers treat that as "does not match".
    pub fn resolve<S: Store>(&mut self, store: &S, tx: &S::Txn) -> Result<Option<Arc<Entry>>> {
        if let Some(entry) = &self.entry {
            return Ok(Some(Arc::clone(entry)));
        }
        let fetched = store.fetch(tx, self.id)?;
        profile::record_fetch(fetched.is_some());
        if fetched.is_none() {
            trace!(id = %self.id, "candidate vanished before evaluation");
        }
        self.entry = fetched.clone();
        Ok(fetched)
    }
}

/// Outcome of evaluating one candidate.
///
/// Ordering and substring evaluators report the raw value that satisfied the
/// assertion so that ordered scans need not normalize it again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Match {
    matched: bool,
    value: Option<AttrValue>,
}

impl Match {
    /// A positive outcome with no reported value.
    pub fn yes() -> Self {
        Self {
            matched: true,
            value: None,
        }
    }

    /// A negative outcome.
    pub fn no() -> Self {
        Self::default()
    }

    /// A positive outcome reporting the raw value that matched.
    pub fn with_value(value: AttrValue) -> Self {
        Self {
            matched: true,
            value: Some(value),
        }
    }

    /// Whether the candidate satisfied the filter.
    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Raw value that satisfied the assertion, when reported.
    pub fn value(&self) -> Option<&AttrValue> {
        self.value.as_ref()
    }

    /// Consumes the outcome and returns the reported value.
    pub fn into_value(self) -> Option<AttrValue> {
        self.value
    }
}

impl From<bool> for Match {
    fn from(matched: bool) -> Self {
        Self {
            matched,
            value: None,
        }
    }
}

/// Decision capability shared by every node of a compiled filter.
pub trait Evaluator<S: Store>: Send + Sync {
    /// Evaluates a candidate, fetching its entry through `tx` when needed.
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match>;

    /// Evaluates a fully materialized entry.
    fn evaluate_entry(&self, entry: &Entry) -> Result<bool>;

    /// Filter node this evaluator was compiled from.
    fn expression(&self) -> &FilterNode;

    /// Rough number of candidates this predicate lets through.
    fn estimated_cost(&self) -> u64;

    /// One-line description used by [`Evaluator::dump`].
    fn describe(&self) -> String;

    /// Child evaluators in evaluation order.
    fn children(&self) -> &[Box<dyn Evaluator<S>>] {
        &[]
    }

    /// Indented rendering of the evaluator tree, two spaces per level.
    fn dump(&self) -> String {
        let mut out = self.describe();
        for child in self.children() {
            for line in child.dump().lines() {
                out.push('\n');
                out.push_str("  ");
                out.push_str(line);
            }
        }
        out
    }
}

pub(crate) fn full_scan_cost<S: Store>(store: &S, config: &EvaluatorConfig) -> u64 {
    store
        .estimated_entry_count()
        .unwrap_or(config.default_entry_count)
}

pub(crate) fn scaled_cost(count: u64, pct: u64) -> u64 {
    count.saturating_mul(pct).div_ceil(100)
}
