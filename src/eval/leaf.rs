use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use super::{full_scan_cost, scaled_cost, Candidate};
use crate::config::EvaluatorConfig;
use crate::entry::{AttrValue, Entry};
use crate::schema::{
    AttributeType, ByteComparator, Comparator, MatchingRule, NoOpNormalizer, Normalizer,
    SchemaRegistry,
};
use crate::store::{IndexHandle, Store};
use crate::types::{DirError, Result, RuleUsage};

/// Schema metadata resolved once for a simple comparison.
pub(crate) struct LeafResolver<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) attribute: Arc<AttributeType>,
    pub(crate) subtypes: Vec<Arc<AttributeType>>,
    pub(crate) rule: Option<Arc<MatchingRule>>,
    pub(crate) normalizer: Arc<dyn Normalizer>,
    pub(crate) comparator: Arc<dyn Comparator>,
    pub(crate) index: Option<IndexHandle>,
    full_cost: u64,
}

impl<S: Store> LeafResolver<S> {
    pub(crate) fn resolve(
        store: Arc<S>,
        registry: &SchemaRegistry,
        config: &EvaluatorConfig,
        reference: &str,
        usage: RuleUsage,
    ) -> Result<Self> {
        let attribute = registry.lookup(reference)?;
        let subtypes = registry.descendants(&attribute).to_vec();
        let index = store.index(&attribute);
        let rule = match usage {
            RuleUsage::Equality => registry.equality_rule(&attribute),
            RuleUsage::Ordering => {
                let rule = registry
                    .ordering_rule(&attribute)
                    .or_else(|| registry.equality_rule(&attribute));
                if rule.is_none() {
                    return Err(DirError::NoMatchingRule {
                        attribute: attribute.display_name().to_owned(),
                        usage,
                    });
                }
                rule
            }
            RuleUsage::Substring => registry
                .substring_rule(&attribute)
                .or_else(|| registry.equality_rule(&attribute)),
        };
        let (normalizer, comparator): (Arc<dyn Normalizer>, Arc<dyn Comparator>) = match &rule {
            Some(rule) => (Arc::clone(rule.normalizer()), Arc::clone(rule.comparator())),
            None => (Arc::new(NoOpNormalizer), Arc::new(ByteComparator)),
        };
        debug!(
            attribute = attribute.display_name(),
            %usage,
            rule = rule.as_ref().map_or("none", |r| r.name()),
            indexed = index.is_some(),
            subtypes = subtypes.len(),
            "resolved leaf"
        );
        let full_cost = full_scan_cost(&*store, config);
        Ok(Self {
            store,
            attribute,
            subtypes,
            rule,
            normalizer,
            comparator,
            index,
            full_cost,
        })
    }

    pub(crate) fn normalize(&self, value: &AttrValue) -> Result<AttrValue> {
        self.normalizer
            .normalize(value)
            .map_err(|err| DirError::invalid_value(self.attribute.display_name(), err.0))
    }

    pub(crate) fn compare(&self, left: &AttrValue, right: &AttrValue) -> Result<Ordering> {
        self.comparator
            .compare(left, right)
            .map_err(|err| DirError::invalid_value(self.attribute.display_name(), err.0))
    }

    /// Tests the attribute type itself and then each subtype, returning the
    /// first raw value accepted by `accept`.
    pub(crate) fn find_value<'e, F>(
        &self,
        entry: &'e Entry,
        mut accept: F,
    ) -> Result<Option<&'e AttrValue>>
    where
        F: FnMut(&AttrValue) -> Result<bool>,
    {
        let types = std::iter::once(&self.attribute).chain(self.subtypes.iter());
        for at in types {
            let Some(attr) = entry.get(at.oid()) else {
                continue;
            };
            for value in attr.values() {
                if accept(value)? {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    /// Whether the entry holds the attribute type or one of its subtypes.
    pub(crate) fn present_in(&self, entry: &Entry) -> bool {
        entry.has(self.attribute.oid()) || self.subtypes.iter().any(|at| entry.has(at.oid()))
    }

    pub(crate) fn fetch(
        &self,
        candidate: &mut Candidate,
        tx: &S::Txn,
    ) -> Result<Option<Arc<Entry>>> {
        candidate.resolve(&*self.store, tx)
    }

    pub(crate) fn rule_name(&self) -> &'static str {
        self.rule.as_ref().map_or("none", |rule| rule.name())
    }

    pub(crate) fn full_cost(&self) -> u64 {
        self.full_cost
    }

    /// Annotation first, then the index estimate, then a full scan.
    pub(crate) fn cost(&self, annotation: Option<u64>, selectivity_pct: u64) -> u64 {
        if let Some(count) = annotation {
            return count;
        }
        match &self.index {
            Some(index) => scaled_cost(index.estimated_count(), selectivity_pct),
            None => self.full_cost,
        }
    }
}
