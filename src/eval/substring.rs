use std::sync::Arc;

use tracing::warn;

use super::leaf::LeafResolver;
use super::{Candidate, Evaluator, Match, SUBSTRING_SELECTIVITY_PCT};
use crate::config::EvaluatorConfig;
use crate::entry::{AttrValue, Entry};
use crate::filter::FilterNode;
use crate::profile::{profile_timer, record_profile_timer, EvalProfileKind};
use crate::schema::SchemaRegistry;
use crate::store::Store;
use crate::types::{DirError, Result, RuleUsage};

/// Compiled `initial*any*...*final` pattern over normalized strings.
///
/// A leading or trailing `*` matches any run of characters, including none.
/// A `*` between two fragments must consume at least one character unless
/// empty gaps are allowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstringPattern {
    initial: Option<String>,
    any: Vec<String>,
    final_: Option<String>,
    allow_empty_gaps: bool,
}

impl SubstringPattern {
    /// Builds a pattern from already normalized fragments. Empty fragments
    /// are dropped.
    pub fn new(
        initial: Option<String>,
        any: Vec<String>,
        final_: Option<String>,
        allow_empty_gaps: bool,
    ) -> Self {
        Self {
            initial: initial.filter(|s| !s.is_empty()),
            any: any.into_iter().filter(|s| !s.is_empty()).collect(),
            final_: final_.filter(|s| !s.is_empty()),
            allow_empty_gaps,
        }
    }

    /// Tests a normalized value against the pattern.
    pub fn matches(&self, value: &str) -> bool {
        let mut pos = 0;
        let mut anchored = false;
        if let Some(initial) = &self.initial {
            if !value.starts_with(initial.as_str()) {
                return false;
            }
            pos = initial.len();
            anchored = true;
        }
        // Leftmost placement of each fragment leaves the most room for the rest.
        for fragment in &self.any {
            let Some(start) = self.gap_end(value, pos, anchored) else {
                return false;
            };
            let Some(offset) = value[start..].find(fragment.as_str()) else {
                return false;
            };
            pos = start + offset + fragment.len();
            anchored = true;
        }
        match &self.final_ {
            Some(final_) => match self.gap_end(value, pos, anchored) {
                Some(start) => {
                    value.len() >= start + final_.len() && value.ends_with(final_.as_str())
                }
                None => false,
            },
            None => true,
        }
    }

    fn gap_end(&self, value: &str, pos: usize, anchored: bool) -> Option<usize> {
        if self.allow_empty_gaps || !anchored {
            return Some(pos);
        }
        value[pos..].chars().next().map(|c| pos + c.len_utf8())
    }
}

/// Evaluates `(attr=initial*any*final)`.
///
/// Candidate values are normalized with the same normalizer the pattern was
/// compiled with. Assertions on binary attribute types never match.
pub struct SubstringEvaluator<S: Store> {
    node: FilterNode,
    leaf: LeafResolver<S>,
    pattern: Option<SubstringPattern>,
}

impl<S: Store> SubstringEvaluator<S> {
    /// Resolves the substring rule and compiles the pattern for `node`.
    pub fn new(
        node: &FilterNode,
        store: Arc<S>,
        registry: &SchemaRegistry,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        let FilterNode::Substring(assertion) = node else {
            return Err(DirError::InvalidFilter("expected a substring assertion"));
        };
        let leaf = LeafResolver::resolve(
            store,
            registry,
            config,
            &assertion.attribute,
            RuleUsage::Substring,
        )?;
        let pattern = if leaf.attribute.is_human_readable() {
            let fragment = |raw: &String| -> Result<String> {
                let normalized = leaf.normalize(&AttrValue::Text(raw.clone()))?;
                normalized.as_str().map(str::to_owned).ok_or_else(|| {
                    DirError::invalid_value(
                        leaf.attribute.display_name(),
                        "substring fragment normalized to a binary value",
                    )
                })
            };
            Some(SubstringPattern::new(
                assertion.initial.as_ref().map(fragment).transpose()?,
                assertion.any.iter().map(fragment).collect::<Result<Vec<_>>>()?,
                assertion.final_.as_ref().map(fragment).transpose()?,
                config.allow_empty_substring_gaps,
            ))
        } else {
            warn!(
                attribute = leaf.attribute.display_name(),
                "substring assertion on a binary attribute never matches"
            );
            None
        };
        Ok(Self {
            node: node.clone(),
            leaf,
            pattern,
        })
    }

    /// Compiled pattern; `None` for binary attribute types.
    pub fn pattern(&self) -> Option<&SubstringPattern> {
        self.pattern.as_ref()
    }

    fn matching_value<'e>(&self, entry: &'e Entry) -> Result<Option<&'e AttrValue>> {
        let Some(pattern) = &self.pattern else {
            return Ok(None);
        };
        let timer = profile_timer();
        let found = self.leaf.find_value(entry, |value| {
            let normalized = self.leaf.normalize(value)?;
            Ok(normalized.as_str().is_some_and(|text| pattern.matches(text)))
        });
        record_profile_timer(EvalProfileKind::Leaf, timer);
        found
    }
}

impl<S: Store> Evaluator<S> for SubstringEvaluator<S> {
    fn evaluate(&self, candidate: &mut Candidate, tx: &S::Txn) -> Result<Match> {
        if self.pattern.is_none() {
            return Ok(Match::no());
        }
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
        match (&self.pattern, self.node.count()) {
            (_, Some(count)) => count,
            (None, None) => 0,
            (Some(_), None) => self.leaf.cost(None, SUBSTRING_SELECTIVITY_PCT),
        }
    }

    fn describe(&self) -> String {
        let mode = match &self.pattern {
            None => "binary",
            Some(p) if p.allow_empty_gaps => "lenient",
            Some(_) => "strict",
        };
        format!(
            "{} {} rule={} indexed={} gaps={}",
            self.node.kind(),
            self.node,
            self.leaf.rule_name(),
            self.leaf.index.is_some(),
            mode
        )
    }
}
