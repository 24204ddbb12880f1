use std::sync::Arc;

use tracing::debug;

use super::{
    full_scan_cost, AndEvaluator, EmptyEvaluator, EqualityEvaluator, Evaluator, NotEvaluator,
    OrEvaluator, OrderingEvaluator, PassThroughEvaluator, PresenceEvaluator, SubstringEvaluator,
    SubtreeScopeEvaluator,
};
use crate::config::EvaluatorConfig;
use crate::filter::FilterNode;
use crate::schema::SchemaRegistry;
use crate::store::Store;
use crate::types::{DirError, Result};

/// Compiles filter trees into evaluator trees for one store and schema.
///
/// Leaves are built first and composites wrap them. Any schema resolution
/// failure aborts the whole build, so a filter that cannot be evaluated
/// correctly is never handed to the search.
pub struct EvaluatorBuilder<S: Store> {
    store: Arc<S>,
    registry: Arc<SchemaRegistry>,
    config: EvaluatorConfig,
}

impl<S: Store> EvaluatorBuilder<S> {
    /// Creates a builder.
    pub fn new(store: Arc<S>, registry: Arc<SchemaRegistry>, config: EvaluatorConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Store the evaluators read from.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Schema the evaluators resolve attribute types against.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Evaluator settings.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Compiles `node`. `tx` is only used to resolve the suffix for scope nodes.
    pub fn build(&self, node: &FilterNode, tx: &S::Txn) -> Result<Box<dyn Evaluator<S>>> {
        let evaluator = self.build_node(node, tx)?;
        debug!(
            filter = %node,
            cost = evaluator.estimated_cost(),
            "compiled filter"
        );
        Ok(evaluator)
    }

    fn build_node(&self, node: &FilterNode, tx: &S::Txn) -> Result<Box<dyn Evaluator<S>>> {
        let store = Arc::clone(&self.store);
        let registry = &*self.registry;
        let config = &self.config;
        let evaluator: Box<dyn Evaluator<S>> = match node {
            FilterNode::And(branch) if branch.children.is_empty() => Box::new(
                PassThroughEvaluator::new(node.clone(), full_scan_cost(&*store, config)),
            ),
            FilterNode::And(branch) => Box::new(AndEvaluator::new(
                node.clone(),
                self.build_children(&branch.children, tx)?,
            )),
            FilterNode::Or(branch) if branch.children.is_empty() => {
                Box::new(EmptyEvaluator::new(node.clone()))
            }
            FilterNode::Or(branch) => Box::new(OrEvaluator::new(
                node.clone(),
                self.build_children(&branch.children, tx)?,
            )),
            FilterNode::Not(branch) => {
                if branch.children.len() != 1 {
                    return Err(DirError::InvalidFilter("not requires exactly one operand"));
                }
                Box::new(NotEvaluator::new(
                    node.clone(),
                    self.build_children(&branch.children, tx)?,
                    full_scan_cost(&*store, config),
                )?)
            }
            FilterNode::Equality(_) | FilterNode::Approximate(_) => {
                Box::new(EqualityEvaluator::new(node, store, registry, config)?)
            }
            FilterNode::GreaterEq(_) | FilterNode::LessEq(_) => {
                Box::new(OrderingEvaluator::new(node, store, registry, config)?)
            }
            FilterNode::Substring(_) => {
                Box::new(SubstringEvaluator::new(node, store, registry, config)?)
            }
            FilterNode::Presence(_) => {
                Box::new(PresenceEvaluator::new(node, store, registry, config)?)
            }
            FilterNode::Scope(_) => Box::new(SubtreeScopeEvaluator::new(node, store, tx, config)?),
            FilterNode::Undefined => Box::new(EmptyEvaluator::new(node.clone())),
        };
        Ok(evaluator)
    }

    fn build_children(
        &self,
        children: &[FilterNode],
        tx: &S::Txn,
    ) -> Result<Vec<Box<dyn Evaluator<S>>>> {
        children
            .iter()
            .map(|child| self.build_node(child, tx))
            .collect()
    }
}
