//! Schema-aware search filter evaluation for embedded directory stores.
//!
//! A parsed [`FilterNode`] tree is compiled once per search by an
//! [`EvaluatorBuilder`] into a tree of [`Evaluator`]s, which then decides for
//! each candidate entry whether it satisfies the filter. Comparisons follow
//! the matching rules of the attribute types in a [`SchemaRegistry`],
//! including subtype fallback. Candidates are read through the [`Store`]
//! capability and its indices.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dirfilter::{
//!     Candidate, Dn, Entry, EvaluatorBuilder, EvaluatorConfig, FilterNode, MemStore,
//!     SchemaRegistry,
//! };
//!
//! # fn main() -> dirfilter::Result<()> {
//! let registry = Arc::new(SchemaRegistry::with_core_schema());
//! let store = Arc::new(MemStore::new());
//! let cn = registry.lookup("cn")?;
//! store.add(Entry::new(Dn::parse("dc=example")?))?;
//! let bob = store.add(Entry::new(Dn::parse("cn=bob,dc=example")?).with(&cn, ["bob"]))?;
//!
//! let builder = EvaluatorBuilder::new(Arc::clone(&store), registry, EvaluatorConfig::default());
//! let tx = store.begin_read();
//! let filter = builder.build(&FilterNode::equality("cn", "Bob"), &tx)?;
//! assert!(filter.evaluate(&mut Candidate::new(bob), &tx)?.matched());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod entry;
pub mod eval;
pub mod filter;
pub mod profile;
pub mod schema;
pub mod store;
pub mod types;

pub use config::{ConfigError, EvaluatorConfig};
pub use entry::{AttrValue, Attribute, Dn, Entry, Rdn};
pub use eval::{
    AndEvaluator, Bound, Candidate, EmptyEvaluator, EqualityEvaluator, Evaluator,
    EvaluatorBuilder, Match, NotEvaluator, OrEvaluator, OrderingEvaluator, PassThroughEvaluator,
    PresenceEvaluator, SubstringEvaluator, SubstringPattern, SubtreeScopeEvaluator,
};
pub use filter::{AliasDerefMode, FilterNode};
pub use schema::{AttributeType, MatchingRule, SchemaRegistry};
pub use store::{AliasCache, IndexHandle, MemStore, MemTxn, Store};
pub use types::{DirError, EntryId, Result, RuleUsage};
