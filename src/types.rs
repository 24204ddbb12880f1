#![forbid(unsafe_code)]

//! Identifiers and the crate-wide error type.

use std::fmt;

/// Identifier of a stored directory entry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Sentinel parent of the suffix entry; never assigned to a stored entry.
    pub const ROOT: EntryId = EntryId(0);

    /// Returns true for the [`EntryId::ROOT`] sentinel.
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntryId {
    fn from(value: u64) -> Self {
        EntryId(value)
    }
}

impl From<EntryId> for u64 {
    fn from(value: EntryId) -> Self {
        value.0
    }
}

/// Which matching rule an evaluator was trying to resolve.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RuleUsage {
    /// Equality and approximate comparisons.
    Equality,
    /// Less-or-equal and greater-or-equal comparisons.
    Ordering,
    /// Substring assertions.
    Substring,
}

impl fmt::Display for RuleUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleUsage::Equality => write!(f, "equality"),
            RuleUsage::Ordering => write!(f, "ordering"),
            RuleUsage::Substring => write!(f, "substring"),
        }
    }
}

/// Errors surfaced while building or running evaluators.
#[derive(thiserror::Error, Debug)]
pub enum DirError {
    /// I/O failure reported by a store.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The attribute reference is not known to the schema registry.
    #[error("unknown attribute type '{0}'")]
    UnknownAttribute(String),
    /// No matching rule can serve the requested comparison.
    #[error("no {usage} matching rule usable for attribute '{attribute}'")]
    NoMatchingRule {
        /// Attribute type name or OID.
        attribute: String,
        /// Comparison the rule was needed for.
        usage: RuleUsage,
    },
    /// A value could not be normalized or compared.
    #[error("invalid value for '{attribute}': {reason}")]
    InvalidValue {
        /// Attribute type name or OID.
        attribute: String,
        /// Normalizer or comparator message.
        reason: String,
    },
    /// The filter tree is structurally invalid.
    #[error("invalid filter: {0}")]
    InvalidFilter(&'static str),
    /// The requested operation is not supported by this evaluator.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    /// Backend failure other than plain I/O.
    #[error("store: {0}")]
    Store(String),
    /// The store returned inconsistent data.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl DirError {
    /// Builds an [`DirError::InvalidValue`] for `attribute`.
    pub fn invalid_value(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        DirError::InvalidValue {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised while compiling a filter rather than
    /// while evaluating a candidate.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            DirError::UnknownAttribute(_)
                | DirError::NoMatchingRule { .. }
                | DirError::InvalidFilter(_)
                | DirError::Config(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DirError>;
