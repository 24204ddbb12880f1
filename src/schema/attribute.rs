//! Attribute type descriptors.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::rules::MatchingRule;

/// Schema descriptor for one kind of attribute value.
#[derive(Clone, Debug)]
pub struct AttributeType {
    oid: String,
    names: SmallVec<[String; 2]>,
    superior: Option<String>,
    equality: Option<Arc<MatchingRule>>,
    ordering: Option<Arc<MatchingRule>>,
    substring: Option<Arc<MatchingRule>>,
    human_readable: bool,
}

impl AttributeType {
    /// Starts a human-readable attribute type with no rules.
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            names: SmallVec::new(),
            superior: None,
            equality: None,
            ordering: None,
            substring: None,
            human_readable: true,
        }
    }

    /// Adds a short name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Declares the direct supertype by OID or name.
    pub fn superior(mut self, superior: impl Into<String>) -> Self {
        self.superior = Some(superior.into());
        self
    }

    /// Declares the equality rule.
    pub fn equality(mut self, rule: Arc<MatchingRule>) -> Self {
        self.equality = Some(rule);
        self
    }

    /// Declares the ordering rule.
    pub fn ordering(mut self, rule: Arc<MatchingRule>) -> Self {
        self.ordering = Some(rule);
        self
    }

    /// Declares the substring rule.
    pub fn substring(mut self, rule: Arc<MatchingRule>) -> Self {
        self.substring = Some(rule);
        self
    }

    /// Marks the syntax as binary.
    pub fn binary(mut self) -> Self {
        self.human_readable = false;
        self
    }

    /// Numeric OID.
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// All short names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// First short name, or the OID when the type is unnamed.
    pub fn display_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    /// Declared supertype reference as written.
    pub fn superior_ref(&self) -> Option<&str> {
        self.superior.as_deref()
    }

    /// Equality rule declared on this type only.
    pub fn declared_equality(&self) -> Option<&Arc<MatchingRule>> {
        self.equality.as_ref()
    }

    /// Ordering rule declared on this type only.
    pub fn declared_ordering(&self) -> Option<&Arc<MatchingRule>> {
        self.ordering.as_ref()
    }

    /// Substring rule declared on this type only.
    pub fn declared_substring(&self) -> Option<&Arc<MatchingRule>> {
        self.substring.as_ref()
    }

    /// Whether the syntax is human readable.
    pub fn is_human_readable(&self) -> bool {
        self.human_readable
    }

    pub(crate) fn resolve_superior(&mut self, oid: String) {
        self.superior = Some(oid);
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for AttributeType {}
