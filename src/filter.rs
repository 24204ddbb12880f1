//! Read-only search filter tree consumed by the evaluators.
//!
//! Parsing filter strings is the caller's job; this module only models the
//! parsed tree. Nodes may carry a `count` annotation written by an upstream
//! optimizer, which the conjunction ordering uses as its scan-cost estimate.

use std::fmt;

use crate::entry::{AttrValue, Dn};
use crate::types::EntryId;

/// Alias dereferencing policy of a search request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AliasDerefMode {
    /// Aliases are returned as plain entries.
    #[default]
    NeverDerefAliases,
    /// Aliases below the base are dereferenced during the search.
    DerefInSearching,
    /// Only the search base is dereferenced.
    DerefFindingBaseObj,
    /// Aliases are dereferenced everywhere.
    DerefAlways,
}

impl AliasDerefMode {
    /// Whether aliases met while searching the scope are dereferenced.
    pub fn is_deref_in_searching(self) -> bool {
        matches!(
            self,
            AliasDerefMode::DerefInSearching | AliasDerefMode::DerefAlways
        )
    }
}

impl fmt::Display for AliasDerefMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AliasDerefMode::NeverDerefAliases => "never",
            AliasDerefMode::DerefInSearching => "searching",
            AliasDerefMode::DerefFindingBaseObj => "finding",
            AliasDerefMode::DerefAlways => "always",
        };
        write!(f, "{name}")
    }
}

/// `attribute op value` assertion shared by equality, approximate and ordering nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionNode {
    /// Attribute reference (name or OID).
    pub attribute: String,
    /// Asserted value.
    pub value: AttrValue,
    /// Optimizer estimate of matching candidates.
    pub count: Option<u64>,
}

/// `attribute=initial*any*...*final` assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstringNode {
    /// Attribute reference (name or OID).
    pub attribute: String,
    /// Fragment the value must start with.
    pub initial: Option<String>,
    /// Fragments that must appear in order.
    pub any: Vec<String>,
    /// Fragment the value must end with.
    pub final_: Option<String>,
    /// Optimizer estimate of matching candidates.
    pub count: Option<u64>,
}

/// `attribute=*` assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceNode {
    /// Attribute reference (name or OID).
    pub attribute: String,
    /// Optimizer estimate of matching candidates.
    pub count: Option<u64>,
}

/// Subtree search scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeNode {
    /// Identifier of the search base entry.
    pub base_id: EntryId,
    /// Name of the search base entry.
    pub base_dn: Dn,
    /// Alias dereferencing policy.
    pub deref: AliasDerefMode,
    /// Optimizer estimate of entries in scope.
    pub count: Option<u64>,
}

/// Children of a logical operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNode {
    /// Operands in filter-text order.
    pub children: Vec<FilterNode>,
    /// Optimizer estimate of matching candidates.
    pub count: Option<u64>,
}

/// Parsed filter expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterNode {
    /// Conjunction.
    And(BranchNode),
    /// Disjunction.
    Or(BranchNode),
    /// Negation of exactly one child.
    Not(BranchNode),
    /// `(attr=value)`
    Equality(AssertionNode),
    /// `(attr~=value)`
    Approximate(AssertionNode),
    /// `(attr>=value)`
    GreaterEq(AssertionNode),
    /// `(attr<=value)`
    LessEq(AssertionNode),
    /// `(attr=ini*any*fin)`
    Substring(SubstringNode),
    /// `(attr=*)`
    Presence(PresenceNode),
    /// Subtree scope constraint.
    Scope(ScopeNode),
    /// Unrecognized or unsupported element.
    Undefined,
}

impl FilterNode {
    /// `(&...)`
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::And(BranchNode {
            children,
            count: None,
        })
    }

    /// `(|...)`
    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Or(BranchNode {
            children,
            count: None,
        })
    }

    /// `(!child)`
    pub fn not(child: FilterNode) -> Self {
        FilterNode::Not(BranchNode {
            children: vec![child],
            count: None,
        })
    }

    /// `(attr=value)`
    pub fn equality(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        FilterNode::Equality(AssertionNode::new(attribute, value))
    }

    /// `(attr~=value)`
    pub fn approximate(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        FilterNode::Approximate(AssertionNode::new(attribute, value))
    }

    /// `(attr>=value)`
    pub fn greater_eq(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        FilterNode::GreaterEq(AssertionNode::new(attribute, value))
    }

    /// `(attr<=value)`
    pub fn less_eq(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        FilterNode::LessEq(AssertionNode::new(attribute, value))
    }

    /// `(attr=initial*any*final)`
    pub fn substring(
        attribute: impl Into<String>,
        initial: Option<&str>,
        any: &[&str],
        final_: Option<&str>,
    ) -> Self {
        FilterNode::Substring(SubstringNode {
            attribute: attribute.into(),
            initial: initial.map(str::to_owned),
            any: any.iter().map(|s| (*s).to_owned()).collect(),
            final_: final_.map(str::to_owned),
            count: None,
        })
    }

    /// `(attr=*)`
    pub fn present(attribute: impl Into<String>) -> Self {
        FilterNode::Presence(PresenceNode {
            attribute: attribute.into(),
            count: None,
        })
    }

    /// Subtree scope rooted at `base_id` / `base_dn`.
    pub fn subtree(base_id: EntryId, base_dn: Dn, deref: AliasDerefMode) -> Self {
        FilterNode::Scope(ScopeNode {
            base_id,
            base_dn,
            deref,
            count: None,
        })
    }

    /// Sets the optimizer count annotation.
    pub fn with_count(mut self, count: u64) -> Self {
        match &mut self {
            FilterNode::And(n) | FilterNode::Or(n) | FilterNode::Not(n) => n.count = Some(count),
            FilterNode::Equality(n)
            | FilterNode::Approximate(n)
            | FilterNode::GreaterEq(n)
            | FilterNode::LessEq(n) => n.count = Some(count),
            FilterNode::Substring(n) => n.count = Some(count),
            FilterNode::Presence(n) => n.count = Some(count),
            FilterNode::Scope(n) => n.count = Some(count),
            FilterNode::Undefined => {}
        }
        self
    }

    /// Optimizer count annotation, if any.
    pub fn count(&self) -> Option<u64> {
        match self {
            FilterNode::And(n) | FilterNode::Or(n) | FilterNode::Not(n) => n.count,
            FilterNode::Equality(n)
            | FilterNode::Approximate(n)
            | FilterNode::GreaterEq(n)
            | FilterNode::LessEq(n) => n.count,
            FilterNode::Substring(n) => n.count,
            FilterNode::Presence(n) => n.count,
            FilterNode::Scope(n) => n.count,
            FilterNode::Undefined => None,
        }
    }

    /// Attribute reference of a leaf node.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            FilterNode::Equality(n)
            | FilterNode::Approximate(n)
            | FilterNode::GreaterEq(n)
            | FilterNode::LessEq(n) => Some(&n.attribute),
            FilterNode::Substring(n) => Some(&n.attribute),
            FilterNode::Presence(n) => Some(&n.attribute),
            _ => None,
        }
    }

    /// Variant name used by diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterNode::And(_) => "And",
            FilterNode::Or(_) => "Or",
            FilterNode::Not(_) => "Not",
            FilterNode::Equality(_) => "Equality",
            FilterNode::Approximate(_) => "Approximate",
            FilterNode::GreaterEq(_) => "GreaterEq",
            FilterNode::LessEq(_) => "LessEq",
            FilterNode::Substring(_) => "Substring",
            FilterNode::Presence(_) => "Presence",
            FilterNode::Scope(_) => "SubtreeScope",
            FilterNode::Undefined => "Undefined",
        }
    }
}

impl AssertionNode {
    /// Creates an unannotated assertion.
    pub fn new(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            count: None,
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        match ch {
            '*' => write!(f, "\\2a")?,
            '(' => write!(f, "\\28")?,
            ')' => write!(f, "\\29")?,
            '\\' => write!(f, "\\5c")?,
            '\0' => write!(f, "\\00")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &AttrValue) -> fmt::Result {
    match value {
        AttrValue::Text(text) => write_escaped(f, text),
        AttrValue::Binary(_) => write!(f, "{value}"),
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterNode::And(n) | FilterNode::Or(n) | FilterNode::Not(n) => {
                let op = match self {
                    FilterNode::And(_) => '&',
                    FilterNode::Or(_) => '|',
                    _ => '!',
                };
                write!(f, "({op}")?;
                for child in &n.children {
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            FilterNode::Equality(n) => {
                write!(f, "({}=", n.attribute)?;
                write_value(f, &n.value)?;
                write!(f, ")")
            }
            FilterNode::Approximate(n) => {
                write!(f, "({}~=", n.attribute)?;
                write_value(f, &n.value)?;
                write!(f, ")")
            }
            FilterNode::GreaterEq(n) => {
                write!(f, "({}>=", n.attribute)?;
                write_value(f, &n.value)?;
                write!(f, ")")
            }
            FilterNode::LessEq(n) => {
                write!(f, "({}<=", n.attribute)?;
                write_value(f, &n.value)?;
                write!(f, ")")
            }
            FilterNode::Substring(n) => {
                write!(f, "({}=", n.attribute)?;
                if let Some(initial) = &n.initial {
                    write_escaped(f, initial)?;
                }
                write!(f, "*")?;
                for fragment in &n.any {
                    write_escaped(f, fragment)?;
                    write!(f, "*")?;
                }
                if let Some(final_) = &n.final_ {
                    write_escaped(f, final_)?;
                }
                write!(f, ")")
            }
            FilterNode::Presence(n) => write!(f, "({}=*)", n.attribute),
            FilterNode::Scope(n) => write!(
                f,
                "(scope=subtree base=\"{}\" id={} deref={})",
                n.base_dn, n.base_id, n.deref
            ),
            FilterNode::Undefined => write!(f, "(?undefined)"),
        }
    }
}
