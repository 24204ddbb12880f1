//! Attribute type registry with subtype tracking.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::attribute::AttributeType;
use super::oids;
use super::rules::MatchingRule;
use crate::types::{DirError, Result};

/// Resolves attribute references and tracks the subtype graph.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_oid: FxHashMap<String, Arc<AttributeType>>,
    by_name: FxHashMap<String, String>,
    descendants: FxHashMap<String, Vec<Arc<AttributeType>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the core directory attribute types.
    pub fn with_core_schema() -> Self {
        let mut registry = Self::new();
        for at in core_attribute_types() {
            registry
                .register(at)
                .expect("core schema definitions are consistent");
        }
        registry
    }

    /// Registers `at`. Its superior, when declared, must already be known.
    pub fn register(&mut self, mut at: AttributeType) -> Result<Arc<AttributeType>> {
        if self.by_oid.contains_key(at.oid()) {
            return Err(DirError::invalid_value(
                at.oid(),
                "attribute type already registered",
            ));
        }
        for name in at.names() {
            if self.by_name.contains_key(&name.to_ascii_lowercase()) {
                return Err(DirError::invalid_value(
                    name.clone(),
                    "attribute name already registered",
                ));
            }
        }
        let superior = match at.superior_ref() {
            Some(reference) => Some(self.lookup(reference)?),
            None => None,
        };
        if let Some(sup) = &superior {
            at.resolve_superior(sup.oid().to_owned());
        }
        let at = Arc::new(at);
        self.by_oid.insert(at.oid().to_owned(), Arc::clone(&at));
        for name in at.names() {
            self.by_name
                .insert(name.to_ascii_lowercase(), at.oid().to_owned());
        }
        let mut ancestor = superior;
        while let Some(current) = ancestor {
            self.descendants
                .entry(current.oid().to_owned())
                .or_default()
                .push(Arc::clone(&at));
            ancestor = self.superior(&current);
        }
        debug!(oid = at.oid(), name = at.display_name(), "registered attribute type");
        Ok(at)
    }

    /// Looks up an attribute type by OID or case-insensitive name.
    pub fn lookup(&self, reference: &str) -> Result<Arc<AttributeType>> {
        let reference = reference.trim();
        if let Some(at) = self.by_oid.get(reference) {
            return Ok(Arc::clone(at));
        }
        self.by_name
            .get(&reference.to_ascii_lowercase())
            .and_then(|oid| self.by_oid.get(oid))
            .cloned()
            .ok_or_else(|| DirError::UnknownAttribute(reference.to_owned()))
    }

    /// Attribute type registered under exactly `oid`.
    pub fn get(&self, oid: &str) -> Option<Arc<AttributeType>> {
        self.by_oid.get(oid).cloned()
    }

    /// Direct supertype of `at`.
    pub fn superior(&self, at: &AttributeType) -> Option<Arc<AttributeType>> {
        at.superior_ref().and_then(|oid| self.by_oid.get(oid)).cloned()
    }

    /// Every direct and indirect subtype of `at`, in registration order.
    pub fn descendants(&self, at: &AttributeType) -> &[Arc<AttributeType>] {
        self.descendants
            .get(at.oid())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true when `at` has at least one subtype.
    pub fn has_descendants(&self, at: &AttributeType) -> bool {
        !self.descendants(at).is_empty()
    }

    /// Equality rule of `at`, inherited from the nearest supertype declaring one.
    pub fn equality_rule(&self, at: &AttributeType) -> Option<Arc<MatchingRule>> {
        self.inherited(at, AttributeType::declared_equality)
    }

    /// Ordering rule of `at`, inherited from the nearest supertype declaring one.
    pub fn ordering_rule(&self, at: &AttributeType) -> Option<Arc<MatchingRule>> {
        self.inherited(at, AttributeType::declared_ordering)
    }

    /// Substring rule of `at`, inherited from the nearest supertype declaring one.
    pub fn substring_rule(&self, at: &AttributeType) -> Option<Arc<MatchingRule>> {
        self.inherited(at, AttributeType::declared_substring)
    }

    /// Number of registered attribute types.
    pub fn len(&self) -> usize {
        self.by_oid.len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_oid.is_empty()
    }

    fn inherited<F>(&self, at: &AttributeType, declared: F) -> Option<Arc<MatchingRule>>
    where
        F: Fn(&AttributeType) -> Option<&Arc<MatchingRule>>,
    {
        if let Some(rule) = declared(at) {
            return Some(Arc::clone(rule));
        }
        let mut current = self.superior(at);
        while let Some(sup) = current {
            if let Some(rule) = declared(&sup) {
                return Some(Arc::clone(rule));
            }
            current = self.superior(&sup);
        }
        None
    }
}

fn core_attribute_types() -> Vec<AttributeType> {
    vec![
        AttributeType::new(oids::OBJECT_CLASS)
            .name("objectClass")
            .equality(MatchingRule::object_identifier()),
        AttributeType::new(oids::ALIASED_OBJECT_NAME)
            .name("aliasedObjectName")
            .equality(MatchingRule::case_ignore()),
        AttributeType::new(oids::NAME)
            .name("name")
            .equality(MatchingRule::case_ignore())
            .substring(MatchingRule::case_ignore_substrings()),
        AttributeType::new(oids::CN)
            .name("cn")
            .name("commonName")
            .superior(oids::NAME),
        AttributeType::new(oids::SN)
            .name("sn")
            .name("surname")
            .superior(oids::NAME),
        AttributeType::new(oids::GIVEN_NAME)
            .name("givenName")
            .name("gn")
            .superior(oids::NAME),
        AttributeType::new(oids::OU)
            .name("ou")
            .name("organizationalUnitName")
            .superior(oids::NAME),
        AttributeType::new(oids::DC)
            .name("dc")
            .name("domainComponent")
            .equality(MatchingRule::case_ignore())
            .substring(MatchingRule::case_ignore_substrings()),
        AttributeType::new(oids::UID)
            .name("uid")
            .name("userid")
            .equality(MatchingRule::case_ignore())
            .substring(MatchingRule::case_ignore_substrings()),
        AttributeType::new(oids::MAIL)
            .name("mail")
            .equality(MatchingRule::case_ignore())
            .substring(MatchingRule::case_ignore_substrings()),
        AttributeType::new(oids::DESCRIPTION)
            .name("description")
            .equality(MatchingRule::case_ignore())
            .substring(MatchingRule::case_ignore_substrings()),
        AttributeType::new(oids::EMPLOYEE_NUMBER)
            .name("employeeNumber")
            .equality(MatchingRule::case_ignore()),
        AttributeType::new(oids::UID_NUMBER)
            .name("uidNumber")
            .equality(MatchingRule::integer())
            .ordering(MatchingRule::integer_ordering()),
        AttributeType::new(oids::GID_NUMBER)
            .name("gidNumber")
            .equality(MatchingRule::integer())
            .ordering(MatchingRule::integer_ordering()),
        AttributeType::new(oids::CREATE_TIMESTAMP)
            .name("createTimestamp")
            .equality(MatchingRule::case_exact())
            .ordering(MatchingRule::case_exact_ordering()),
        AttributeType::new(oids::USER_PASSWORD)
            .name("userPassword")
            .equality(MatchingRule::octet_string())
            .binary(),
        AttributeType::new(oids::JPEG_PHOTO)
            .name("jpegPhoto")
            .binary(),
        AttributeType::new(oids::ENTRY_UUID)
            .name("entryUUID")
            .equality(MatchingRule::case_ignore()),
        AttributeType::new(oids::ENTRY_CSN)
            .name("entryCSN")
            .equality(MatchingRule::case_exact())
            .ordering(MatchingRule::case_exact_ordering()),
    ]
}
