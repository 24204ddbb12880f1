#![forbid(unsafe_code)]

//! Schema metadata consumed by the evaluators.
//!
//! Attribute comparisons depend on the matching rule resolved for an attribute
//! type and on the subtype graph, both of which live in the [`SchemaRegistry`].

pub mod attribute;
pub mod registry;
pub mod rules;

pub use attribute::AttributeType;
pub use registry::SchemaRegistry;
pub use rules::{
    ByteComparator, Comparator, DeepTrimNormalizer, DeepTrimToLowerNormalizer, IntegerComparator,
    MatchingRule, NoOpNormalizer, Normalizer, NumericNormalizer, StringComparator, ValueError,
};

/// OIDs of the core attribute types.
pub mod oids {
    /// `objectClass`
    pub const OBJECT_CLASS: &str = "2.5.4.0";
    /// `aliasedObjectName`
    pub const ALIASED_OBJECT_NAME: &str = "2.5.4.1";
    /// `cn`
    pub const CN: &str = "2.5.4.3";
    /// `sn`
    pub const SN: &str = "2.5.4.4";
    /// `ou`
    pub const OU: &str = "2.5.4.11";
    /// `description`
    pub const DESCRIPTION: &str = "2.5.4.13";
    /// `userPassword`
    pub const USER_PASSWORD: &str = "2.5.4.35";
    /// `name`
    pub const NAME: &str = "2.5.4.41";
    /// `givenName`
    pub const GIVEN_NAME: &str = "2.5.4.42";
    /// `createTimestamp`
    pub const CREATE_TIMESTAMP: &str = "2.5.18.1";
    /// `uid`
    pub const UID: &str = "0.9.2342.19200300.100.1.1";
    /// `mail`
    pub const MAIL: &str = "0.9.2342.19200300.100.1.3";
    /// `dc`
    pub const DC: &str = "0.9.2342.19200300.100.1.25";
    /// `jpegPhoto`
    pub const JPEG_PHOTO: &str = "0.9.2342.19200300.100.1.60";
    /// `uidNumber`
    pub const UID_NUMBER: &str = "1.3.6.1.1.1.1.0";
    /// `gidNumber`
    pub const GID_NUMBER: &str = "1.3.6.1.1.1.1.1";
    /// `entryUUID`
    pub const ENTRY_UUID: &str = "1.3.6.1.1.16.4";
    /// `entryCSN`
    pub const ENTRY_CSN: &str = "1.3.6.1.4.1.4203.666.1.7";
    /// `employeeNumber`
    pub const EMPLOYEE_NUMBER: &str = "2.16.840.1.113730.3.1.3";
}
