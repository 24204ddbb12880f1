//! Normalizers, comparators and the matching rules that pair them.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::entry::AttrValue;

/// Failure reported by a normalizer or comparator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(pub String);

/// Canonicalizes raw values for rule-consistent comparison.
pub trait Normalizer: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;
    /// Returns the canonical form of `value`.
    fn normalize(&self, value: &AttrValue) -> Result<AttrValue, ValueError>;
}

/// Orders canonical values.
pub trait Comparator: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;
    /// Compares two already-normalized values.
    fn compare(&self, left: &AttrValue, right: &AttrValue) -> Result<Ordering, ValueError>;
}

/// Leaves values untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNormalizer;

impl Normalizer for NoOpNormalizer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn normalize(&self, value: &AttrValue) -> Result<AttrValue, ValueError> {
        Ok(value.clone())
    }
}

/// Trims, collapses inner whitespace runs and lowercases.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepTrimToLowerNormalizer;

impl Normalizer for DeepTrimToLowerNormalizer {
    fn name(&self) -> &'static str {
        "deepTrimToLower"
    }

    fn normalize(&self, value: &AttrValue) -> Result<AttrValue, ValueError> {
        let text = expect_text(value)?;
        Ok(AttrValue::Text(deep_trim(text, true)))
    }
}

/// Trims and collapses inner whitespace runs, preserving case.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepTrimNormalizer;

impl Normalizer for DeepTrimNormalizer {
    fn name(&self) -> &'static str {
        "deepTrim"
    }

    fn normalize(&self, value: &AttrValue) -> Result<AttrValue, ValueError> {
        let text = expect_text(value)?;
        Ok(AttrValue::Text(deep_trim(text, false)))
    }
}

/// Canonical decimal integers: no whitespace, no leading zeros, no `-0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericNormalizer;

impl Normalizer for NumericNormalizer {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn normalize(&self, value: &AttrValue) -> Result<AttrValue, ValueError> {
        let text = expect_text(value)?;
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (negative, digits) = match compact.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, compact.strip_prefix('+').unwrap_or(&compact)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValueError(format!("'{text}' is not an integer")));
        }
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            return Ok(AttrValue::Text("0".to_owned()));
        }
        let mut out = String::with_capacity(trimmed.len() + 1);
        if negative {
            out.push('-');
        }
        out.push_str(trimmed);
        Ok(AttrValue::Text(out))
    }
}

fn expect_text(value: &AttrValue) -> Result<&str, ValueError> {
    value
        .as_str()
        .ok_or_else(|| ValueError("binary value where a string was expected".to_owned()))
}

fn deep_trim(text: &str, lower: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        if lower {
            out.extend(word.chars().flat_map(char::to_lowercase));
        } else {
            out.push_str(word);
        }
    }
    out
}

/// Lexicographic comparison of string values.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringComparator;

impl Comparator for StringComparator {
    fn name(&self) -> &'static str {
        "string"
    }

    fn compare(&self, left: &AttrValue, right: &AttrValue) -> Result<Ordering, ValueError> {
        match (left.as_str(), right.as_str()) {
            (Some(l), Some(r)) => Ok(l.cmp(r)),
            _ => Ok(left.as_bytes().cmp(right.as_bytes())),
        }
    }
}

/// Octet-wise comparison.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteComparator;

impl Comparator for ByteComparator {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn compare(&self, left: &AttrValue, right: &AttrValue) -> Result<Ordering, ValueError> {
        Ok(left.as_bytes().cmp(right.as_bytes()))
    }
}

/// Numeric comparison of canonical decimal integers of any length.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerComparator;

impl Comparator for IntegerComparator {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn compare(&self, left: &AttrValue, right: &AttrValue) -> Result<Ordering, ValueError> {
        let l = expect_text(left)?;
        let r = expect_text(right)?;
        let (l_neg, l_digits) = split_sign(l)?;
        let (r_neg, r_digits) = split_sign(r)?;
        let magnitude = l_digits
            .len()
            .cmp(&r_digits.len())
            .then_with(|| l_digits.cmp(r_digits));
        Ok(match (l_neg, r_neg) {
            (false, false) => magnitude,
            (true, true) => magnitude.reverse(),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        })
    }
}

fn split_sign(text: &str) -> Result<(bool, &str), ValueError> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValueError(format!("'{text}' is not a canonical integer")));
    }
    let digits = digits.trim_start_matches('0');
    Ok((negative && !digits.is_empty(), digits))
}

/// A (normalizer, comparator) pair identified by OID.
#[derive(Clone, Debug)]
pub struct MatchingRule {
    oid: &'static str,
    name: &'static str,
    normalizer: Arc<dyn Normalizer>,
    comparator: Arc<dyn Comparator>,
}

impl MatchingRule {
    /// Creates a rule from its parts.
    pub fn new(
        oid: &'static str,
        name: &'static str,
        normalizer: Arc<dyn Normalizer>,
        comparator: Arc<dyn Comparator>,
    ) -> Self {
        Self {
            oid,
            name,
            normalizer,
            comparator,
        }
    }

    /// Rule OID.
    pub fn oid(&self) -> &'static str {
        self.oid
    }

    /// Rule name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Normalizer applied before comparison.
    pub fn normalizer(&self) -> &Arc<dyn Normalizer> {
        &self.normalizer
    }

    /// Comparator over normalized values.
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    /// `caseIgnoreMatch` (2.5.13.2).
    pub fn case_ignore() -> Arc<Self> {
        Self::shared("2.5.13.2", "caseIgnoreMatch", DeepTrimToLowerNormalizer, StringComparator)
    }

    /// `caseIgnoreOrderingMatch` (2.5.13.3).
    pub fn case_ignore_ordering() -> Arc<Self> {
        Self::shared(
            "2.5.13.3",
            "caseIgnoreOrderingMatch",
            DeepTrimToLowerNormalizer,
            StringComparator,
        )
    }

    /// `caseIgnoreSubstringsMatch` (2.5.13.4).
    pub fn case_ignore_substrings() -> Arc<Self> {
        Self::shared(
            "2.5.13.4",
            "caseIgnoreSubstringsMatch",
            DeepTrimToLowerNormalizer,
            StringComparator,
        )
    }

    /// `caseExactMatch` (2.5.13.5).
    pub fn case_exact() -> Arc<Self> {
        Self::shared("2.5.13.5", "caseExactMatch", DeepTrimNormalizer, StringComparator)
    }

    /// `caseExactOrderingMatch` (2.5.13.6).
    pub fn case_exact_ordering() -> Arc<Self> {
        Self::shared(
            "2.5.13.6",
            "caseExactOrderingMatch",
            DeepTrimNormalizer,
            StringComparator,
        )
    }

    /// `caseExactSubstringsMatch` (2.5.13.7).
    pub fn case_exact_substrings() -> Arc<Self> {
        Self::shared(
            "2.5.13.7",
            "caseExactSubstringsMatch",
            DeepTrimNormalizer,
            StringComparator,
        )
    }

    /// `objectIdentifierMatch` (2.5.13.0).
    pub fn object_identifier() -> Arc<Self> {
        Self::shared(
            "2.5.13.0",
            "objectIdentifierMatch",
            DeepTrimToLowerNormalizer,
            StringComparator,
        )
    }

    /// `integerMatch` (2.5.13.14).
    pub fn integer() -> Arc<Self> {
        Self::shared("2.5.13.14", "integerMatch", NumericNormalizer, IntegerComparator)
    }

    /// `integerOrderingMatch` (2.5.13.15).
    pub fn integer_ordering() -> Arc<Self> {
        Self::shared(
            "2.5.13.15",
            "integerOrderingMatch",
            NumericNormalizer,
            IntegerComparator,
        )
    }

    /// `octetStringMatch` (2.5.13.17).
    pub fn octet_string() -> Arc<Self> {
        Self::shared("2.5.13.17", "octetStringMatch", NoOpNormalizer, ByteComparator)
    }

    fn shared(
        oid: &'static str,
        name: &'static str,
        normalizer: impl Normalizer + 'static,
        comparator: impl Comparator + 'static,
    ) -> Arc<Self> {
        Arc::new(Self::new(oid, name, Arc::new(normalizer), Arc::new(comparator)))
    }
}

impl fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
