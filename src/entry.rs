//! Directory entries, attribute values and distinguished names.

use std::collections::BTreeMap;
use std::fmt;

use crate::schema::AttributeType;
use crate::types::{DirError, Result};

/// Raw attribute value as stored on an entry.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum AttrValue {
    /// Human-readable string value.
    Text(String),
    /// Binary value.
    Binary(Vec<u8>),
}

impl AttrValue {
    /// Returns the string payload for text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Binary(_) => None,
        }
    }

    /// Returns the raw bytes of the value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttrValue::Text(s) => s.as_bytes(),
            AttrValue::Binary(b) => b,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{s}"),
            AttrValue::Binary(bytes) => {
                for b in bytes {
                    write!(f, "\\{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(value: Vec<u8>) -> Self {
        AttrValue::Binary(value)
    }
}

/// All values an entry holds for one attribute type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    oid: String,
    values: Vec<AttrValue>,
}

impl Attribute {
    /// Creates an empty attribute for `oid`.
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            values: Vec::new(),
        }
    }

    /// OID of the attribute type.
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Stored values in insertion order.
    pub fn values(&self) -> &[AttrValue] {
        &self.values
    }

    /// Raw containment test, no normalization.
    pub fn contains(&self, value: &AttrValue) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Adds `value` unless an identical raw value is already present.
    pub fn push(&mut self, value: AttrValue) {
        if !self.contains(&value) {
            self.values.push(value);
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no value is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A fully materialized directory entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<String, Attribute>,
}

impl Entry {
    /// Creates an entry with no attributes.
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    /// Distinguished name of the entry.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Attribute stored under exactly `oid` (no subtype lookup).
    pub fn get(&self, oid: &str) -> Option<&Attribute> {
        self.attributes.get(oid).filter(|attr| !attr.is_empty())
    }

    /// Returns true if the entry holds at least one value under `oid`.
    pub fn has(&self, oid: &str) -> bool {
        self.get(oid).is_some()
    }

    /// Iterates the stored attributes ordered by OID.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values().filter(|attr| !attr.is_empty())
    }

    /// Adds values under `attr`.
    pub fn add<I, V>(&mut self, attr: &AttributeType, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttrValue>,
    {
        let slot = self
            .attributes
            .entry(attr.oid().to_owned())
            .or_insert_with(|| Attribute::new(attr.oid()));
        for value in values {
            slot.push(value.into());
        }
    }

    /// Builder form of [`Entry::add`].
    pub fn with<I, V>(mut self, attr: &AttributeType, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttrValue>,
    {
        self.add(attr, values);
        self
    }

    /// Removes every value stored under `oid`.
    pub fn remove(&mut self, oid: &str) -> Option<Attribute> {
        self.attributes.remove(oid)
    }
}

/// One relative distinguished name component, e.g. `cn=bob`.
#[derive(Clone, Debug)]
pub struct Rdn {
    raw_attr: String,
    raw_value: String,
    attr: String,
    value: String,
}

impl Rdn {
    /// Parses `type=value`. The value may carry backslash escapes, either
    /// `\c` for a literal character or `\hh` for one UTF-8 byte.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = trim_unescaped(raw);
        let (attr, value) = raw
            .split_once('=')
            .ok_or_else(|| DirError::invalid_value("dn", format!("rdn '{raw}' lacks '='")))?;
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(DirError::invalid_value(
                "dn",
                format!("rdn '{raw}' has an empty attribute type"),
            ));
        }
        let value = unescape_value(trim_unescaped(value))?;
        Ok(Self {
            raw_attr: attr.to_owned(),
            attr: attr.to_ascii_lowercase(),
            value: fold_value(&value),
            raw_value: value,
        })
    }

    /// Attribute type as written, lowercased.
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Value as written, with escapes resolved.
    pub fn value(&self) -> &str {
        &self.raw_value
    }

    /// Normalized value: trimmed, inner whitespace collapsed, lowercased.
    pub fn normalized_value(&self) -> &str {
        &self.value
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attr == other.attr && self.value == other.value
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = String::with_capacity(self.raw_value.len());
        push_escaped(&mut value, &self.raw_value);
        write!(f, "{}={}", self.raw_attr, value)
    }
}

fn fold_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for word in value.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Trims surrounding whitespace but keeps a trailing space that is escaped.
fn trim_unescaped(raw: &str) -> &str {
    let start = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    let end = start + trimmed.len();
    let backslashes = trimmed.bytes().rev().take_while(|&b| b == b'\\').count();
    match raw[end..].chars().next() {
        Some(space) if backslashes % 2 == 1 => &raw[start..end + space.len_utf8()],
        _ => trimmed,
    }
}

fn unescape_value(raw: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(ch) = chars.next() {
        let literal = if ch == '\\' {
            let next = chars.next().ok_or_else(|| {
                DirError::invalid_value("dn", format!("value '{raw}' ends with a bare '\\'"))
            })?;
            let hex = next
                .to_digit(16)
                .zip(chars.peek().and_then(|lo| lo.to_digit(16)));
            if let Some((hi, lo)) = hex {
                chars.next();
                bytes.push((hi * 16 + lo) as u8);
                continue;
            }
            next
        } else {
            ch
        };
        bytes.extend_from_slice(literal.encode_utf8(&mut buf).as_bytes());
    }
    String::from_utf8(bytes)
        .map_err(|_| DirError::invalid_value("dn", format!("value '{raw}' is not valid UTF-8")))
}

/// Appends `value` with every DN special character backslash-escaped.
fn push_escaped(out: &mut String, value: &str) {
    let last = value.chars().count().saturating_sub(1);
    for (idx, ch) in value.chars().enumerate() {
        let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (ch == ' ' && (idx == 0 || idx == last))
            || (ch == '#' && idx == 0);
        if special {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// Distinguished name, stored leaf-first as written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The empty name (root DSE).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a comma separated DN. A backslash escapes the next character,
    /// so `\,` keeps a comma inside a value.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::root());
        }
        let mut rdns = Vec::new();
        let mut current = String::new();
        let mut escaped = false;
        for ch in raw.chars() {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' => {
                    current.push(ch);
                    escaped = true;
                }
                ',' => {
                    rdns.push(Rdn::parse(&current)?);
                    current.clear();
                }
                _ => current.push(ch),
            }
        }
        rdns.push(Rdn::parse(&current)?);
        Ok(Self { rdns })
    }

    /// Number of RDN components.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Returns true for the empty name.
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Leaf-most component.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Name of the immediate parent.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Self {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// Returns a child name `rdn,self`.
    pub fn child(&self, rdn: &str) -> Result<Dn> {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::parse(rdn)?);
        rdns.extend(self.rdns.iter().cloned());
        Ok(Self { rdns })
    }

    /// Canonical string form used as a lookup key. Values are escaped, so
    /// two names differing in structure never share a key.
    pub fn normalized(&self) -> String {
        let mut out = String::new();
        for (idx, rdn) in self.rdns.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(&rdn.attr);
            out.push('=');
            push_escaped(&mut out, &rdn.value);
        }
        out
    }

    /// Syntactic subtree test: true when `base` is a suffix of `self`,
    /// including when both names are equal.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        if base.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - base.rdns.len();
        self.rdns[offset..] == base.rdns[..]
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, rdn) in self.rdns.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}
