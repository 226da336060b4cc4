//! Compute capability identifiers.
//!
//! A capability's canonical text form is `"major.minor"` or
//! `"major.minor+PTX"`. The numeric code (`"89"`, `"120"`) is derived on
//! demand when composing flags and is never stored.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArchError, Result};

const PTX_SUFFIX: &str = "+PTX";

/// A `major.minor` hardware generation, without codegen annotations.
///
/// Extension targets declare eligibility in terms of families, so `8.0` and
/// `8.0+PTX` both belong to family `8.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityFamily {
    pub major: u32,
    pub minor: u32,
}

impl CapabilityFamily {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Numeric code used in codegen directives (`8.9` → `"89"`).
    pub fn numeric_code(&self) -> String {
        format!("{}{}", self.major, self.minor)
    }
}

impl fmt::Display for CapabilityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for CapabilityFamily {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = parse_major_minor(s)?;
        Ok(Self::new(major, minor))
    }
}

impl TryFrom<String> for CapabilityFamily {
    type Error = ArchError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CapabilityFamily> for String {
    fn from(family: CapabilityFamily) -> Self {
        family.to_string()
    }
}

/// A GPU compute capability, optionally marked PTX-forward-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
    /// Also embed PTX for this architecture so newer devices can JIT it.
    pub ptx: bool,
}

impl ComputeCapability {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            ptx: false,
        }
    }

    pub const fn with_ptx(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            ptx: true,
        }
    }

    pub fn family(&self) -> CapabilityFamily {
        CapabilityFamily::new(self.major, self.minor)
    }

    pub fn numeric_code(&self) -> String {
        self.family().numeric_code()
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.ptx {
            f.write_str(PTX_SUFFIX)?;
        }
        Ok(())
    }
}

impl FromStr for ComputeCapability {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let split = token.len().checked_sub(PTX_SUFFIX.len());
        let (base, ptx) = match split {
            Some(at)
                if token.is_char_boundary(at)
                    && token[at..].eq_ignore_ascii_case(PTX_SUFFIX) =>
            {
                (&token[..at], true)
            }
            _ => (token, false),
        };
        let (major, minor) = parse_major_minor(base).map_err(|_| invalid(s))?;
        Ok(Self { major, minor, ptx })
    }
}

fn parse_major_minor(s: &str) -> Result<(u32, u32)> {
    let (major, minor) = s.trim().split_once('.').ok_or_else(|| invalid(s))?;
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(major) || !all_digits(minor) {
        return Err(invalid(s));
    }
    let major = major.parse().map_err(|_| invalid(s))?;
    let minor = minor.parse().map_err(|_| invalid(s))?;
    Ok((major, minor))
}

fn invalid(token: &str) -> ArchError {
    ArchError::InvalidCapability {
        token: token.trim().to_string(),
    }
}

/// The deduplicated, totally ordered set of capabilities a build targets.
///
/// Iteration order (major, minor, then PTX) is what keeps flag composition
/// reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    inner: BTreeSet<ComputeCapability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of tokens separated by whitespace and/or semicolons.
    pub fn parse_list(list: &str) -> Result<Self> {
        list.replace(';', " ")
            .split_whitespace()
            .map(str::parse)
            .collect()
    }

    pub fn insert(&mut self, capability: ComputeCapability) -> bool {
        self.inner.insert(capability)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComputeCapability> {
        self.inner.iter()
    }

    pub fn contains(&self, capability: &ComputeCapability) -> bool {
        self.inner.contains(capability)
    }

    /// Whether any member belongs to `family`, with or without PTX.
    pub fn has_family(&self, family: CapabilityFamily) -> bool {
        self.inner.iter().any(|c| c.family() == family)
    }

    pub fn families(&self) -> BTreeSet<CapabilityFamily> {
        self.inner.iter().map(ComputeCapability::family).collect()
    }
}

impl FromIterator<ComputeCapability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = ComputeCapability>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CapabilitySet {
    type Item = &'a ComputeCapability;
    type IntoIter = std::collections::btree_set::Iter<'a, ComputeCapability>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for capability in &self.inner {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{capability}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_ptx() {
        let cc: ComputeCapability = "8.9".parse().unwrap();
        assert_eq!(cc, ComputeCapability::new(8, 9));
        let cc: ComputeCapability = "9.0+PTX".parse().unwrap();
        assert_eq!(cc, ComputeCapability::with_ptx(9, 0));
        let cc: ComputeCapability = "12.0+ptx".parse().unwrap();
        assert!(cc.ptx);
        assert_eq!(cc.numeric_code(), "120");
    }

    #[test]
    fn reject_malformed_tokens() {
        for bad in ["", "8", "8.", ".9", "sm_80", "8.0+SASS", "8.x", "-8.0"] {
            assert!(
                matches!(
                    bad.parse::<ComputeCapability>(),
                    Err(ArchError::InvalidCapability { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_canonical_form() {
        assert_eq!(ComputeCapability::new(8, 0).to_string(), "8.0");
        assert_eq!(ComputeCapability::with_ptx(12, 0).to_string(), "12.0+PTX");
        assert_eq!(CapabilityFamily::new(8, 9).to_string(), "8.9");
    }

    #[test]
    fn parse_list_accepts_spaces_and_semicolons() {
        let set = CapabilitySet::parse_list("8.0;8.9  9.0+PTX;\t12.0").unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.contains(&ComputeCapability::with_ptx(9, 0)));
        assert_eq!(set.to_string(), "8.0 8.9 9.0+PTX 12.0");
    }

    #[test]
    fn set_orders_numerically_not_lexically() {
        let set = CapabilitySet::parse_list("12.0 9.0 8.0").unwrap();
        let order: Vec<String> = set.iter().map(ToString::to_string).collect();
        assert_eq!(order, ["8.0", "9.0", "12.0"]);
    }

    #[test]
    fn family_matching_ignores_ptx() {
        let set = CapabilitySet::parse_list("8.0+PTX").unwrap();
        assert!(set.has_family(CapabilityFamily::new(8, 0)));
        assert!(!set.has_family(CapabilityFamily::new(8, 9)));
    }

    #[test]
    fn family_converts_from_string() {
        let family = CapabilityFamily::try_from("12.0".to_string()).unwrap();
        assert_eq!(family, CapabilityFamily::new(12, 0));
        assert_eq!(String::from(family), "12.0");
        assert!(CapabilityFamily::try_from("12.0+PTX".to_string()).is_err());
    }
}
