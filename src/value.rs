//! The resolved program description handed to the config builder.
//!
//! The declarative source format is parsed outside this crate; the builder
//! consumes the resolved tree as [`Value`]s. Version inputs arrive in either
//! of two forms (integer fields or the string forms `"1.2.3"` and
//! `">=1.0,<2.0"`) and are normalized to [`SemVer`] and [`AbiRange`] before
//! any bytes are written.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;

/// A value from the resolved program description.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 text
    Str(String),
    /// Signed integer
    Int(i64),
    /// Ordered list of values
    List(Vec<Value>),
    /// Key/value table
    Table(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the string content, or [`None`] for other variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, or [`None`] for other variants.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the list content, or [`None`] for other variants.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the table content, or [`None`] for other variants.
    pub fn as_table(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Looks up a key in a table value. Returns [`None`] if the value is not
    /// a table or the key is absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_table()?.get(key)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// A normalized `major.minor.patch` program version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemVer {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Patch version
    pub patch: u16,
}

impl FromStr for SemVer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let invalid = || Error::Validation {
            field: "version".to_owned(),
            reason: format!("'{s}' is not a major.minor.patch version"),
        };

        let mut parts = s.split('.');
        let major = parse_component(parts.next()).ok_or_else(invalid)?;
        let minor = parse_component(parts.next()).ok_or_else(invalid)?;
        let patch = parse_component(parts.next()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(SemVer {
            major,
            minor,
            patch,
        })
    }
}

/// A half-open ABI compatibility range, `>=min,<max` over (major, minor)
/// pairs compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiRange {
    /// Inclusive lower endpoint
    pub min: (u16, u16),
    /// Exclusive upper endpoint
    pub max: (u16, u16),
}

impl AbiRange {
    /// Creates a range, rejecting endpoints that are not strictly ascending.
    /// Equal endpoints describe an empty range and are rejected too.
    pub fn new(min: (u16, u16), max: (u16, u16)) -> Result<Self, Error> {
        if min >= max {
            return Err(Error::InvalidAbiRange {
                min_major: min.0,
                min_minor: min.1,
                max_major: max.0,
                max_minor: max.1,
            });
        }

        Ok(AbiRange { min, max })
    }
}

impl FromStr for AbiRange {
    type Err = Error;

    /// Parses the `">=1.0,<2.0"` range form.
    fn from_str(s: &str) -> Result<Self, Error> {
        let invalid = || Error::Validation {
            field: "abi".to_owned(),
            reason: format!("'{s}' is not a '>=A.B,<C.D' range"),
        };

        let (min_part, max_part) = s.split_once(',').ok_or_else(invalid)?;
        let min = min_part.strip_prefix(">=").ok_or_else(invalid)?;
        let max = max_part.strip_prefix('<').ok_or_else(invalid)?;

        AbiRange::new(
            parse_pair(min).ok_or_else(invalid)?,
            parse_pair(max).ok_or_else(invalid)?,
        )
    }
}

fn parse_component(part: Option<&str>) -> Option<u16> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    part.parse().ok()
}

fn parse_pair(s: &str) -> Option<(u16, u16)> {
    let (major, minor) = s.split_once('.')?;
    Some((
        parse_component(Some(major))?,
        parse_component(Some(minor))?,
    ))
}

/// Collects the non-fatal diagnostics raised while building or verifying.
///
/// The core never writes to standard streams; callers drain the sink and
/// decide how to surface warnings.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns the warnings recorded so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether no warnings were recorded.
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_parse() {
        let version: SemVer = "1.2.3".parse().unwrap();
        assert_eq!(
            version,
            SemVer {
                major: 1,
                minor: 2,
                patch: 3
            }
        );

        assert!("1.2".parse::<SemVer>().is_err());
        assert!("1.2.3.4".parse::<SemVer>().is_err());
        assert!("1.2.x".parse::<SemVer>().is_err());
        assert!("1.2.-3".parse::<SemVer>().is_err());
        assert!("".parse::<SemVer>().is_err());
        assert!("1.2.99999".parse::<SemVer>().is_err());
    }

    #[test]
    fn abi_range_parse() {
        let range: AbiRange = ">=1.0,<2.0".parse().unwrap();
        assert_eq!(range.min, (1, 0));
        assert_eq!(range.max, (2, 0));

        assert!(">=1.0".parse::<AbiRange>().is_err());
        assert!("1.0,<2.0".parse::<AbiRange>().is_err());
        assert!(">=1.0,2.0".parse::<AbiRange>().is_err());
        assert!(">=1,<2".parse::<AbiRange>().is_err());
    }

    #[test]
    fn abi_range_must_ascend() {
        assert!(matches!(
            ">=2.0,<1.0".parse::<AbiRange>().unwrap_err(),
            Error::InvalidAbiRange { .. }
        ));
        assert!(matches!(
            ">=1.4,<1.4".parse::<AbiRange>().unwrap_err(),
            Error::InvalidAbiRange { .. }
        ));

        // minor digits compare lexicographically, not numerically as text
        assert!(AbiRange::new((1, 9), (1, 10)).is_ok());
    }

    #[test]
    fn value_accessors() {
        let mut table = BTreeMap::new();
        table.insert("id".to_owned(), Value::from("passthru"));
        table.insert("count".to_owned(), Value::from(3i64));
        let root = Value::Table(table);

        assert_eq!(root.get("id").and_then(Value::as_str), Some("passthru"));
        assert_eq!(root.get("count").and_then(Value::as_int), Some(3));
        assert!(root.get("missing").is_none());
        assert!(root.get("id").unwrap().as_int().is_none());
    }
}
