//! Typed attribute values attached to capabilities.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Version;
use crate::error::ParseError;

/// Capability attributes, keyed by attribute name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Capability and requirement directives, keyed by directive name.
pub type Directives = BTreeMap<String, String>;

/// A typed attribute value.
///
/// Descriptors carry plain strings; attributes named `version` (or ending in
/// `-version`) are promoted to [`AttrValue::Version`] by [`normalize_attributes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Long(i64),
    Double(f64),
    String(String),
    List(Vec<AttrValue>),
    Version(Version),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            AttrValue::Version(v) => Some(v),
            _ => None,
        }
    }

    /// Keys under which a capability set indexes this value.
    pub fn index_keys(&self) -> Vec<&str> {
        match self {
            AttrValue::String(s) => vec![s.as_str()],
            AttrValue::List(items) => items.iter().filter_map(|v| v.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Long(value)
    }
}

impl From<Version> for AttrValue {
    fn from(value: Version) -> Self {
        AttrValue::Version(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Long(v) => write!(f, "{}", v),
            AttrValue::Double(v) => write!(f, "{}", v),
            AttrValue::String(v) => write!(f, "{}", v),
            AttrValue::Version(v) => write!(f, "{}", v),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Promote version-named string attributes to typed versions.
pub fn normalize_attributes(attributes: &mut Attributes) -> Result<(), ParseError> {
    for (name, value) in attributes.iter_mut() {
        if !is_version_attribute(name) {
            continue;
        }
        if let AttrValue::String(raw) = value {
            *value = AttrValue::Version(Version::parse(raw)?);
        }
    }
    Ok(())
}

fn is_version_attribute(name: &str) -> bool {
    name == "version" || name.ends_with("-version")
}
