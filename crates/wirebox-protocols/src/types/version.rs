//! Module and package versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A `major.minor.micro[.qualifier]` version.
///
/// Ordering compares the numeric parts first and the qualifier lexically,
/// so `1.0.0` < `1.0.0.beta` < `1.0.1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    /// Parse a version, treating an empty string as `0.0.0`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let mut parts = trimmed.splitn(4, '.');
        let mut numeric = [0u32; 3];
        for slot in numeric.iter_mut() {
            match parts.next() {
                Some(part) => {
                    *slot = part
                        .parse()
                        .map_err(|_| ParseError::Version(input.to_string()))?;
                }
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default();
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ParseError::Version(input.to_string()));
        }

        Ok(Self {
            major: numeric[0],
            minor: numeric[1],
            micro: numeric[2],
            qualifier: qualifier.to_string(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// An interval of versions such as `[1.0,2.0)`.
///
/// A bare version (`1.2`) means "at least 1.2" with no upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub floor: Version,
    pub floor_inclusive: bool,
    pub ceiling: Option<Version>,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        let invalid = || ParseError::VersionRange(input.to_string());

        let Some(first) = trimmed.chars().next() else {
            return Err(invalid());
        };
        if first != '[' && first != '(' {
            return Ok(Self::at_least(Version::parse(trimmed)?));
        }

        let last = trimmed.chars().last().ok_or_else(invalid)?;
        if last != ']' && last != ')' {
            return Err(invalid());
        }

        let body = &trimmed[1..trimmed.len() - 1];
        let (floor, ceiling) = body.split_once(',').ok_or_else(invalid)?;
        let floor = Version::parse(floor).map_err(|_| invalid())?;
        let ceiling = Version::parse(ceiling).map_err(|_| invalid())?;
        if ceiling < floor {
            return Err(invalid());
        }

        Ok(Self {
            floor,
            floor_inclusive: first == '[',
            ceiling: Some(ceiling),
            ceiling_inclusive: last == ']',
        })
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            *version >= self.floor
        } else {
            *version > self.floor
        };
        let below_ceiling = match &self.ceiling {
            None => true,
            Some(ceiling) if self.ceiling_inclusive => version <= ceiling,
            Some(ceiling) => version < ceiling,
        };
        above_floor && below_ceiling
    }

    /// Render this range as a filter expression over `attribute`.
    pub fn to_filter(&self, attribute: &str) -> String {
        let lower = if self.floor_inclusive {
            format!("({}>={})", attribute, self.floor)
        } else {
            format!("(!({}<={}))", attribute, self.floor)
        };
        match &self.ceiling {
            None => lower,
            Some(ceiling) if self.ceiling_inclusive => {
                format!("(&{}({}<={}))", lower, attribute, ceiling)
            }
            Some(ceiling) => format!("(&{}(!({}>={})))", lower, attribute, ceiling),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
