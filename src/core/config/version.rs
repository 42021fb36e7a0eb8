// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compatibility level of a process, expressed as a dotted version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Dotted `major.minor.patch` version used as the process compatibility level.
///
/// Field order gives the derived `Ord` lexicographic semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperatorVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OperatorVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version the engine implements; new processes run at this level.
    pub const CURRENT: OperatorVersion = OperatorVersion::new(9, 10, 0);

    #[inline]
    pub fn is_at_least(&self, other: OperatorVersion) -> bool {
        *self >= other
    }

    #[inline]
    pub fn is_at_most(&self, other: OperatorVersion) -> bool {
        *self <= other
    }
}

impl Default for OperatorVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for OperatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for OperatorVersion {
    type Err = String;

    /// Accepts `major`, `major.minor` or `major.minor.patch`; missing parts are 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(format!("Invalid version '{s}'. Expected major.minor.patch"));
        }
        let mut numbers = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            numbers[i] = part
                .parse::<u32>()
                .map_err(|_| format!("Invalid version component '{part}' in '{s}'"))?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl Serialize for OperatorVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OperatorVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
