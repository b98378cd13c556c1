use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Policy for a key repeating within one raw record load.
///
/// Whether repeated keys overwrite or reject is an explicit configuration
/// choice, never inferred: integrity-critical loads default to `Reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Abort the load on the first repeated key.
    Reject,
    /// Later rows silently supersede earlier rows with the same key.
    Overwrite,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::Reject
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(format!("Invalid duplicate policy: '{}'", s)),
        }
    }
}

impl Serialize for DuplicatePolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DuplicatePolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Policy for unparsable rows during a record load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Abort the whole load on the first unparsable row.
    Abort,
    /// Log the offending row (with its index) and continue.
    Skip,
}

impl Default for MalformedPolicy {
    fn default() -> Self {
        Self::Abort
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("Invalid malformed-row policy: '{}'", s)),
        }
    }
}

impl Serialize for MalformedPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MalformedPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict() {
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Reject);
        assert_eq!(MalformedPolicy::default(), MalformedPolicy::Abort);
    }

    #[test]
    fn test_parse_round_trip() {
        assert_eq!(
            "overwrite".parse::<DuplicatePolicy>().unwrap(),
            DuplicatePolicy::Overwrite
        );
        assert_eq!("skip".parse::<MalformedPolicy>().unwrap(), MalformedPolicy::Skip);
        assert!("merge".parse::<DuplicatePolicy>().is_err());
    }
}
