use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A signing domain, validated as an RFC 1123 host name.
///
/// Underscores are rejected as well: the domain is the last `_`-separated
/// component of a key file name and must not contain the separator itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(pub String);

impl Domain {
    /// Create a new domain from a string.
    pub fn new(domain: String) -> Result<Self, anyhow::Error> {
        Self::is_valid_domain(&domain)?;
        Ok(Self(domain))
    }

    /// Validate a signing domain.
    pub fn is_valid_domain(domain: &str) -> anyhow::Result<()> {
        if !hostname_validator::is_valid(domain) {
            return Err(anyhow::anyhow!(
                "Invalid domain '{}': is not a valid RFC 1123 hostname",
                domain
            ));
        }
        if domain.contains('_') {
            return Err(anyhow::anyhow!(
                "Invalid domain '{}': must not contain '_'",
                domain
            ));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Domain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::is_valid_domain(s)?;
        Ok(Self(s.to_string()))
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Domain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}
