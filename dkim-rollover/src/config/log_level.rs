//! Log level values accepted in the `[logging]` section.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing_subscriber::filter::{Directive, LevelFilter};

/// Global level, e.g. `info`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLevel(pub LevelFilter);

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: LevelFilter = s
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid log level: {}", s))?;
        Ok(Self(parsed))
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<LogLevel> for Directive {
    fn from(val: LogLevel) -> Self {
        val.0.into()
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(LevelFilter::INFO)
    }
}

/// Per-module level, e.g. `dkim_rollover::keys=debug`.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetLevel(pub Directive);

impl FromStr for TargetLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains('=') {
            return Err(anyhow::anyhow!("missing '=' in target log level: {}", s));
        }
        let parsed = s
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid target log level: {}", s))?;
        Ok(Self(parsed))
    }
}

impl Display for TargetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TargetLevel> for Directive {
    fn from(val: TargetLevel) -> Self {
        val.0
    }
}

macro_rules! serde_via_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
            }
        }
    };
}

serde_via_str!(LogLevel);
serde_via_str!(TargetLevel);
