//!
//! Layers a user TOML document on top of the embedded defaults.
//!
//! Tables merge key by key, every other value (arrays included) is replaced
//! wholesale. Replacing arrays matters here: a user listing their own
//! `[[key_types]]` or `domains` must not inherit the default entries.
//!

use std::fmt;
use toml::map::Map;
use toml::Value;

#[derive(Debug, PartialEq)]
pub struct MergeError {
    pub path: String,
    pub expected: &'static str,
    pub received: &'static str,
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "incompatible types at \"{}\": expected {}, received {}",
            self.path, self.expected, self.received
        )
    }
}

impl std::error::Error for MergeError {}

/// Merge `overrides` into `defaults`.
pub fn merge(defaults: Value, overrides: Value) -> Result<Value, MergeError> {
    merge_at(defaults, overrides, "$")
}

fn merge_at(defaults: Value, overrides: Value, path: &str) -> Result<Value, MergeError> {
    match (defaults, overrides) {
        (Value::Table(mut existing), Value::Table(inner)) => {
            merge_tables(&mut existing, inner, path)?;
            Ok(Value::Table(existing))
        }
        (existing, inner) if existing.same_type(&inner) => Ok(inner),
        (existing, inner) => Err(MergeError {
            path: path.to_owned(),
            expected: existing.type_str(),
            received: inner.type_str(),
        }),
    }
}

fn merge_tables(
    existing: &mut Map<String, Value>,
    overrides: Map<String, Value>,
    path: &str,
) -> Result<(), MergeError> {
    for (name, inner) in overrides {
        let merged = match existing.remove(&name) {
            Some(current) => merge_at(current, inner, &format!("{path}.{name}"))?,
            None => inner,
        };
        existing.insert(name, merged);
    }
    Ok(())
}
