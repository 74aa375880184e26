//! Registry of the configured signing algorithms.

use serde::{Deserialize, Serialize};

/// A signing algorithm and the extra arguments passed to the key generator for it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct KeyTypeDefinition {
    #[serde(rename = "type", default)]
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl KeyTypeDefinition {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyTypeError {
    #[error("key type definition without a type name")]
    MissingType,
    #[error("key type '{0}' is defined more than once")]
    DuplicateType(String),
    #[error("key type '{0}' must not contain '_'")]
    InvalidName(String),
}

/// Built once at startup, read-only afterwards. Iteration follows registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyTypeRegistry {
    types: Vec<KeyTypeDefinition>,
}

impl KeyTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions, rejecting the first invalid one.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = KeyTypeDefinition>,
    ) -> Result<Self, KeyTypeError> {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, definition: KeyTypeDefinition) -> Result<(), KeyTypeError> {
        if definition.name.trim().is_empty() {
            return Err(KeyTypeError::MissingType);
        }
        // The type is the middle `_`-separated component of a key file name.
        if definition.name.contains('_') {
            return Err(KeyTypeError::InvalidName(definition.name));
        }
        if self.contains(&definition.name) {
            return Err(KeyTypeError::DuplicateType(definition.name));
        }
        self.types.push(definition);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&KeyTypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyTypeDefinition> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_in_order() {
        let registry = KeyTypeRegistry::from_definitions([
            KeyTypeDefinition::new("rsa", vec!["-b".into(), "2048".into()]),
            KeyTypeDefinition::new("ed25519", vec![]),
        ])
        .unwrap();
        let names: Vec<&str> = registry.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["rsa", "ed25519"]);
        assert_eq!(registry.get("rsa").unwrap().args, vec!["-b", "2048"]);
        assert!(!registry.contains("dsa"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = KeyTypeRegistry::from_definitions([
            KeyTypeDefinition::new("ed25519", vec![]),
            KeyTypeDefinition::new("ed25519", vec!["-x".into()]),
        ])
        .unwrap_err();
        assert_eq!(err, KeyTypeError::DuplicateType("ed25519".into()));
    }

    #[test]
    fn test_missing_type_rejected() {
        let mut registry = KeyTypeRegistry::new();
        assert_eq!(
            registry.register(KeyTypeDefinition::default()),
            Err(KeyTypeError::MissingType)
        );
        assert_eq!(
            registry.register(KeyTypeDefinition::new("  ", vec![])),
            Err(KeyTypeError::MissingType)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_separator_in_name_rejected() {
        let mut registry = KeyTypeRegistry::new();
        assert_eq!(
            registry.register(KeyTypeDefinition::new("rsa_4096", vec![])),
            Err(KeyTypeError::InvalidName("rsa_4096".into()))
        );
    }

    #[test]
    fn test_definition_from_toml() {
        let definition: KeyTypeDefinition =
            toml::from_str("type = \"rsa\"\nargs = [\"-b\", \"4096\"]\n").unwrap();
        assert_eq!(definition, KeyTypeDefinition::new("rsa", vec!["-b".into(), "4096".into()]));
    }
}
