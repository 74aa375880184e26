//! Configuration file for dkim-rollover.
//!
//! All default values live exclusively in `config.default.toml`.
//! This module embeds that file at compile-time and layers the user's TOML on top.

use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::{
    toml_merge::{self, MergeError},
    Domain, LogLevel, TargetLevel,
};
use crate::keys::{
    Category, KeyContext, KeyTypeDefinition, KeyTypeError, KeyTypeRegistry, LifetimeTooLong,
    Lifetimes, MonthIndex,
};

/// Embedded copy of the default configuration (single source of truth for defaults)
pub const DEFAULT_CONFIG: &str = include_str!("config.default.toml");

/// Example configuration file
pub const SAMPLE_CONFIG: &str = include_str!("../../config.sample.toml");

const DEFAULT_LOCK_FILE_NAME: &str = ".dkim-rollover.lock";

/// Error that can occur when reading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigReadError {
    /// The file did not exist or could not be read.
    #[error("config file not found: {0}")]
    ConfigFileNotFound(#[from] std::io::Error),
    /// The TOML was syntactically invalid or had values of the wrong type.
    #[error("config file is not valid TOML: {0}")]
    ConfigFileNotValid(#[from] toml::de::Error),
    /// Failed to merge defaults with overrides.
    #[error("failed to merge embedded and user TOML: {0}")]
    ConfigMergeError(#[from] MergeError),
    #[error("invalid lifetimes: {0}")]
    InvalidLifetime(#[from] LifetimeTooLong),
    #[error("invalid key type: {0}")]
    InvalidKeyType(#[from] KeyTypeError),
    #[error("no domains configured")]
    NoDomains,
    #[error("no key types configured")]
    NoKeyTypes,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneralToml {
    pub key_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub lock_file: Option<PathBuf>,
    pub domains: Vec<Domain>,
}

/// Locations of the three key collections.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateToml {
    pub active: PathBuf,
    pub future: PathBuf,
    pub expired: PathBuf,
}

/// An external command, program first.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CommandToml {
    pub command: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct LoggingToml {
    pub level: LogLevel,
    pub module_levels: Vec<TargetLevel>,
}

/// The overall application configuration, composed of several subsections.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigToml {
    /// Key directory, archive, lock file and signing domains.
    pub general: GeneralToml,
    /// Lifecycle durations in months.
    pub lifetimes: Lifetimes,
    /// Persisted key collections.
    pub state: StateToml,
    /// Key generation command.
    pub keygen: CommandToml,
    /// Change notification command.
    pub notify: CommandToml,
    pub logging: LoggingToml,
    /// Signing algorithms, in the order keys are rolled.
    pub key_types: Vec<KeyTypeDefinition>,
}

impl Default for ConfigToml {
    fn default() -> Self {
        ConfigToml::from_str(DEFAULT_CONFIG).expect("Embedded config.default.toml must be valid")
    }
}

impl Default for GeneralToml {
    fn default() -> Self {
        ConfigToml::default().general
    }
}

impl Default for StateToml {
    fn default() -> Self {
        ConfigToml::default().state
    }
}

impl ConfigToml {
    /// Read and parse a configuration file, overlaying it on top of the embedded defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigReadError> {
        let raw = fs::read_to_string(path)?;
        Self::from_str_with_defaults(&raw)
    }

    /// Parse a raw TOML string, overlaying it on top of the embedded defaults.
    ///
    /// Arrays in the user TOML replace the default arrays instead of extending them.
    pub fn from_str_with_defaults(raw: &str) -> Result<Self, ConfigReadError> {
        let default_val: toml::Value = DEFAULT_CONFIG
            .parse()
            .expect("embedded defaults invalid TOML");
        let user_val: toml::Value = raw.parse()?;
        let merged_val = toml_merge::merge(default_val, user_val)?;
        let config: ConfigToml = merged_val.try_into()?;
        config.lifetimes.validate()?;
        Ok(config)
    }

    /// Render the embedded sample config but comment out every value,
    /// producing a handy template for end-users.
    pub fn sample_string() -> String {
        SAMPLE_CONFIG
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                let is_comment = trimmed.starts_with('#');
                if !is_comment && !trimmed.is_empty() {
                    format!("# {}", line)
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<String>>()
            .join("\n")
    }

    /// Check the values serde cannot and build the key type registry.
    pub fn registry(&self) -> Result<KeyTypeRegistry, ConfigReadError> {
        if self.general.domains.is_empty() {
            return Err(ConfigReadError::NoDomains);
        }
        if self.key_types.is_empty() {
            return Err(ConfigReadError::NoKeyTypes);
        }
        Ok(KeyTypeRegistry::from_definitions(self.key_types.iter().cloned())?)
    }

    /// Everything keys need for a run at `current_month`.
    pub fn key_context(&self, current_month: MonthIndex) -> Result<KeyContext, ConfigReadError> {
        Ok(KeyContext {
            key_dir: self.general.key_dir.clone(),
            archive_dir: self.general.archive_dir.clone(),
            lifetimes: self.lifetimes,
            current_month,
            registry: self.registry()?,
        })
    }

    pub fn domain_names(&self) -> Vec<String> {
        self.general
            .domains
            .iter()
            .map(|domain| domain.as_str().to_string())
            .collect()
    }

    /// Backing file of a key collection.
    pub fn state_path(&self, category: Category) -> PathBuf {
        let path = match category {
            Category::Active => &self.state.active,
            Category::Future => &self.state.future,
            Category::Expired => &self.state.expired,
        };
        self.general.key_dir.join(path)
    }

    pub fn lock_file_path(&self) -> PathBuf {
        self.general
            .lock_file
            .clone()
            .unwrap_or_else(|| self.general.key_dir.join(DEFAULT_LOCK_FILE_NAME))
    }

    /// Returns a default config rooted at `key_dir`, for tests.
    pub fn test(key_dir: &Path) -> Self {
        let mut config = Self::default();
        config.general.key_dir = key_dir.to_path_buf();
        config.general.domains =
            vec![Domain::from_str("example.com").expect("example.com is a valid domain")];
        config
    }
}

impl FromStr for ConfigToml {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_default_config() {
        let c = ConfigToml::default();
        assert_eq!(c.general.key_dir, PathBuf::from("/var/lib/dkim"));
        assert_eq!(c.general.archive_dir, None);
        assert_eq!(c.general.lock_file, None);
        assert!(c.general.domains.is_empty());
        assert_eq!(c.lifetimes.future_months(), 1);
        assert_eq!(c.lifetimes.active_months(), 3);
        assert_eq!(c.lifetimes.expired_months(), 1);
        assert_eq!(c.state.active, PathBuf::from("active.json"));
        assert_eq!(c.keygen.command, vec!["rspamadm", "dkim_keygen"]);
        assert!(c.notify.command.is_empty());
        assert_eq!(c.logging.level, LogLevel(LevelFilter::INFO));
        assert_eq!(
            c.key_types,
            vec![
                KeyTypeDefinition::new("ed25519", vec![]),
                KeyTypeDefinition::new("rsa", vec!["-b".to_string(), "2048".to_string()]),
            ]
        );
    }

    #[test]
    fn test_sample_config() {
        // Validate that the sample config can be parsed
        ConfigToml::from_str(SAMPLE_CONFIG).expect("Embedded config.sample.toml must be valid");
    }

    #[test]
    fn test_sample_config_commented_out() {
        // A fully commented out .toml should still be equal to the default ConfigToml
        let s = ConfigToml::sample_string();
        let parsed: ConfigToml =
            ConfigToml::from_str_with_defaults(&s).expect("Should be valid config file");
        assert_eq!(parsed, ConfigToml::default());
    }

    #[test]
    fn test_partial_config() {
        let s = "[general]\ndomains = [\"example.com\", \"mail.example.org\"]\n\n[lifetimes]\nactive = 6\n";
        let parsed = ConfigToml::from_str_with_defaults(s).unwrap();
        assert_eq!(parsed.domain_names(), vec!["example.com", "mail.example.org"]);
        assert_eq!(parsed.lifetimes.active_months(), 6);
        // Values that were not set should still match the default.
        assert_eq!(parsed.lifetimes.future_months(), 1);
        assert_eq!(parsed.state, ConfigToml::default().state);
        assert_eq!(parsed.key_types, ConfigToml::default().key_types);
    }

    #[test]
    fn test_key_types_replace_defaults() {
        let s = "[general]\ndomains = [\"example.com\"]\n\n[[key_types]]\ntype = \"rsa\"\nargs = [\"-b\", \"4096\"]\n";
        let parsed = ConfigToml::from_str_with_defaults(s).unwrap();
        assert_eq!(
            parsed.key_types,
            vec![KeyTypeDefinition::new("rsa", vec!["-b".to_string(), "4096".to_string()])]
        );
    }

    #[test]
    fn test_zero_lifetime_is_rejected() {
        let result = ConfigToml::from_str_with_defaults("[lifetimes]\nexpired = 0\n");
        assert!(matches!(result, Err(ConfigReadError::ConfigFileNotValid(_))));
    }

    #[test]
    fn test_oversized_lifetime_is_rejected() {
        let result = ConfigToml::from_str_with_defaults("[lifetimes]\nactive = 3000000000\n");
        assert!(matches!(
            result,
            Err(ConfigReadError::InvalidLifetime(LifetimeTooLong {
                period: "active",
                months: 3_000_000_000,
            }))
        ));

        let parsed = ConfigToml::from_str_with_defaults("[lifetimes]\nactive = 1200\n").unwrap();
        assert_eq!(parsed.lifetimes.active_months(), 1200);
        assert_eq!(
            parsed.lifetimes.state_for_age(0),
            crate::keys::LifecycleState::Active
        );
    }

    #[test]
    fn test_invalid_domain_is_rejected() {
        let result = ConfigToml::from_str_with_defaults("[general]\ndomains = [\"invalid@domain.com\"]\n");
        assert!(matches!(result, Err(ConfigReadError::ConfigFileNotValid(_))));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result = ConfigToml::from_str_with_defaults("[general]\nkey_dir = 5\n");
        assert!(matches!(result, Err(ConfigReadError::ConfigMergeError(_))));
    }

    #[test]
    fn test_registry_validation() {
        let config = ConfigToml::default();
        assert!(matches!(config.registry(), Err(ConfigReadError::NoDomains)));

        let mut config = ConfigToml::test(Path::new("/tmp/keys"));
        config.key_types.clear();
        assert!(matches!(config.registry(), Err(ConfigReadError::NoKeyTypes)));

        config.key_types = vec![
            KeyTypeDefinition::new("rsa", vec![]),
            KeyTypeDefinition::new("rsa", vec![]),
        ];
        assert!(matches!(
            config.registry(),
            Err(ConfigReadError::InvalidKeyType(KeyTypeError::DuplicateType(_)))
        ));

        config.key_types = vec![KeyTypeDefinition::new("", vec![])];
        assert!(matches!(
            config.registry(),
            Err(ConfigReadError::InvalidKeyType(KeyTypeError::MissingType))
        ));
    }

    #[test]
    fn test_paths() {
        let mut config = ConfigToml::test(Path::new("/srv/dkim"));
        assert_eq!(
            config.state_path(Category::Future),
            PathBuf::from("/srv/dkim/future.json")
        );
        assert_eq!(
            config.lock_file_path(),
            PathBuf::from("/srv/dkim/.dkim-rollover.lock")
        );

        config.state.expired = PathBuf::from("/etc/dkim/expired.json");
        config.general.lock_file = Some(PathBuf::from("/run/dkim.lock"));
        assert_eq!(
            config.state_path(Category::Expired),
            PathBuf::from("/etc/dkim/expired.json")
        );
        assert_eq!(config.lock_file_path(), PathBuf::from("/run/dkim.lock"));
    }

    #[test]
    fn test_key_context() {
        let config = ConfigToml::test(Path::new("/srv/dkim"));
        let month = MonthIndex::new(2026, 10).unwrap();
        let ctx = config.key_context(month).unwrap();
        assert_eq!(ctx.key_dir, PathBuf::from("/srv/dkim"));
        assert_eq!(ctx.current_month, month);
        assert!(ctx.registry.contains("ed25519"));
        assert!(ctx.registry.contains("rsa"));
    }
}
