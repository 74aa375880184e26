//!
//! A single DKIM key: the private key file `<YYYYMM>_<type>_<domain>.key` and
//! its DNS record `<YYYYMM>_<type>_<domain>.txt` side by side.
//!
//! The file name is authoritative. Domain, type and valid-from month are read
//! from it on every load and the lifecycle state is derived from the month.
//!

use std::fmt::{self, Display};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{
    ChangeAction, ChangeLog, KeyContext, KeyTypeDefinition, KeyTypeRegistry, LifecycleState,
    MonthIndex,
};
use crate::hooks::{KeyGenError, KeyGenRequest, KeyGenerator};

const KEY_SUFFIX: &str = ".key";
const RECORD_EXTENSION: &str = "txt";

/// Result of validating a key's file name and files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    InvalidFilename(String),
    MissingFile { path: PathBuf, reason: String },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

impl Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOutcome::Valid => f.write_str("valid"),
            ValidationOutcome::InvalidFilename(reason) => write!(f, "invalid file name: {reason}"),
            ValidationOutcome::MissingFile { path, reason } => {
                write!(f, "{} is not readable: {reason}", path.display())
            }
        }
    }
}

/// Fatal errors of [`Key::create`] and [`Key::delete`].
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to generate {key_type} key for {domain}: {source}")]
    Generation {
        domain: String,
        key_type: String,
        #[source]
        source: KeyGenError,
    },
    #[error("freshly created key {} is unusable: {reason}", .path.display())]
    Inconsistent { path: PathBuf, reason: String },
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Identity encoded in a key file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyName {
    pub valid_from: MonthIndex,
    pub key_type: String,
    pub domain: String,
}

impl KeyName {
    /// Parse `<YYYYMM>_<type>_<domain>.key`. The type must be registered.
    pub fn parse(path: &Path, registry: &KeyTypeRegistry) -> Result<Self, String> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format!("{} has no file name", path.display()))?;
        let stem = file_name
            .strip_suffix(KEY_SUFFIX)
            .ok_or_else(|| format!("'{file_name}' does not end in '{KEY_SUFFIX}'"))?;

        let parts: Vec<&str> = stem.split('_').collect();
        let [date, key_type, domain] = parts.as_slice() else {
            return Err(format!(
                "'{file_name}' has {} '_'-separated components, expected 3",
                parts.len()
            ));
        };
        let valid_from: MonthIndex = date.parse().map_err(|e| format!("'{file_name}': {e}"))?;
        if !registry.contains(key_type) {
            return Err(format!("'{file_name}': unknown key type '{key_type}'"));
        }
        if domain.is_empty() {
            return Err(format!("'{file_name}': empty domain"));
        }

        Ok(Self {
            valid_from,
            key_type: key_type.to_string(),
            domain: domain.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}{KEY_SUFFIX}",
            self.valid_from, self.key_type, self.domain
        )
    }

    pub fn default_selector(&self) -> String {
        format!("{}-{}", self.valid_from, self.key_type)
    }
}

/// Path of the DNS record belonging to a key file.
pub fn record_path_for(key_path: &Path) -> PathBuf {
    key_path.with_extension(RECORD_EXTENSION)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    key_path: PathBuf,
    record_path: PathBuf,
    domain: String,
    selector: String,
    key_type: String,
    valid_from: Option<MonthIndex>,
    age: i32,
    state: LifecycleState,
    validation: ValidationOutcome,
    grace_extended: bool,
}

impl Key {
    /// Parse a key from its file name alone. No file is touched.
    pub fn parse_from_filename(
        path: &Path,
        explicit_selector: Option<&str>,
        ctx: &KeyContext,
    ) -> Result<Self, ValidationOutcome> {
        let name = KeyName::parse(path, &ctx.registry).map_err(ValidationOutcome::InvalidFilename)?;
        let age = ctx.current_month.months_since(name.valid_from);
        Ok(Self {
            key_path: path.to_path_buf(),
            record_path: record_path_for(path),
            selector: explicit_selector
                .map(str::to_string)
                .unwrap_or_else(|| name.default_selector()),
            domain: name.domain,
            key_type: name.key_type,
            valid_from: Some(name.valid_from),
            age,
            state: ctx.lifetimes.state_for_age(age),
            validation: ValidationOutcome::Valid,
            grace_extended: false,
        })
    }

    /// Load a key, validating its file name and, unless skipped, that both files are readable.
    ///
    /// Never fails: validation problems yield a key in state [`LifecycleState::Invalid`].
    pub fn load(
        path: &Path,
        explicit_selector: Option<&str>,
        skip_existence_check: bool,
        ctx: &KeyContext,
    ) -> Self {
        let mut key = match Self::parse_from_filename(path, explicit_selector, ctx) {
            Ok(key) => key,
            Err(outcome) => return Self::invalid(path, explicit_selector, outcome),
        };
        if skip_existence_check {
            return key;
        }
        for file in [key.key_path.clone(), key.record_path.clone()] {
            if let Err(e) = fs::File::open(&file) {
                key.mark_invalid(ValidationOutcome::MissingFile {
                    path: file,
                    reason: e.to_string(),
                });
                break;
            }
        }
        key
    }

    fn invalid(path: &Path, explicit_selector: Option<&str>, outcome: ValidationOutcome) -> Self {
        Self {
            key_path: path.to_path_buf(),
            record_path: record_path_for(path),
            domain: String::new(),
            selector: explicit_selector.unwrap_or_default().to_string(),
            key_type: String::new(),
            valid_from: None,
            age: 0,
            state: LifecycleState::Invalid,
            validation: outcome,
            grace_extended: false,
        }
    }

    fn mark_invalid(&mut self, outcome: ValidationOutcome) {
        self.state = LifecycleState::Invalid;
        self.validation = outcome;
    }

    /// Generate a new key valid from `current_month + month_offset`.
    ///
    /// Stale files at the target path are removed first. The generated files
    /// are loaded back and must validate into the state the offset implies.
    pub fn create(
        ctx: &KeyContext,
        generator: &dyn KeyGenerator,
        changes: &mut ChangeLog,
        domain: &str,
        key_type: &KeyTypeDefinition,
        month_offset: i32,
    ) -> Result<Self, KeyError> {
        let name = KeyName {
            valid_from: ctx.current_month.offset(month_offset),
            key_type: key_type.name.clone(),
            domain: domain.to_string(),
        };
        let key_path = ctx.key_dir.join(name.file_name());
        let record_path = record_path_for(&key_path);
        let selector = name.default_selector();

        fs::create_dir_all(&ctx.key_dir).map_err(|source| KeyError::Io {
            action: "failed to create key directory",
            path: ctx.key_dir.clone(),
            source,
        })?;
        for stale in [&key_path, &record_path] {
            let _ = fs::remove_file(stale);
        }

        let request = KeyGenRequest {
            key_type,
            domain,
            selector: &selector,
            key_path: &key_path,
        };
        let record = generator
            .generate(&request)
            .map_err(|source| KeyError::Generation {
                domain: domain.to_string(),
                key_type: key_type.name.clone(),
                source,
            })?;
        fs::write(&record_path, record).map_err(|source| KeyError::Io {
            action: "failed to write DNS record",
            path: record_path.clone(),
            source,
        })?;

        let key = Self::load(&key_path, None, false, ctx);
        if !key.is_valid() {
            return Err(KeyError::Inconsistent {
                path: key_path,
                reason: key.validation.to_string(),
            });
        }
        let expected = ctx.lifetimes.state_for_age(-month_offset);
        if key.state != expected {
            return Err(KeyError::Inconsistent {
                path: key_path,
                reason: format!("state is {}, expected {}", key.state, expected),
            });
        }

        tracing::info!(
            "Created {} key {} for {} (valid from {})",
            key.key_type,
            key.selector,
            key.domain,
            name.valid_from
        );
        changes.record(ChangeAction::Add, &key.domain, &key.selector, &key.record_path);
        Ok(key)
    }

    /// Retire the key: record the removal, then archive or unlink both files.
    ///
    /// Missing files are skipped. Archive name collisions overwrite.
    pub fn delete(self, ctx: &KeyContext, changes: &mut ChangeLog) -> Result<(), KeyError> {
        changes.record(ChangeAction::Del, &self.domain, &self.selector, &self.record_path);

        if let Some(archive_dir) = &ctx.archive_dir {
            fs::create_dir_all(archive_dir).map_err(|source| KeyError::Io {
                action: "failed to create archive directory",
                path: archive_dir.clone(),
                source,
            })?;
        }

        for file in [&self.key_path, &self.record_path] {
            let result = match (&ctx.archive_dir, file.file_name()) {
                (Some(archive_dir), Some(file_name)) => fs::rename(file, archive_dir.join(file_name)),
                _ => fs::remove_file(file),
            };
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("{} already gone", file.display());
                }
                Err(source) => {
                    return Err(KeyError::Io {
                        action: "failed to retire",
                        path: file.clone(),
                        source,
                    })
                }
            }
        }

        let verb = if ctx.archive_dir.is_some() { "Archived" } else { "Deleted" };
        tracing::info!(
            "{verb} key {} of {} ({})",
            self.selector,
            self.domain,
            self.key_path.display()
        );
        Ok(())
    }

    /// Keep signing with this key although its active window has passed.
    pub fn extend_grace(&mut self) {
        self.state = LifecycleState::Active;
        self.grace_extended = true;
    }

    /// Fill in the domain of a key whose file name could not be parsed.
    pub(crate) fn assign_domain_if_unknown(&mut self, domain: &str) {
        if self.domain.is_empty() {
            self.domain = domain.to_string();
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn valid_from(&self) -> Option<MonthIndex> {
        self.valid_from
    }

    /// Months since the valid-from month. Negative for future keys.
    pub fn age(&self) -> i32 {
        self.age
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn validation(&self) -> &ValidationOutcome {
        &self.validation
    }

    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    pub fn is_grace_extended(&self) -> bool {
        self.grace_extended
    }
}
