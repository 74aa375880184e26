//!
//! One persisted collection of keys (`active`, `future` or `expired`).
//!
//! The backing file is JSON:
//!
//! ```json
//! {
//!   "domain": {
//!     "example.com": {
//!       "selectors": [
//!         { "path": "/var/lib/dkim/202610_ed25519_example.com.key", "selector": "202610-ed25519" }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! The set is loaded once per run and written back at most once, only when its
//! canonical serialization changed. Writes go through a temporary file in the
//! same directory that is then renamed over the original.
//!

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Category, Key, KeyContext, LifecycleState};

/// Permissions of a written state file: owner and group may read.
#[cfg(unix)]
const STATE_FILE_MODE: u32 = 0o440;

#[derive(Debug, thiserror::Error)]
pub enum KeyConfigSetError {
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {category} keys: {source}")]
    Serialize {
        category: Category,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    domain: BTreeMap<String, DomainEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DomainEntry {
    #[serde(default)]
    selectors: Vec<SelectorEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectorEntry {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KeyConfigSet {
    category: Category,
    path: PathBuf,
    keys: BTreeMap<String, Vec<Key>>,
    /// Canonical fragment as last read or written. `None` forces the next persist.
    raw_snapshot: Option<String>,
}

impl KeyConfigSet {
    /// An empty set that has never been persisted.
    pub fn new(category: Category, path: impl Into<PathBuf>) -> Self {
        Self {
            category,
            path: path.into(),
            keys: BTreeMap::new(),
            raw_snapshot: None,
        }
    }

    /// Load the set from its backing file.
    ///
    /// A missing file yields an empty set and a malformed one is logged and
    /// treated as empty. Any other read failure is returned.
    pub fn load(
        category: Category,
        path: impl Into<PathBuf>,
        ctx: &KeyContext,
    ) -> Result<Self, KeyConfigSetError> {
        let mut set = Self::new(category, path);

        let raw = match fs::read_to_string(&set.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "No {} key file at {}, starting empty",
                    category,
                    set.path.display()
                );
                set.raw_snapshot = Some(set.serialize_canonical(true)?);
                return Ok(set);
            }
            Err(source) => {
                return Err(KeyConfigSetError::Io {
                    action: "failed to read",
                    path: set.path,
                    source,
                })
            }
        };

        let state_file: StateFile = match serde_json::from_str(&raw) {
            Ok(state_file) => state_file,
            Err(e) => {
                tracing::error!(
                    "Ignoring malformed {} key file {}: {}",
                    category,
                    set.path.display(),
                    e
                );
                return Ok(set);
            }
        };

        for (domain, entry) in state_file.domain {
            for selector in entry.selectors {
                let mut key = Key::load(
                    Path::new(&selector.path),
                    selector.selector.as_deref(),
                    false,
                    ctx,
                );
                key.assign_domain_if_unknown(&domain);
                if !key.is_valid() {
                    tracing::warn!(
                        "Invalid {} key for {}: {}",
                        category,
                        domain,
                        key.validation()
                    );
                }
                set.add(key);
            }
        }
        set.raw_snapshot = Some(set.serialize_canonical(true)?);
        Ok(set)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a key to its domain's sequence.
    pub fn add(&mut self, key: Key) {
        self.keys.entry(key.domain().to_string()).or_default().push(key);
    }

    fn position(&self, domain: &str, key_type: &str, state: LifecycleState) -> Option<usize> {
        self.keys.get(domain)?.iter().position(|key| {
            key.key_type() == key_type && key.is_valid() && key.state() == state
        })
    }

    /// First valid key of `domain` and `key_type` in `state`, in insertion order.
    pub fn find(&self, domain: &str, key_type: &str, state: LifecycleState) -> Option<&Key> {
        let index = self.position(domain, key_type, state)?;
        self.keys.get(domain).map(|keys| &keys[index])
    }

    pub fn find_mut(
        &mut self,
        domain: &str,
        key_type: &str,
        state: LifecycleState,
    ) -> Option<&mut Key> {
        let index = self.position(domain, key_type, state)?;
        self.keys.get_mut(domain).map(|keys| &mut keys[index])
    }

    /// Like [`Self::find`] but removes the key from the set.
    pub fn take(&mut self, domain: &str, key_type: &str, state: LifecycleState) -> Option<Key> {
        let index = self.position(domain, key_type, state)?;
        let keys = self.keys.get_mut(domain)?;
        let key = keys.remove(index);
        if keys.is_empty() {
            self.keys.remove(domain);
        }
        Some(key)
    }

    /// Drop every key whose state no longer matches this set's category and return them.
    pub fn partition_by_expected_state(&mut self) -> Vec<Key> {
        let expected = self.category.expected_state();
        let mut removed = Vec::new();
        for keys in self.keys.values_mut() {
            let (kept, dropped): (Vec<Key>, Vec<Key>) =
                keys.drain(..).partition(|key| key.state() == expected);
            *keys = kept;
            removed.extend(dropped);
        }
        self.keys.retain(|_, keys| !keys.is_empty());
        removed
    }

    /// Whether any key in the set uses `key_path`.
    pub fn references(&self, key_path: &Path) -> bool {
        self.iter().any(|key| key.key_path() == key_path)
    }

    /// All keys, by domain then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deterministic JSON fragment (no enclosing braces) of the `{path, selector}` pairs.
    ///
    /// Keys whose state differs from the category are left out unless
    /// `include_mismatched_state` is set.
    pub fn serialize_canonical(
        &self,
        include_mismatched_state: bool,
    ) -> Result<String, KeyConfigSetError> {
        let expected = self.category.expected_state();
        let mut state_file = StateFile::default();
        for (domain, keys) in &self.keys {
            let selectors: Vec<SelectorEntry> = keys
                .iter()
                .filter(|key| include_mismatched_state || key.state() == expected)
                .map(|key| SelectorEntry {
                    path: key.key_path().to_string_lossy().into_owned(),
                    selector: Some(key.selector().to_string()),
                })
                .collect();
            if !selectors.is_empty() {
                state_file
                    .domain
                    .insert(domain.clone(), DomainEntry { selectors });
            }
        }

        let document = serde_json::to_string_pretty(&state_file).map_err(|source| {
            KeyConfigSetError::Serialize {
                category: self.category,
                source,
            }
        })?;
        let fragment = document
            .trim()
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or_default();
        Ok(fragment.to_string())
    }

    /// Write the set if its content changed since it was loaded or last written.
    ///
    /// Returns whether the file was written.
    pub fn persist_if_changed(&mut self) -> Result<bool, KeyConfigSetError> {
        let fragment = self.serialize_canonical(false)?;
        if self.raw_snapshot.as_deref() == Some(fragment.as_str()) {
            tracing::debug!("{} keys unchanged", self.category);
            return Ok(false);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        self.write_atomically(&dir, &format!("{{{fragment}}}\n"))?;
        tracing::info!(
            "Wrote {} {} keys to {}",
            self.len(),
            self.category,
            self.path.display()
        );
        self.raw_snapshot = Some(fragment);
        Ok(true)
    }

    fn write_atomically(&self, dir: &Path, contents: &str) -> Result<(), KeyConfigSetError> {
        let io_error = |action: &'static str, path: &Path| {
            let path = path.to_path_buf();
            move |source| KeyConfigSetError::Io {
                action,
                path,
                source,
            }
        };

        fs::create_dir_all(dir).map_err(io_error("failed to create directory", dir))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(io_error("failed to create temporary file in", dir))?;
        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(io_error("failed to write", temp.path()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(STATE_FILE_MODE))
                .map_err(io_error("failed to set permissions on", temp.path()))?;
        }

        temp.persist(&self.path)
            .map_err(|e| io_error("failed to replace", &self.path)(e.error))?;
        Ok(())
    }
}
