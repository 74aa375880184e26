//!
//! One rollover pass over every configured domain and key type.
//!
//! For each pair the engine makes sure exactly one key signs mail, creating a
//! successor ahead of time so its DNS record is published before it is needed.
//! Afterwards keys that left their category are demoted or retired, changed
//! collections are written back and the notification hook runs once.
//!

use std::path::PathBuf;

use crate::hooks::{KeyGenerator, Notifier};
use crate::keys::{
    Category, ChangeAction, ChangeLog, Key, KeyConfigSet, KeyConfigSetError, KeyContext, KeyError,
    KeyTypeDefinition, LifecycleState,
};

#[derive(Debug, thiserror::Error)]
pub enum RolloverError {
    #[error("failed to create {key_type} key for {domain}: {source}")]
    Creation {
        domain: String,
        key_type: String,
        #[source]
        source: KeyError,
    },
    #[error("failed to retire key: {0}")]
    Retire(#[source] KeyError),
    #[error(transparent)]
    State(#[from] KeyConfigSetError),
}

/// Backing files of the three key collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub active: PathBuf,
    pub future: PathBuf,
    pub expired: PathBuf,
}

impl StatePaths {
    pub fn get(&self, category: Category) -> &PathBuf {
        match category {
            Category::Active => &self.active,
            Category::Future => &self.future,
            Category::Expired => &self.expired,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Keys added and removed, in the order the notification hook received them.
    pub changes: ChangeLog,
    /// Collections whose file was rewritten.
    pub written: Vec<Category>,
}

impl RunReport {
    /// Whether any key was added or removed.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

struct KeySets {
    active: KeyConfigSet,
    future: KeyConfigSet,
    expired: KeyConfigSet,
}

impl KeySets {
    fn load(paths: &StatePaths, ctx: &KeyContext) -> Result<Self, KeyConfigSetError> {
        Ok(Self {
            active: KeyConfigSet::load(Category::Active, &paths.active, ctx)?,
            future: KeyConfigSet::load(Category::Future, &paths.future, ctx)?,
            expired: KeyConfigSet::load(Category::Expired, &paths.expired, ctx)?,
        })
    }

    fn references(&self, key: &Key) -> bool {
        [&self.active, &self.future, &self.expired]
            .iter()
            .any(|set| set.references(key.key_path()))
    }
}

pub struct RolloverEngine<'a> {
    ctx: KeyContext,
    domains: Vec<String>,
    state_paths: StatePaths,
    generator: &'a dyn KeyGenerator,
    notifier: &'a dyn Notifier,
}

impl<'a> RolloverEngine<'a> {
    pub fn new(
        ctx: KeyContext,
        domains: Vec<String>,
        state_paths: StatePaths,
        generator: &'a dyn KeyGenerator,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            ctx,
            domains,
            state_paths,
            generator,
            notifier,
        }
    }

    /// Run one pass.
    ///
    /// Errors abort the run. Collections are only written at the very end, so
    /// an aborted run leaves them as they were.
    pub fn run(&self) -> Result<RunReport, RolloverError> {
        tracing::info!(
            "Rolling keys for {} domains as of {}",
            self.domains.len(),
            self.ctx.current_month
        );
        let mut sets = KeySets::load(&self.state_paths, &self.ctx)?;
        let mut changes = ChangeLog::new();

        for domain in &self.domains {
            for key_type in self.ctx.registry.iter() {
                let age = self.ensure_active(&mut sets, &mut changes, domain, key_type)?;
                self.provision_future(&mut sets, &mut changes, domain, key_type, age)?;
            }
        }

        self.sweep(&mut sets, &mut changes)?;

        let mut written = Vec::new();
        for set in [&mut sets.active, &mut sets.future, &mut sets.expired] {
            if set.persist_if_changed()? {
                written.push(set.category());
            }
        }

        if changes.is_empty() {
            tracing::info!("No keys added or removed");
        } else {
            tracing::info!(
                "{} keys added, {} removed",
                changes.count(ChangeAction::Add),
                changes.count(ChangeAction::Del)
            );
            if let Err(e) = self.notifier.notify(&changes.to_args()) {
                tracing::error!("Change notification failed: {}", e);
            }
        }

        Ok(RunReport { changes, written })
    }

    /// Make sure `domain` has an active key of `key_type` and return its age.
    fn ensure_active(
        &self,
        sets: &mut KeySets,
        changes: &mut ChangeLog,
        domain: &str,
        key_type: &KeyTypeDefinition,
    ) -> Result<i32, RolloverError> {
        let name = key_type.name.as_str();

        if let Some(key) = sets.active.find(domain, name, LifecycleState::Active) {
            tracing::debug!("{} {}: keeping active key {}", domain, name, key.selector());
            return Ok(key.age());
        }

        if let Some(key) = sets.future.take(domain, name, LifecycleState::Active) {
            tracing::info!("{} {}: promoting future key {}", domain, name, key.selector());
            let age = key.age();
            sets.active.add(key);
            return Ok(age);
        }

        if let Some(key) = sets.active.find_mut(domain, name, LifecycleState::Expired) {
            tracing::warn!(
                "{} {}: no successor ready, key {} keeps signing {} months past its active period",
                domain,
                name,
                key.selector(),
                key.age() - self.ctx.lifetimes.active_months() + 1
            );
            key.extend_grace();
            return Ok(key.age());
        }

        tracing::info!("{} {}: no usable key, creating one", domain, name);
        let key = self.create(changes, domain, key_type, 0)?;
        let age = key.age();
        sets.active.add(key);
        Ok(age)
    }

    /// Create the successor once the active key is within the future period of expiring.
    fn provision_future(
        &self,
        sets: &mut KeySets,
        changes: &mut ChangeLog,
        domain: &str,
        key_type: &KeyTypeDefinition,
        active_age: i32,
    ) -> Result<(), RolloverError> {
        let lifetimes = &self.ctx.lifetimes;
        if !lifetimes.needs_successor(active_age) {
            return Ok(());
        }
        if sets
            .future
            .find(domain, &key_type.name, LifecycleState::Future)
            .is_some()
        {
            return Ok(());
        }

        tracing::info!("{} {}: creating successor key", domain, key_type.name);
        let key = self.create(changes, domain, key_type, lifetimes.future_months())?;
        sets.future.add(key);
        Ok(())
    }

    fn create(
        &self,
        changes: &mut ChangeLog,
        domain: &str,
        key_type: &KeyTypeDefinition,
        month_offset: i32,
    ) -> Result<Key, RolloverError> {
        Key::create(&self.ctx, self.generator, changes, domain, key_type, month_offset).map_err(
            |source| RolloverError::Creation {
                domain: domain.to_string(),
                key_type: key_type.name.clone(),
                source,
            },
        )
    }

    /// Demote keys that left the active or future window, retire dead and invalid ones.
    fn sweep(&self, sets: &mut KeySets, changes: &mut ChangeLog) -> Result<(), RolloverError> {
        let mut retired = Vec::new();

        for set in [&mut sets.active, &mut sets.future] {
            for key in set.partition_by_expected_state() {
                if key.state() == LifecycleState::Expired {
                    tracing::info!(
                        "{}: key {} expired, keeping its record published",
                        key.domain(),
                        key.selector()
                    );
                    sets.expired.add(key);
                } else {
                    retired.push(key);
                }
            }
        }
        retired.extend(sets.expired.partition_by_expected_state());

        for key in retired {
            if sets.references(&key) {
                tracing::debug!(
                    "Dropping stale {} entry for {}, the file belongs to a live key",
                    key.state(),
                    key.key_path().display()
                );
                continue;
            }
            if !key.is_valid() {
                tracing::warn!("Removing invalid key: {}", key.validation());
            }
            key.delete(&self.ctx, changes).map_err(RolloverError::Retire)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::path::Path;

    use super::*;
    use crate::hooks::{MockKeyGenerator, RecordingNotifier};
    use crate::keys::{KeyTypeRegistry, Lifetimes, MonthIndex};

    fn context(key_dir: &Path, month: MonthIndex) -> KeyContext {
        KeyContext {
            key_dir: key_dir.to_path_buf(),
            archive_dir: None,
            lifetimes: Lifetimes::new(
                NonZeroU32::new(1).unwrap(),
                NonZeroU32::new(3).unwrap(),
                NonZeroU32::new(1).unwrap(),
            ),
            current_month: month,
            registry: KeyTypeRegistry::from_definitions([KeyTypeDefinition::new(
                "ed25519",
                vec![],
            )])
            .unwrap(),
        }
    }

    fn paths(dir: &Path) -> StatePaths {
        StatePaths {
            active: dir.join("active.json"),
            future: dir.join("future.json"),
            expired: dir.join("expired.json"),
        }
    }

    fn run_at(
        dir: &Path,
        month: MonthIndex,
        generator: &MockKeyGenerator,
        notifier: &RecordingNotifier,
    ) -> Result<RunReport, RolloverError> {
        RolloverEngine::new(
            context(dir, month),
            vec!["example.com".to_string()],
            paths(dir),
            generator,
            notifier,
        )
        .run()
    }

    #[test]
    fn test_first_run_creates_active_key() {
        let dir = tempfile::tempdir().unwrap();
        let month = MonthIndex::new(2026, 10).unwrap();
        let generator = MockKeyGenerator::new();
        let notifier = RecordingNotifier::new();

        let report = run_at(dir.path(), month, &generator, &notifier).unwrap();
        assert!(report.has_changes());
        assert_eq!(report.changes.count(ChangeAction::Add), 1);
        assert_eq!(report.written, vec![Category::Active]);

        let key_path = dir.path().join("202610_ed25519_example.com.key");
        assert!(key_path.exists());
        assert!(dir.path().join("202610_ed25519_example.com.txt").exists());
        assert_eq!(
            notifier.calls(),
            vec![vec![
                "add".to_string(),
                "example.com".to_string(),
                "202610-ed25519".to_string(),
                dir.path()
                    .join("202610_ed25519_example.com.txt")
                    .to_string_lossy()
                    .into_owned(),
            ]]
        );
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let month = MonthIndex::new(2026, 10).unwrap();
        let generator = MockKeyGenerator::new();
        let notifier = RecordingNotifier::new();

        run_at(dir.path(), month, &generator, &notifier).unwrap();
        let report = run_at(dir.path(), month, &generator, &notifier).unwrap();
        assert!(!report.has_changes());
        assert!(report.written.is_empty());
        assert_eq!(notifier.calls().len(), 1);
        assert_eq!(generator.generated().len(), 1);
    }

    #[test]
    fn test_generation_failure_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let month = MonthIndex::new(2026, 10).unwrap();
        let generator = MockKeyGenerator::new().fail_for_domain("example.com");
        let notifier = RecordingNotifier::new();

        let err = run_at(dir.path(), month, &generator, &notifier).unwrap_err();
        assert!(matches!(err, RolloverError::Creation { ref domain, .. } if domain == "example.com"));
        assert!(!dir.path().join("active.json").exists());
        assert!(notifier.calls().is_empty());
    }

    #[test]
    fn test_missing_key_file_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let month = MonthIndex::new(2026, 10).unwrap();
        let generator = MockKeyGenerator::new().skip_key_file();
        let notifier = RecordingNotifier::new();

        let err = run_at(dir.path(), month, &generator, &notifier).unwrap_err();
        assert!(matches!(
            err,
            RolloverError::Creation {
                source: KeyError::Inconsistent { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_grace_continuation_keeps_expired_key_active() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockKeyGenerator::new();
        let notifier = RecordingNotifier::new();

        run_at(dir.path(), MonthIndex::new(2026, 1).unwrap(), &generator, &notifier).unwrap();

        // Skipping the months where the successor would have been created.
        let engine_month = MonthIndex::new(2026, 4).unwrap();
        let ctx = context(dir.path(), engine_month);
        let active =
            KeyConfigSet::load(Category::Active, dir.path().join("active.json"), &ctx).unwrap();
        assert!(active
            .find("example.com", "ed25519", LifecycleState::Expired)
            .is_some());

        let report = run_at(dir.path(), engine_month, &generator, &notifier).unwrap();
        // The expired key keeps signing, only a successor is added.
        let added: Vec<_> = report
            .changes
            .entries()
            .iter()
            .map(|c| (c.action, c.selector.clone()))
            .collect();
        assert_eq!(added, vec![(ChangeAction::Add, "202605-ed25519".to_string())]);
        assert!(dir.path().join("202601_ed25519_example.com.key").exists());
        assert!(!report.written.contains(&Category::Active));
    }
}
