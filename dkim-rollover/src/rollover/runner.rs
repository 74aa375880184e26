//!
//! Wires a [`ConfigToml`] to the engine and its external commands.
//!

use std::io::Write;

use anyhow::Context;

use super::{LockError, RolloverEngine, RunLock, RunReport, StatePaths};
use crate::config::ConfigToml;
use crate::hooks::{CommandKeyGenerator, CommandNotifier, NoopNotifier, Notifier};
use crate::keys::{Category, KeyConfigSet, LifecycleState, MonthIndex};

impl StatePaths {
    pub fn from_config(config: &ConfigToml) -> Self {
        Self {
            active: config.state_path(Category::Active),
            future: config.state_path(Category::Future),
            expired: config.state_path(Category::Expired),
        }
    }
}

/// Run one rollover pass for the current month under the run lock.
pub fn run(config: &ConfigToml) -> anyhow::Result<RunReport> {
    run_at(config, MonthIndex::current())
}

/// Like [`run`] with an explicit current month.
pub fn run_at(config: &ConfigToml, current_month: MonthIndex) -> anyhow::Result<RunReport> {
    let ctx = config.key_context(current_month)?;
    let lock_path = config.lock_file_path();
    let _lock = RunLock::acquire(&lock_path).map_err(|e| match e {
        LockError::AlreadyRunning { .. } => anyhow::anyhow!("{e}, is another instance running?"),
        e => anyhow::Error::new(e),
    })?;

    let generator = CommandKeyGenerator::new(&config.keygen.command)
        .context("invalid [keygen] command")?;
    let notifier: Box<dyn Notifier> = match CommandNotifier::new(&config.notify.command) {
        Some(notifier) => Box::new(notifier),
        None => Box::new(NoopNotifier),
    };

    let engine = RolloverEngine::new(
        ctx,
        config.domain_names(),
        StatePaths::from_config(config),
        &generator,
        notifier.as_ref(),
    );
    Ok(engine.run()?)
}

/// Print every known key with its derived state. Never writes.
pub fn status(config: &ConfigToml, current_month: MonthIndex, out: &mut impl Write) -> anyhow::Result<()> {
    let ctx = config.key_context(current_month)?;
    let paths = StatePaths::from_config(config);

    writeln!(
        out,
        "{:<8} {:<24} {:<20} {:<8} {:<7} {:>4} STATE",
        "SET", "DOMAIN", "SELECTOR", "TYPE", "FROM", "AGE"
    )?;
    let mut sets = Category::ALL
        .into_iter()
        .map(|category| KeyConfigSet::load(category, paths.get(category), &ctx))
        .collect::<Result<Vec<_>, _>>()?;
    mark_grace_keys(&mut sets);

    for set in &sets {
        for key in set.iter() {
            let valid_from = key
                .valid_from()
                .map(|month| month.to_string())
                .unwrap_or_else(|| "-".to_string());
            let state = if key.is_grace_extended() {
                format!("{} (grace)", key.state())
            } else {
                key.state().to_string()
            };
            writeln!(
                out,
                "{:<8} {:<24} {:<20} {:<8} {:<7} {:>4} {}",
                set.category().to_string(),
                key.domain(),
                key.selector(),
                key.key_type(),
                valid_from,
                key.age(),
                state
            )?;
            if !key.is_valid() {
                writeln!(out, "         {}", key.validation())?;
            }
        }
    }
    Ok(())
}

/// Extend the expired active keys the next run would keep signing with,
/// the ones with no active successor in either the active or the future set.
fn mark_grace_keys(sets: &mut [KeyConfigSet]) {
    let has_active = |sets: &[KeyConfigSet], domain: &str, key_type: &str| {
        sets.iter()
            .filter(|set| matches!(set.category(), Category::Active | Category::Future))
            .any(|set| set.find(domain, key_type, LifecycleState::Active).is_some())
    };

    let view: &[KeyConfigSet] = sets;
    let mut stranded: Vec<(String, String)> = Vec::new();
    for set in view.iter().filter(|set| set.category() == Category::Active) {
        for key in set.iter().filter(|key| key.state() == LifecycleState::Expired) {
            let pair = (key.domain().to_string(), key.key_type().to_string());
            if !has_active(view, &pair.0, &pair.1) && !stranded.contains(&pair) {
                stranded.push(pair);
            }
        }
    }

    for set in sets.iter_mut().filter(|set| set.category() == Category::Active) {
        for (domain, key_type) in &stranded {
            if let Some(key) = set.find_mut(domain, key_type, LifecycleState::Expired) {
                key.extend_grace();
            }
        }
    }
}
