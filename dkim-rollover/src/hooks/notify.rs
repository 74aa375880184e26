//! Hook telling downstream DNS / reload automation which records changed.

use std::process::Command;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to start notification command '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("notification command '{program}' exited with {status}")]
    Failed { program: String, status: String },
}

/// Receives the flat `add|del domain selector record_path ...` argument list.
pub trait Notifier {
    fn notify(&self, args: &[String]) -> Result<(), NotifyError>;
}

/// Appends the change arguments to a configured command and runs it.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// `None` when the command is empty, meaning notification is disabled.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, args: &[String]) -> Result<(), NotifyError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .status()
            .map_err(|source| NotifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(NotifyError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Used when no notification command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, args: &[String]) -> Result<(), NotifyError> {
        tracing::debug!(
            "No notification command configured, skipping {} change arguments",
            args.len()
        );
        Ok(())
    }
}

/// Keeps every invocation in memory. For tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, args: &[String]) -> Result<(), NotifyError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(args.to_vec());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_disables_notifier() {
        assert!(CommandNotifier::new(&[]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_receives_args() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args.txt");
        let script = format!("echo \"$@\" > {}", out.display());
        let notifier = CommandNotifier::new(&[
            "sh".to_string(),
            "-c".to_string(),
            script,
            "notify".to_string(),
        ])
        .unwrap();
        let args: Vec<String> = ["add", "example.com", "202610-rsa", "/k/x.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        notifier.notify(&args).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "add example.com 202610-rsa /k/x.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_is_reported() {
        let notifier =
            CommandNotifier::new(&["sh".to_string(), "-c".to_string(), "exit 1".to_string()])
                .unwrap();
        assert!(matches!(
            notifier.notify(&[]),
            Err(NotifyError::Failed { .. })
        ));
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(&["del".to_string()]).unwrap();
        assert_eq!(notifier.calls(), vec![vec!["del".to_string()]]);
    }
}
