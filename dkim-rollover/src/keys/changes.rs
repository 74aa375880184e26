use std::fmt::{self, Display};
use std::path::PathBuf;

/// Whether a key's DNS record should be published or withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Add,
    Del,
}

impl Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Add => f.write_str("add"),
            ChangeAction::Del => f.write_str("del"),
        }
    }
}

/// A key that was created or removed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: ChangeAction,
    pub domain: String,
    pub selector: String,
    pub record_path: PathBuf,
}

/// Ordered changes of one run, handed to the notification hook once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    entries: Vec<Change>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        action: ChangeAction,
        domain: impl Into<String>,
        selector: impl Into<String>,
        record_path: impl Into<PathBuf>,
    ) {
        self.entries.push(Change {
            action,
            domain: domain.into(),
            selector: selector.into(),
            record_path: record_path.into(),
        });
    }

    pub fn entries(&self) -> &[Change] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.entries.iter().filter(|c| c.action == action).count()
    }

    /// Flat `action domain selector record_path` quadruples, in recording order.
    pub fn to_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|change| {
                [
                    change.action.to_string(),
                    change.domain.clone(),
                    change.selector.clone(),
                    change.record_path.to_string_lossy().into_owned(),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_are_flat_quadruples() {
        let mut log = ChangeLog::new();
        log.record(
            ChangeAction::Add,
            "example.com",
            "202611-ed25519",
            "/keys/202611_ed25519_example.com.txt",
        );
        log.record(
            ChangeAction::Del,
            "example.org",
            "202501-rsa",
            "/keys/202501_rsa_example.org.txt",
        );

        assert_eq!(
            log.to_args(),
            vec![
                "add",
                "example.com",
                "202611-ed25519",
                "/keys/202611_ed25519_example.com.txt",
                "del",
                "example.org",
                "202501-rsa",
                "/keys/202501_rsa_example.org.txt",
            ]
        );
        assert_eq!(log.count(ChangeAction::Add), 1);
        assert_eq!(log.count(ChangeAction::Del), 1);
    }

    #[test]
    fn test_empty_log() {
        let log = ChangeLog::new();
        assert!(log.is_empty());
        assert!(log.to_args().is_empty());
    }
}
