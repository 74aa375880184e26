//!
//! External key generation.
//!
//! The rollover engine never touches key material itself. It asks a
//! [`KeyGenerator`] to write the private key to a path and hand back the DNS
//! record text for it.
//!

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use crate::keys::KeyTypeDefinition;

/// Everything the generator needs to produce one key.
#[derive(Debug, Clone, Copy)]
pub struct KeyGenRequest<'a> {
    pub key_type: &'a KeyTypeDefinition,
    pub domain: &'a str,
    pub selector: &'a str,
    pub key_path: &'a Path,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyGenError {
    #[error("key generator command is empty")]
    EmptyCommand,
    #[error("failed to start key generator '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("key generator '{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("key generator refused the request: {0}")]
    Rejected(String),
}

/// Produces a private key file and returns the DNS record text for it.
pub trait KeyGenerator {
    fn generate(&self, request: &KeyGenRequest<'_>) -> Result<String, KeyGenError>;
}

/// Runs an external command, `rspamadm dkim_keygen` style:
///
/// `<command...> -t <type> -d <domain> -s <selector> -k <key_path> <type args...>`
///
/// The DNS record is read from the command's standard output.
#[derive(Debug, Clone)]
pub struct CommandKeyGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandKeyGenerator {
    pub fn new(command: &[String]) -> Result<Self, KeyGenError> {
        let (program, args) = command.split_first().ok_or(KeyGenError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn arguments(&self, request: &KeyGenRequest<'_>) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "-t".to_string(),
            request.key_type.name.clone(),
            "-d".to_string(),
            request.domain.to_string(),
            "-s".to_string(),
            request.selector.to_string(),
            "-k".to_string(),
            request.key_path.to_string_lossy().into_owned(),
        ]);
        args.extend(request.key_type.args.iter().cloned());
        args
    }
}

impl KeyGenerator for CommandKeyGenerator {
    fn generate(&self, request: &KeyGenRequest<'_>) -> Result<String, KeyGenError> {
        let args = self.arguments(request);
        tracing::debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| KeyGenError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(KeyGenError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// In-process generator for tests.
///
/// Writes a placeholder key file and returns a TXT record naming the selector.
/// Can be told to fail for given domains or to "forget" writing the key file.
#[derive(Debug, Default)]
pub struct MockKeyGenerator {
    failing_domains: Vec<String>,
    skip_key_file: bool,
    generated: Mutex<Vec<PathBuf>>,
}

impl MockKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request for `domain`.
    pub fn fail_for_domain(mut self, domain: &str) -> Self {
        self.failing_domains.push(domain.to_string());
        self
    }

    /// Report success without writing the key file.
    pub fn skip_key_file(mut self) -> Self {
        self.skip_key_file = true;
        self
    }

    /// Key paths generated so far, in order.
    pub fn generated(&self) -> Vec<PathBuf> {
        self.generated
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

impl KeyGenerator for MockKeyGenerator {
    fn generate(&self, request: &KeyGenRequest<'_>) -> Result<String, KeyGenError> {
        if self.failing_domains.iter().any(|d| d == request.domain) {
            return Err(KeyGenError::Rejected(format!(
                "mock generator fails for {}",
                request.domain
            )));
        }
        if !self.skip_key_file {
            std::fs::write(
                request.key_path,
                format!("mock {} private key\n", request.key_type.name),
            )
            .map_err(|source| KeyGenError::Spawn {
                program: "mock".to_string(),
                source,
            })?;
        }
        if let Ok(mut generated) = self.generated.lock() {
            generated.push(request.key_path.to_path_buf());
        }
        Ok(format!(
            "{}._domainkey IN TXT ( \"v=DKIM1; k={}; p=MOCK\" ) ;\n",
            request.selector, request.key_type.name
        ))
    }
}
