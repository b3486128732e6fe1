//! External identity helper used by the auto-refresh strategy.
//!
//! The helper is a CLI that prints an identity token for the operator's
//! account, by default `gcloud auth print-identity-token`.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CredentialError;
use crate::secret::Secret;

/// Default identity helper invocation.
pub const DEFAULT_IDENTITY_COMMAND: &[&str] = &["gcloud", "auth", "print-identity-token"];

/// Source of short-lived identity tokens.
///
/// Implemented by [`CommandIdentityHelper`]; tests substitute their own.
#[async_trait]
pub trait IdentityHelper: Send + Sync {
    /// Obtain a fresh identity token.
    async fn identity_token(&self) -> Result<Secret, CredentialError>;
}

/// Runs an external command and reads the token from its stdout.
#[derive(Debug, Clone)]
pub struct CommandIdentityHelper {
    program: String,
    args: Vec<String>,
}

impl CommandIdentityHelper {
    /// Helper running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full command line, program first.
    ///
    /// Returns `None` for an empty command.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl Default for CommandIdentityHelper {
    fn default() -> Self {
        Self::new(
            DEFAULT_IDENTITY_COMMAND[0],
            DEFAULT_IDENTITY_COMMAND[1..].iter().map(|s| s.to_string()).collect(),
        )
    }
}

#[async_trait]
impl IdentityHelper for CommandIdentityHelper {
    async fn identity_token(&self) -> Result<Secret, CredentialError> {
        tracing::debug!("Running identity helper {}", self.program);

        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CredentialError::RefreshFailed {
                message: format!("could not run {} (is it installed?): {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::RefreshFailed {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(CredentialError::RefreshFailed {
                message: format!("{} printed no token", self.program),
            });
        }

        Ok(Secret::new(token))
    }
}
