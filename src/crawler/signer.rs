//! Query signing
//!
//! The upstream rejects queries that do not carry a valid anti-tampering token.
//! The signing algorithm lives outside this crate; a `Signer` receives the
//! encoded query string and returns it with the token appended.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors raised by a signer
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Failed to run signer command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Signer command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Signer produced invalid output: {0}")]
    InvalidOutput(String),
}

/// Produces a signed query string
///
/// Signing runs inside a page attempt, so dropping the returned future must
/// abandon the work.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, query: &str) -> Result<String, SignerError>;
}

/// Returns queries unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSigner;

#[async_trait]
impl Signer for PassthroughSigner {
    async fn sign(&self, query: &str) -> Result<String, SignerError> {
        Ok(query.to_string())
    }
}

/// Delegates signing to an external program
///
/// The query is written to the program's stdin and the first non-empty line of
/// its stdout is taken as the signed query. The child is killed if the signing
/// future is dropped, e.g. when the session is cancelled mid-attempt.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
}

impl CommandSigner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> SignerError {
        SignerError::Spawn {
            command: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl Signer for CommandSigner {
    async fn sign(&self, query: &str) -> Result<String, SignerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that exits without reading stdin is judged by its exit status
            if let Err(e) = stdin.write_all(query.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(self.spawn_error(e));
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(SignerError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| SignerError::InvalidOutput(e.to_string()))?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SignerError::InvalidOutput("empty output".to_string()))
    }
}
