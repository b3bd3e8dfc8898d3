//! SW-011: External hook provisioner.
//!
//! Runs `<program> [args..] <verb> <kind> <name>` with JSON on stdin.
//! `create` receives the resolved config and must print a JSON object of
//! outputs; `delete` receives the recorded outputs. Non-zero exit is a
//! rejection carrying stderr.

use super::{ProviderError, Provisioner, ResolvedConfig};
use crate::core::types::{Outputs, ResourceKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Output from running the hook once.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Provisioner that shells out to a user-supplied program.
#[derive(Debug, Clone)]
pub struct HookProvisioner {
    program: PathBuf,
    args: Vec<String>,
}

impl HookProvisioner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Leading arguments placed before the verb (e.g. a script path).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn run(
        &self,
        verb: &str,
        kind: ResourceKind,
        name: &str,
        input: &str,
    ) -> Result<ExecOutput, ProviderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(verb)
            .arg(kind.to_string())
            .arg(name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin while draining stdout/stderr so neither side blocks
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok::<(), std::io::Error>(());
            };
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        match fed {
            Ok(()) => {}
            // The hook exited without reading all of its input
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(hook = %self.program.display(), verb, "hook closed stdin early");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn rejection(out: &ExecOutput) -> ProviderError {
    ProviderError::Rejected(format!("exit code {}: {}", out.exit_code, out.stderr.trim()))
}

/// Parse hook stdout into outputs. Empty stdout means no outputs.
fn parse_outputs(stdout: &str) -> Result<Outputs, ProviderError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Outputs::new());
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(ProviderError::Protocol(format!(
            "expected a JSON object of outputs, got {}",
            other
        ))),
        Err(e) => Err(ProviderError::Protocol(format!("invalid JSON outputs: {}", e))),
    }
}

#[async_trait]
impl Provisioner for HookProvisioner {
    fn name(&self) -> &str {
        "hook"
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        config: &ResolvedConfig,
    ) -> Result<Outputs, ProviderError> {
        let input = serde_json::to_string(config)
            .map_err(|e| ProviderError::Protocol(format!("cannot encode config: {}", e)))?;
        let out = self.run("create", kind, name, &input).await?;
        if !out.success() {
            return Err(rejection(&out));
        }
        parse_outputs(&out.stdout)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        outputs: &Outputs,
    ) -> Result<(), ProviderError> {
        let input = serde_json::to_string(outputs)
            .map_err(|e| ProviderError::Protocol(format!("cannot encode outputs: {}", e)))?;
        let out = self.run("delete", kind, name, &input).await?;
        if !out.success() {
            return Err(rejection(&out));
        }
        Ok(())
    }
}
