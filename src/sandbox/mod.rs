//! Execution sandbox
//!
//! Every external tool runs through [`Sandbox::run`]: one disposable
//! environment per call, inputs materialised before the command starts,
//! stdout and stderr captured separately.

mod docker;
mod mock;

pub use docker::{check_docker, DockerSandbox, DOCKER_SOCKET_PATH};
pub use mock::MockSandbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("Container {operation} failed: {message}")]
    Runtime { operation: String, message: String },

    #[error("Invalid input {path}: {message}")]
    InvalidInput { path: String, message: String },

    #[error("Command exited with status {code}: {stderr}")]
    NonZeroExit {
        code: i64,
        stdout: String,
        stderr: String,
    },

    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Execution cancelled")]
    Cancelled,
}

impl SandboxError {
    pub fn runtime(operation: &str, err: impl std::fmt::Display) -> Self {
        SandboxError::Runtime {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SandboxError::Cancelled)
    }
}

/// Something placed into the sandbox before the command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Host directory bind-mounted read-only at `mount_path`
    HostDir { host: PathBuf, mount_path: String },
    /// Single host file bind-mounted read-only at `mount_path`
    HostFile { host: PathBuf, mount_path: String },
    /// Inline content written to `mount_path` inside the sandbox
    Content { mount_path: String, content: String },
}

impl Input {
    pub fn mount_path(&self) -> &str {
        match self {
            Input::HostDir { mount_path, .. }
            | Input::HostFile { mount_path, .. }
            | Input::Content { mount_path, .. } => mount_path,
        }
    }
}

/// Full description of one sandboxed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub image: String,
    pub command: String,
    pub args: Vec<String>,
    pub inputs: Vec<Input>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<String>,
    /// Treat any exit status as completion; the caller inspects the output.
    pub accept_any_exit: bool,
}

impl ExecSpec {
    pub fn new(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: command.into(),
            args: Vec::new(),
            inputs: Vec::new(),
            env: BTreeMap::new(),
            workdir: None,
            accept_any_exit: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn host_dir(self, host: impl Into<PathBuf>, mount_path: impl Into<String>) -> Self {
        self.input(Input::HostDir {
            host: host.into(),
            mount_path: mount_path.into(),
        })
    }

    pub fn host_file(self, host: impl Into<PathBuf>, mount_path: impl Into<String>) -> Self {
        self.input(Input::HostFile {
            host: host.into(),
            mount_path: mount_path.into(),
        })
    }

    pub fn content(self, mount_path: impl Into<String>, content: impl Into<String>) -> Self {
        self.input(Input::Content {
            mount_path: mount_path.into(),
            content: content.into(),
        })
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn accept_any_exit(mut self, accept: bool) -> Self {
        self.accept_any_exit = accept;
        self
    }

    /// Shell form: `sh -c <script>`
    pub fn shell(image: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(image, "sh").arg("-c").arg(script)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecStatus {
    Success,
    NonZeroExit(i64),
    NoOutput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i64) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(stdout, "", 0)
    }

    pub fn status(&self) -> ExecStatus {
        if self.exit_code != 0 {
            ExecStatus::NonZeroExit(self.exit_code)
        } else if self.stdout.trim().is_empty() && self.stderr.trim().is_empty() {
            ExecStatus::NoOutput
        } else {
            ExecStatus::Success
        }
    }

    /// stdout, or stderr when the tool wrote nothing to stdout
    pub fn primary_text(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Applies the exit policy of `spec` to a finished run.
pub fn check_exit(spec: &ExecSpec, output: ExecOutput) -> Result<ExecOutput, SandboxError> {
    if output.exit_code != 0 && !spec.accept_any_exit {
        return Err(SandboxError::NonZeroExit {
            code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(
        &self,
        spec: &ExecSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, SandboxError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_spec_builder() {
        let spec = ExecSpec::new("aquasec/trivy:latest", "trivy")
            .args(["fs", "--format", "json"])
            .arg("/src")
            .host_dir("/tmp/project", "/src")
            .content("/etc/config.yml", "a: 1")
            .env("TRIVY_QUIET", "true")
            .workdir("/src")
            .accept_any_exit(true);

        assert_eq!(spec.args, vec!["fs", "--format", "json", "/src"]);
        assert_eq!(spec.inputs.len(), 2);
        assert_eq!(spec.inputs[1].mount_path(), "/etc/config.yml");
        assert_eq!(spec.env.get("TRIVY_QUIET"), Some(&"true".to_string()));
        assert_eq!(spec.workdir.as_deref(), Some("/src"));
        assert!(spec.accept_any_exit);
    }

    #[test]
    fn test_shell_spec() {
        let spec = ExecSpec::shell("alpine", "echo hi");
        assert_eq!(spec.command, "sh");
        assert_eq!(spec.args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn test_exec_status() {
        assert_eq!(ExecOutput::success("ok").status(), ExecStatus::Success);
        assert_eq!(ExecOutput::success("  \n").status(), ExecStatus::NoOutput);
        assert_eq!(
            ExecOutput::new("", "boom", 2).status(),
            ExecStatus::NonZeroExit(2)
        );
    }

    #[test]
    fn test_check_exit_policy() {
        let strict = ExecSpec::new("img", "cmd");
        let lenient = ExecSpec::new("img", "cmd").accept_any_exit(true);
        let failed = ExecOutput::new("findings", "", 1);

        assert!(matches!(
            check_exit(&strict, failed.clone()),
            Err(SandboxError::NonZeroExit { code: 1, .. })
        ));
        assert_eq!(check_exit(&lenient, failed.clone()).unwrap(), failed);
    }

    #[test]
    fn test_primary_text_falls_back_to_stderr() {
        assert_eq!(ExecOutput::new("", "only stderr", 0).primary_text(), "only stderr");
        assert_eq!(ExecOutput::new("out", "err", 0).primary_text(), "out");
    }
}
