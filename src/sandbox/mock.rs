use super::{check_exit, ExecOutput, ExecSpec, Sandbox, SandboxError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Scripted sandbox: outputs are served in FIFO order, every spec is
/// recorded, and the exit policy of each spec is applied as Docker would.
pub struct MockSandbox {
    outputs: Mutex<VecDeque<Result<ExecOutput, SandboxError>>>,
    specs: Mutex<Vec<ExecSpec>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self {
            outputs: Mutex::new(VecDeque::new()),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn add_output(&self, output: ExecOutput) {
        self.outputs.lock().unwrap().push_back(Ok(output));
    }

    pub fn add_stdout(&self, stdout: impl Into<String>) {
        self.add_output(ExecOutput::success(stdout));
    }

    pub fn add_error(&self, error: SandboxError) {
        self.outputs.lock().unwrap().push_back(Err(error));
    }

    pub fn remaining_outputs(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }

    /// Every spec passed to `run`, oldest first
    pub fn specs(&self) -> Vec<ExecSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.specs.lock().unwrap().len()
    }
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn run(
        &self,
        spec: &ExecSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        self.specs.lock().unwrap().push(spec.clone());

        let next = self.outputs.lock().unwrap().pop_front();
        match next {
            Some(Ok(output)) => check_exit(spec, output),
            Some(Err(e)) => Err(e),
            None => Err(SandboxError::Unavailable(
                "MockSandbox: No more outputs in queue".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
