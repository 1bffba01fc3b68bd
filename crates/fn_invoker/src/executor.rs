use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::error::{InvokeError, Result};
use crate::types::PreparedCommand;

/// Raw outcome of a child process; interpretation is left to the invoker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed_ms: u64,
}

/// Spawns prepared commands and waits for them, keeping stdout and stderr apart
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// `timeout` of `None` lets children run until they exit on their own
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `command` to completion.
    ///
    /// A non-zero exit is reported through [`ProcessOutput::exit_code`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Process`] if the command cannot be spawned or awaited and
    /// [`InvokeError::ExecutionTimeout`] if it outlives the deadline, in which case the
    /// child is killed.
    pub async fn run(&self, command: &PreparedCommand) -> Result<ProcessOutput> {
        let process_failed = |source: std::io::Error| InvokeError::Process {
            program: command.program.to_string_lossy().into_owned(),
            source,
        };

        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = cmd.spawn().map_err(process_failed)?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| InvokeError::ExecutionTimeout(limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(process_failed)?;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed_ms,
        })
    }
}
