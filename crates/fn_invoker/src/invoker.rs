use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::Semaphore;

use crate::error::{InvokeError, Result};
use crate::executor::{ProcessExecutor, ProcessOutput};
use crate::registry::RuntimeRegistry;
use crate::stager::{Stager, WorkingDir};
use crate::types::{
    FnExecutionResult, InvocationId, InvocationRequest, InvocationScope, ProcessInfo, RuntimeInfo,
};

#[derive(Debug, Clone)]
pub struct InvokerOptions {
    /// Parent directory of every invocation's working directory
    pub staging_root: PathBuf,
    /// Invocations allowed to run at once, `0` means unbounded. The limit also backs
    /// [`Invoker::close`].
    pub max_concurrent_invocations: usize,
    /// Deadline after which a function process is killed
    pub timeout: Option<Duration>,
    /// Leave working directories on disk after invocations
    pub keep_workdirs: bool,
}

impl Default for InvokerOptions {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir().join("fnagent"),
            max_concurrent_invocations: 16,
            timeout: Some(Duration::from_secs(300)),
            keep_workdirs: false,
        }
    }
}

/// Turns invocation requests into measured process executions
pub struct Invoker {
    registry: Arc<RuntimeRegistry>,
    stager: Stager,
    executor: ProcessExecutor,
    admission: Arc<Semaphore>,
}

impl Invoker {
    pub fn new(registry: Arc<RuntimeRegistry>, options: InvokerOptions) -> Self {
        let permits = match options.max_concurrent_invocations {
            0 => Semaphore::MAX_PERMITS,
            limit => limit.min(Semaphore::MAX_PERMITS),
        };

        Self {
            registry,
            stager: Stager::new(options.staging_root).keep_workdirs(options.keep_workdirs),
            executor: ProcessExecutor::new(options.timeout),
            admission: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    /// Stop admitting invocations.
    ///
    /// Running invocations finish normally; queued and later ones fail with
    /// [`InvokeError::Admission`].
    pub fn close(&self) {
        if !self.admission.is_closed() {
            info!("Invoker closed, no further invocations are admitted");
            self.admission.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.admission.is_closed()
    }

    /// Execute one function.
    ///
    /// The code is staged before the runtime is resolved, so an unknown runtime still costs a
    /// download. The working directory is removed before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`InvokeError`] of the first stage that failed. A non-zero exit code is
    /// not an error; output that isn't valid JSON is.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<FnExecutionResult> {
        let id = InvocationId::generate();
        info!("[{id}] Assigned ID to {} function invocation", request.runtime);

        let result = self.invoke_with_id(&id, &request).await;
        match &result {
            Ok(res) => info!(
                "[{id}] Successfully processed invocation in {}ms",
                res.process.execution_time_ms
            ),
            Err(e) => error!("[{id}] Invocation failed: {e}"),
        }
        result
    }

    async fn invoke_with_id(
        &self,
        id: &InvocationId,
        request: &InvocationRequest,
    ) -> Result<FnExecutionResult> {
        let _permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| InvokeError::Admission)?;

        let workdir = self.stager.fetch_and_extract(&request.code_url, id).await?;
        let result = self.execute(id, request, &workdir).await;
        workdir.remove().await;

        result
    }

    async fn execute(
        &self,
        id: &InvocationId,
        request: &InvocationRequest,
        workdir: &WorkingDir,
    ) -> Result<FnExecutionResult> {
        let runtime = self
            .registry
            .lookup(&request.runtime)
            .ok_or_else(|| InvokeError::RuntimeUnavailable(request.runtime.clone()))?;

        let command = runtime
            .runtime()
            .prepare(InvocationScope {
                id,
                workdir: workdir.path(),
                params: &request.params,
            })
            .await?;
        debug!("[{id}] Command: {command}");

        let output = self.executor.run(&command).await?;
        debug!(
            "[{id}] '{command}' exited with exit code {} in {}ms",
            output.exit_code, output.elapsed_ms
        );

        assemble(runtime.info(), output)
    }
}

/// Build the invocation result from the raw process output
fn assemble(runtime: RuntimeInfo, output: ProcessOutput) -> Result<FnExecutionResult> {
    let logs = split_logs(&output.stderr);

    let payload = serde_json::from_slice(&output.stdout).map_err(|e| {
        InvokeError::InvalidFunctionOutput {
            exit_code: output.exit_code,
            logs: logs.clone(),
            reason: e.to_string(),
        }
    })?;

    Ok(FnExecutionResult {
        payload,
        process: ProcessInfo {
            runtime,
            exit_code: output.exit_code,
            execution_time_ms: output.elapsed_ms,
            logs,
        },
    })
}

/// One entry per stderr line; a final line break doesn't produce an empty entry
fn split_logs(stderr: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::to_string)
        .collect()
}
