//! Language runtime adapters.
//!
//! The invoker stays language-agnostic. Each adapter knows how to probe its interpreter,
//! install a project's dependencies and inject the wrapper bridging the agent's JSON
//! protocol to the user's `handler(context, params)` function.
//!
//! Wire protocol shared with every wrapper: stdout carries exactly one JSON value (the
//! handler's return value), stderr carries one log line per `context.logger.log` call.

pub mod node;
pub mod python;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::process::Command;

use crate::error::{InvokeError, ProbeError, Result};
use crate::types::{InvocationScope, PreparedCommand};

pub use node::NodeRuntime;
pub use python::PythonRuntime;

/// Upper bound for a version probe, so a hung interpreter cannot stall startup
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter contract for a language runtime
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Name clients use to select this runtime
    fn name(&self) -> &'static str;

    /// Report the interpreter version installed on the host
    async fn probe_version(&self) -> std::result::Result<String, ProbeError>;

    /// Install dependencies if needed, inject the wrapper and build the command running it
    async fn prepare(&self, scope: InvocationScope<'_>) -> Result<PreparedCommand>;
}

/// Adapters shipped with the agent
pub fn builtin() -> Vec<Arc<dyn Runtime>> {
    vec![Arc::new(NodeRuntime), Arc::new(PythonRuntime)]
}

/// Run a version command and return its trimmed output
///
/// # Errors
///
/// Fails if the command cannot be spawned, exits non-zero, hangs past [`PROBE_TIMEOUT`]
/// or prints nothing.
pub async fn probe_command(program: &str, args: &[&str]) -> std::result::Result<String, ProbeError> {
    let command = display_command(program, args);

    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ProbeError::TimedOut {
        command: command.clone(),
        timeout: PROBE_TIMEOUT,
    })?
    .map_err(|source| ProbeError::Spawn {
        command: command.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ProbeError::NonZeroExit {
            command,
            code: output.status.code(),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if version.is_empty() {
        return Err(ProbeError::EmptyOutput { command });
    }

    Ok(version)
}

/// Run `program args` inside `workdir` when `manifest` exists there.
///
/// Installer output is only traced; it never reaches the caller. Returns whether the
/// install step ran.
///
/// # Errors
///
/// Returns [`InvokeError::DependencyInstall`] if the installer cannot start or fails.
pub async fn install_dependencies(
    runtime: &str,
    workdir: &Path,
    manifest: &str,
    program: &str,
    args: &[&str],
) -> Result<bool> {
    if matches!(tokio::fs::try_exists(workdir.join(manifest)).await, Ok(false)) {
        return Ok(false);
    }

    debug!("runtime/{runtime}: {manifest} detected in {}", workdir.display());
    let command = display_command(program, args);
    let failed = |reason: String| InvokeError::DependencyInstall {
        runtime: runtime.to_string(),
        reason,
    };

    let output = Command::new(program)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| failed(format!("failed to run `{command}`: {e}")))?;

    trace!(
        "runtime/{runtime}: `{command}` stdout:\n{}",
        String::from_utf8_lossy(&output.stdout)
    );
    trace!(
        "runtime/{runtime}: `{command}` stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    if !output.status.success() {
        return Err(failed(match output.status.code() {
            Some(code) => format!("`{command}` exited with code {code}"),
            None => format!("`{command}` was terminated by a signal"),
        }));
    }

    debug!("runtime/{runtime}: dependencies installed");
    Ok(true)
}

/// Write the generated wrapper program for this invocation into its working directory
///
/// # Errors
///
/// Returns [`InvokeError::Wrapper`] if the file cannot be written.
pub async fn inject_wrapper(
    runtime: &str,
    scope: &InvocationScope<'_>,
    extension: &str,
    source: &str,
) -> Result<PathBuf> {
    let file_name = scope.wrapper_file(extension);
    let path = scope.workdir.join(&file_name);

    tokio::fs::write(&path, source)
        .await
        .map_err(|source| InvokeError::Wrapper {
            runtime: runtime.to_string(),
            source,
        })?;

    debug!("[{}] runtime/{runtime}: wrapper injected as {file_name}", scope.id);
    Ok(PathBuf::from(file_name))
}

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FnParams, InvocationId};

    #[tokio::test]
    async fn test_probe_trims_trailing_whitespace() {
        let version = probe_command("sh", &["-c", "printf 'v1.2.3 \\n\\n'"])
            .await
            .expect("probe should succeed");
        assert_eq!(version, "v1.2.3");
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let err = probe_command("definitely-not-an-interpreter", &["-v"])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn test_probe_non_zero_exit() {
        let err = probe_command("sh", &["-c", "echo 1.0; exit 3"]).await.unwrap_err();
        assert!(
            matches!(err, ProbeError::NonZeroExit { code: Some(3), .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_probe_empty_output() {
        let err = probe_command("sh", &["-c", "true"]).await.unwrap_err();
        assert!(matches!(err, ProbeError::EmptyOutput { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn test_install_skipped_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ran = install_dependencies("shell", dir.path(), "deps.sh", "sh", &["deps.sh"])
            .await
            .expect("missing manifest is not an error");
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_install_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deps.sh"), "touch installed\n").unwrap();

        let ran = install_dependencies("shell", dir.path(), "deps.sh", "sh", &["deps.sh"])
            .await
            .expect("install should succeed");
        assert!(ran);
        assert!(dir.path().join("installed").exists());
    }

    #[tokio::test]
    async fn test_install_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deps.sh"), "echo boom >&2; exit 1\n").unwrap();

        let err = install_dependencies("shell", dir.path(), "deps.sh", "sh", &["deps.sh"])
            .await
            .unwrap_err();
        match err {
            InvokeError::DependencyInstall { runtime, reason } => {
                assert_eq!(runtime, "shell");
                assert!(reason.contains("exited with code 1"), "got: {reason}");
                assert!(!reason.contains("boom"), "installer output must not leak");
            }
            other => panic!("expected DependencyInstall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inject_wrapper_named_after_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let id = InvocationId::generate();
        let params = FnParams::new();
        let scope = InvocationScope {
            id: &id,
            workdir: dir.path(),
            params: &params,
        };

        let file = inject_wrapper("shell", &scope, "sh", "echo hi\n").await.unwrap();
        assert_eq!(file, PathBuf::from(format!("{id}.sh")));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(&file)).unwrap(),
            "echo hi\n"
        );
    }

    #[test]
    fn test_builtin_names() {
        let names: Vec<&str> = builtin().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["node", "python"]);
    }
}
