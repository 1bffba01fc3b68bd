use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parameters handed to the user's handler as its second argument
pub type FnParams = serde_json::Map<String, serde_json::Value>;

/// A request to execute one function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Name of the runtime adapter, e.g. `node` or `python`
    pub runtime: String,
    /// URL of the gzip-compressed tar archive holding the function code
    pub code_url: String,
    #[serde(default)]
    pub params: FnParams,
}

/// Unique token correlating logs, the working directory and the injected wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationId(String);

impl InvocationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a runtime adapter needs to know about the invocation it prepares
#[derive(Debug, Clone, Copy)]
pub struct InvocationScope<'a> {
    pub id: &'a InvocationId,
    pub workdir: &'a Path,
    pub params: &'a FnParams,
}

impl InvocationScope<'_> {
    /// Parameters encoded as the single trailing argument of the wrapper
    pub fn params_json(&self) -> String {
        serde_json::Value::Object(self.params.clone()).to_string()
    }

    /// Wrapper file name for this invocation, e.g. `<id>.py`
    pub fn wrapper_file(&self, extension: &str) -> String {
        format!("{}.{extension}", self.id)
    }
}

/// Interpreter command produced by a runtime adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub workdir: PathBuf,
}

impl PreparedCommand {
    pub fn new(program: impl Into<OsString>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.workdir);
        cmd
    }
}

impl fmt::Display for PreparedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub runtime: RuntimeInfo,
    pub exit_code: i32,
    #[serde(rename = "execution_time_millis")]
    pub execution_time_ms: u64,
    pub logs: Vec<String>,
}

/// Outcome of a completed invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnExecutionResult {
    /// Value returned by the user's handler
    pub payload: serde_json::Value,
    pub process: ProcessInfo,
}
