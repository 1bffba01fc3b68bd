//! Error types for the invocation pipeline

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvokeError>;

/// One variant per pipeline stage that can abort an invocation
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to download function code from {url}: {reason}")]
    CodeDownload { url: String, reason: String },

    #[error("failed to uncompress the function code archive: {0}")]
    ArchiveExtraction(String),

    #[error("runtime \"{0}\" is unavailable on this agent")]
    RuntimeUnavailable(String),

    #[error("failed to install {runtime} dependencies: {reason}")]
    DependencyInstall { runtime: String, reason: String },

    #[error("failed to inject the {runtime} wrapper: {source}")]
    Wrapper {
        runtime: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run `{program}`: {source}")]
    Process {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("function execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    /// The exit code and logs of the attempt are kept so callers can diagnose the failure
    #[error("function output isn't a valid JSON: {reason}")]
    InvalidFunctionOutput {
        exit_code: i32,
        logs: Vec<String>,
        reason: String,
    },

    #[error("invoker is shutting down and no longer admits invocations")]
    Admission,
}

impl InvokeError {
    /// Stable tag identifying the failed stage
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CodeDownload { .. } => "code_download",
            Self::ArchiveExtraction(_) => "archive_extraction",
            Self::RuntimeUnavailable(_) => "runtime_unavailable",
            Self::DependencyInstall { .. } => "dependency_install",
            Self::Wrapper { .. } => "wrapper",
            Self::Process { .. } => "process",
            Self::ExecutionTimeout(_) => "execution_timeout",
            Self::InvalidFunctionOutput { .. } => "invalid_function_output",
            Self::Admission => "admission",
        }
    }
}

/// Reasons an interpreter probe can fail at startup
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code:?}")]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("`{command}` printed no version")]
    EmptyOutput { command: String },

    #[error("`{command}` did not answer within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}
