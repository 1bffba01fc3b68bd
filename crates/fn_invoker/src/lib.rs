//! Function invocation engine.
//!
//! An invocation flows through:
//! 1. [`Stager`] downloads the code archive and extracts it into a working directory
//!    named after the invocation id
//! 2. [`RuntimeRegistry`] resolves the requested language runtime
//! 3. the [`Runtime`] adapter installs dependencies and injects its wrapper
//! 4. [`ProcessExecutor`] runs the wrapper, capturing stdout and stderr separately
//! 5. [`Invoker`] parses stdout as the JSON payload and stderr as log lines
//!
//! # Examples
//! ```no_run
//! use std::sync::Arc;
//! use fn_invoker::{InvocationRequest, Invoker, InvokerOptions, RuntimeRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(RuntimeRegistry::from_host(None).await);
//! let invoker = Invoker::new(registry, InvokerOptions::default());
//!
//! let mut params = serde_json::Map::new();
//! params.insert("a".to_string(), 1.into());
//! params.insert("b".to_string(), 2.into());
//!
//! let result = invoker
//!     .invoke(InvocationRequest {
//!         runtime: "node".to_string(),
//!         code_url: "https://example.com/sum.tar.gz".to_string(),
//!         params,
//!     })
//!     .await?;
//! println!("{}", result.payload);
//! # Ok(())
//! # }
//! ```

mod error;
mod executor;
mod invoker;
mod registry;
pub mod runtime;
mod stager;
mod types;

pub use error::{InvokeError, ProbeError, Result};
pub use executor::{ProcessExecutor, ProcessOutput};
pub use invoker::{Invoker, InvokerOptions};
pub use registry::{RegisteredRuntime, RuntimeRegistry};
pub use runtime::Runtime;
pub use stager::{Stager, WorkingDir};
pub use types::{
    FnExecutionResult, FnParams, InvocationId, InvocationRequest, InvocationScope, PreparedCommand,
    ProcessInfo, RuntimeInfo,
};

#[cfg(test)]
mod tests;
