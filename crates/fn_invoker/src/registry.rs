use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{info, warn};

use crate::runtime::{self, Runtime};
use crate::types::RuntimeInfo;

/// A runtime whose interpreter answered its version probe
#[derive(Clone)]
pub struct RegisteredRuntime {
    runtime: Arc<dyn Runtime>,
    version: String,
}

impl RegisteredRuntime {
    pub fn name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Version reported by the startup probe
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            name: self.name().to_string(),
            version: self.version.clone(),
        }
    }
}

impl std::fmt::Debug for RegisteredRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredRuntime")
            .field("name", &self.name())
            .field("version", &self.version)
            .finish()
    }
}

/// Runtimes available on this host.
///
/// Built once at startup and never mutated afterwards, so concurrent lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: HashMap<String, RegisteredRuntime>,
}

impl RuntimeRegistry {
    /// Probe every candidate and keep those whose interpreter is usable.
    ///
    /// Probe failures are logged and the runtime is left out; they never fail construction.
    pub async fn probe(candidates: impl IntoIterator<Item = Arc<dyn Runtime>>) -> Self {
        let candidates: Vec<Arc<dyn Runtime>> = candidates.into_iter().collect();
        let probes = join_all(candidates.iter().map(|r| r.probe_version())).await;

        let mut runtimes = HashMap::new();
        for (runtime, probe) in candidates.into_iter().zip(probes) {
            let name = runtime.name();
            match probe {
                Ok(version) => {
                    if runtimes.contains_key(name) {
                        warn!("runtime/{name} is already registered, ignoring duplicate");
                        continue;
                    }
                    info!("runtime/{name} initialized (version {version})");
                    runtimes.insert(name.to_string(), RegisteredRuntime { runtime, version });
                }
                Err(e) => warn!("runtime/{name} failed to initialize: {e}"),
            }
        }

        info!(
            "Invoker ready. {} runtime(s) available for this agent",
            runtimes.len()
        );

        Self { runtimes }
    }

    /// Probe the built-in runtimes, optionally restricted to the `enabled` names
    pub async fn from_host(enabled: Option<&[String]>) -> Self {
        let candidates = runtime::builtin()
            .into_iter()
            .filter(|r| enabled.is_none_or(|names| names.iter().any(|n| n == r.name())));

        Self::probe(candidates).await
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredRuntime> {
        self.runtimes.get(name)
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    /// Available runtimes sorted by name
    pub fn available(&self) -> Vec<RuntimeInfo> {
        let mut infos: Vec<RuntimeInfo> = self.runtimes.values().map(RegisteredRuntime::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}
