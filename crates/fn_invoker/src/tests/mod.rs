//! Pipeline tests for the invoker
//!
//! Archives are built in memory and served from a local HTTP server. The `shell` runtime
//! below drives the whole pipeline with `sh`, so these tests don't need node or python;
//! the node/python suites skip themselves when the interpreter is missing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path as UrlPath, State},
    http::StatusCode,
    routing::get,
};
use flate2::{Compression, write::GzEncoder};
use serial_test::serial;
use tokio::task::JoinHandle;

use crate::error::{ProbeError, Result};
use crate::runtime::{Runtime, inject_wrapper, install_dependencies, probe_command};
use crate::types::{InvocationScope, PreparedCommand};
use crate::{Invoker, InvokerOptions, RuntimeRegistry};


/// Build a `.tar.gz` whose entries live under `top_level/`
pub(crate) fn tar_gz(top_level: &str, files: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder
        .append_data(&mut dir, format!("{top_level}/"), std::io::empty())
        .expect("failed appending directory");

    for (path, contents, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(*mode);
        header.set_size(contents.len() as u64);
        builder
            .append_data(&mut header, format!("{top_level}/{path}"), contents.as_bytes())
            .expect("failed appending file");
    }

    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .expect("failed finishing archive")
}

/// Serves archives at `/{name}` on an ephemeral port
pub(crate) struct ArchiveServer {
    base_url: String,
    handle: JoinHandle<()>,
}

impl ArchiveServer {
    pub(crate) async fn start(archives: Vec<(&str, Vec<u8>)>) -> Self {
        let archives: HashMap<String, Vec<u8>> = archives
            .into_iter()
            .map(|(name, bytes)| (name.to_string(), bytes))
            .collect();

        let app = Router::new()
            .route("/{name}", get(serve_archive))
            .with_state(Arc::new(archives));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed binding archive server");
        let addr = listener.local_addr().expect("no local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub(crate) fn url(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url)
    }
}

impl Drop for ArchiveServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_archive(
    State(archives): State<Arc<HashMap<String, Vec<u8>>>>,
    UrlPath(name): UrlPath<String>,
) -> std::result::Result<Vec<u8>, StatusCode> {
    archives.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)
}

const SHELL_WRAPPER: &str = ". ./main.sh\nhandler \"$1\"\n";

/// Test runtime: sources `main.sh` and calls its `handler` shell function with the params JSON
#[derive(Default)]
pub(crate) struct ShellRuntime {
    pub(crate) prepared: Arc<AtomicUsize>,
}

#[async_trait]
impl Runtime for ShellRuntime {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn probe_version(&self) -> std::result::Result<String, ProbeError> {
        probe_command("sh", &["-c", "echo 1.0.0"]).await
    }

    async fn prepare(&self, scope: InvocationScope<'_>) -> Result<PreparedCommand> {
        self.prepared.fetch_add(1, Ordering::SeqCst);

        install_dependencies("shell", scope.workdir, "setup.sh", "sh", &["setup.sh"]).await?;
        let wrapper = inject_wrapper("shell", &scope, "sh", SHELL_WRAPPER).await?;

        Ok(PreparedCommand::new("sh", scope.workdir)
            .arg(wrapper)
            .arg(scope.params_json()))
    }
}

/// Invoker over the shell runtime, staging under `root`
pub(crate) async fn shell_invoker(
    root: &Path,
    options: InvokerOptions,
) -> (Invoker, Arc<AtomicUsize>) {
    let shell = ShellRuntime::default();
    let prepared = Arc::clone(&shell.prepared);

    let registry = RuntimeRegistry::probe(vec![Arc::new(shell) as Arc<dyn Runtime>]).await;
    assert_eq!(registry.len(), 1, "sh should always be available");

    let invoker = Invoker::new(
        Arc::new(registry),
        InvokerOptions {
            staging_root: root.to_path_buf(),
            ..options
        },
    );
    (invoker, prepared)
}

/// Invoker over a single host runtime, or `None` when its interpreter is missing
pub(crate) async fn host_invoker(runtime: Arc<dyn Runtime>, root: &Path) -> Option<Invoker> {
    let name = runtime.name();
    let registry = RuntimeRegistry::probe(vec![runtime]).await;
    if registry.is_empty() {
        eprintln!("{name} is not installed on this host, skipping");
        return None;
    }

    Some(Invoker::new(
        Arc::new(registry),
        InvokerOptions {
            staging_root: root.to_path_buf(),
            ..InvokerOptions::default()
        },
    ))
}

/// Entries left in the staging root
pub(crate) fn leftovers(root: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(root) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_staging_root_created_on_demand() {
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("not").join("yet").join("there");
    let server = ArchiveServer::start(vec![(
        "fn.tar.gz",
        tar_gz("fn", &[("main.sh", "handler() { echo '{}'; }\n", 0o644)]),
    )])
    .await;

    let (invoker, _) = shell_invoker(&root, InvokerOptions::default()).await;
    let result = invoker
        .invoke(crate::InvocationRequest {
            runtime: "shell".to_string(),
            code_url: server.url("fn.tar.gz"),
            params: crate::FnParams::new(),
        })
        .await
        .expect("invocation should succeed");

    assert_eq!(result.payload, serde_json::json!({}));
    assert!(root.is_dir());
}
