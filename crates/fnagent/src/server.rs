use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use fn_invoker::{
    FnExecutionResult, FnParams, InvocationRequest, InvokeError, Invoker, RuntimeInfo,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::utils::styles::{fmt_bold, fmt_cyan, fmt_green};

pub(crate) const INVOKE_ENDPOINT: &str = "/";
pub(crate) const HEALTH_ENDPOINT: &str = "/_/health";
pub(crate) const RUNTIMES_ENDPOINT: &str = "/_/runtimes";

/// Malformed or incomplete invocation request
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object: {0}")]
    Body(String),

    #[error("`{0}` is required")]
    MissingField(&'static str),

    #[error("`code` must be an absolute http(s) URL, got \"{url}\": {reason}")]
    CodeUrl { url: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs: Option<Vec<String>>,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Invoke(e) => e.kind(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Invoke(e) => match e {
                InvokeError::RuntimeUnavailable(_) => StatusCode::NOT_FOUND,
                InvokeError::CodeDownload { .. } | InvokeError::InvalidFunctionOutput { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                InvokeError::ArchiveExtraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                InvokeError::DependencyInstall { .. } => StatusCode::FAILED_DEPENDENCY,
                InvokeError::ExecutionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                InvokeError::Admission => StatusCode::SERVICE_UNAVAILABLE,
                InvokeError::Wrapper { .. } | InvokeError::Process { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (exit_code, logs) = match &self {
            Self::Invoke(InvokeError::InvalidFunctionOutput {
                exit_code, logs, ..
            }) => (Some(*exit_code), Some(logs.clone())),
            _ => (None, None),
        };

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            exit_code,
            logs,
        };
        (status, Json(body)).into_response()
    }
}

/// Body of `POST /`, every key besides `runtime` and `code` is a function parameter
#[derive(Debug, Deserialize)]
struct InvokeBody {
    #[serde(default)]
    runtime: String,
    #[serde(default)]
    code: String,
    #[serde(flatten)]
    extra: FnParams,
}

/// Build an invocation request from the raw query string and JSON body.
///
/// Query values become string parameters (the last occurrence of a repeated key wins); body
/// keys win when both carry the same name. Undecodable percent-escapes are kept literally.
pub(crate) fn parse_request(
    query: Option<&str>,
    body: &[u8],
) -> std::result::Result<InvocationRequest, ValidationError> {
    let body: InvokeBody =
        serde_json::from_slice(body).map_err(|e| ValidationError::Body(e.to_string()))?;

    let runtime = body.runtime.trim();
    if runtime.is_empty() {
        return Err(ValidationError::MissingField("runtime"));
    }

    let code = body.code.trim();
    if code.is_empty() {
        return Err(ValidationError::MissingField("code"));
    }
    let code_url = Url::parse(code).map_err(|e| ValidationError::CodeUrl {
        url: code.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(code_url.scheme(), "http" | "https") {
        return Err(ValidationError::CodeUrl {
            url: code.to_string(),
            reason: format!("unsupported scheme \"{}\"", code_url.scheme()),
        });
    }

    let mut params: FnParams = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
        .collect();
    params.extend(body.extra);

    Ok(InvocationRequest {
        runtime: runtime.to_string(),
        code_url: code_url.to_string(),
        params,
    })
}

async fn invoke(
    State(invoker): State<Arc<Invoker>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> std::result::Result<Json<FnExecutionResult>, ApiError> {
    let request =
        parse_request(query.as_deref(), &body).inspect_err(|e| warn!("Rejected request: {e}"))?;
    let result = invoker.invoke(request).await?;
    Ok(Json(result))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "UP" }))
}

async fn runtimes(State(invoker): State<Arc<Invoker>>) -> Json<Vec<RuntimeInfo>> {
    Json(invoker.registry().available())
}

pub(crate) fn router(invoker: Arc<Invoker>) -> Router {
    Router::new()
        .route(INVOKE_ENDPOINT, post(invoke))
        .route(HEALTH_ENDPOINT, get(health))
        .route(RUNTIMES_ENDPOINT, get(runtimes))
        .with_state(invoker)
}

pub(crate) struct AgentServer;
impl AgentServer {
    /// Serve invocations until SIGINT or SIGTERM.
    ///
    /// On shutdown the invoker stops admitting work and in-flight invocations finish before
    /// this returns.
    pub(crate) async fn serve(host: &str, port: u16, invoker: Arc<Invoker>) -> Result<()> {
        let available = invoker.registry().available();
        let tcp_listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;

        info!(
            "{} listening at {}",
            fmt_bold("fnagent"),
            fmt_cyan(&format!("http://{host}:{port}{INVOKE_ENDPOINT}"))
        );
        let names: Vec<String> = available
            .iter()
            .map(|r| fmt_green(&format!("{} ({})", r.name, r.version)))
            .collect();
        info!("{}: {}", fmt_bold("Runtimes"), names.join(", "));

        let signal = ShutdownSignal::install();
        let closing = Arc::clone(&invoker);
        axum::serve(tcp_listener, router(invoker))
            .with_graceful_shutdown(async move {
                signal.recv().await;
                closing.close();
            })
            .await?;

        Ok(())
    }
}

/// Termination signals that trigger a graceful shutdown
pub(crate) struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignal {
    /// The SIGTERM handler is registered here, so a signal sent before `recv` is polled still counts
    pub(crate) fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let terminate = signal(SignalKind::terminate())
                .inspect_err(|e| error!("Failed listening for SIGTERM: {e}"))
                .ok();
            Self { terminate }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    pub(crate) async fn recv(self) {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed listening for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match self.terminate {
                Some(mut terminate) => {
                    terminate.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = interrupt => info!("Interrupted, shutting down gracefully..."),
            () = terminate => info!("Terminated, shutting down gracefully..."),
        }
    }
}
