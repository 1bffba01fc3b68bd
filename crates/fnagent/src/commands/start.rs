use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fn_invoker::{Invoker, RuntimeRegistry};
use log::{info, warn};

use crate::{config::Config, server::AgentServer, utils::styles::fmt_bold};

#[derive(Debug, Clone, Parser)]
pub struct StartCmd {
    /// Port to listen on, overrides the config file
    #[arg(short, long, env = "FNAGENT_PORT")]
    pub port: Option<u16>,

    /// Host address to bind to (use 0.0.0.0 for external access), overrides the config file
    #[arg(long, env = "FNAGENT_HOST")]
    pub host: Option<String>,
}

impl StartCmd {
    pub(crate) async fn handle(&self, mut cfg: Config) -> Result<Config> {
        if let Some(host) = &self.host {
            cfg.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }

        let registry = RuntimeRegistry::from_host(cfg.runtimes.enabled.as_deref()).await;
        if registry.is_empty() {
            warn!(
                "No runtime available on this host, every invocation will fail. Run {} for details",
                fmt_bold("fnagent runtimes")
            );
        }

        let invoker = Invoker::new(Arc::new(registry), cfg.invoker.options());
        info!(
            "Staging function code under {}",
            invoker.stager().staging_root().display()
        );

        AgentServer::serve(&cfg.server.host, cfg.server.port, Arc::new(invoker)).await?;

        info!("Shutting down...");

        Ok(cfg)
    }
}
