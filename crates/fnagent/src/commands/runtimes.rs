use anyhow::Result;
use clap::Parser;
use fn_invoker::runtime;
use futures::future::join_all;
use log::info;

use crate::{
    config::Config,
    utils::styles::{fmt_bold, fmt_dimmed, fmt_error, fmt_success},
};

#[derive(Debug, Clone, Parser)]
pub struct RuntimesCmd;

impl RuntimesCmd {
    pub(crate) async fn handle(&self, cfg: Config) -> Result<Config> {
        let candidates = runtime::builtin();
        let probes = join_all(candidates.iter().map(|r| r.probe_version())).await;

        for (runtime, probe) in candidates.iter().zip(probes) {
            let name = runtime.name();
            let enabled = cfg
                .runtimes
                .enabled
                .as_ref()
                .is_none_or(|names| names.iter().any(|n| n == name));

            let line = match probe {
                Ok(version) if enabled => fmt_success(&format!("{} {version}", fmt_bold(name))),
                Ok(version) => format!(
                    "  {} {version} {}",
                    fmt_bold(name),
                    fmt_dimmed("(disabled in config)")
                ),
                Err(e) => fmt_error(&format!("{} {}", fmt_bold(name), fmt_dimmed(&e.to_string()))),
            };
            info!("{line}");
        }

        Ok(cfg)
    }
}
