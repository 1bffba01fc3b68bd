use anyhow::Result;
use camino::Utf8Path;
use clap::Parser;
use log::info;

use crate::{
    config::Config,
    utils::styles::{fmt_bold, fmt_dimmed, fmt_success},
};

#[derive(Debug, Clone, Parser)]
pub struct InitCmd {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,
}

impl InitCmd {
    pub(crate) fn handle(&self, path: &Utf8Path) -> Result<Config> {
        if path.exists() && !self.force {
            anyhow::bail!(
                "A fnagent config already exists at {path}, use {} to overwrite it",
                fmt_bold("--force")
            );
        }

        let cfg = Config::default().with_path(path);
        cfg.save()?;

        info!(
            "{}",
            fmt_success(&format!(
                "{name} configuration created: {path}",
                name = fmt_bold("fnagent"),
                path = fmt_dimmed(cfg.path().as_str()),
            ))
        );

        Ok(cfg)
    }
}
