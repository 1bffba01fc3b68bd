pub mod commands;
pub mod config;
pub mod server;
pub mod utils;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::commands::{init::InitCmd, runtimes::RuntimesCmd, start::StartCmd};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "fnagent")]
#[command(version)]
#[command(about = "fnagent - run packaged functions on this host")]
#[command(
    long_about = "fnagent downloads function code archives, runs them with the node or python runtime \
available on this host and answers with the function's JSON output, exit code, timing and logs."
)]
#[command(after_help = "EXAMPLES:\n  \
    fnagent init\n  \
    fnagent runtimes\n  \
    fnagent start --port 8080\n\
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path, defaults to ./fnagent.toml
    #[arg(long, short = 'c', global = true, env = "FNAGENT_CONFIG", default_value_t = Config::default_path())]
    pub config: Utf8PathBuf,

    /// No logging except for errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Debug logging (-v) or trace logging (-vv); `FNAGENT_LOG` overrides both flags
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    #[allow(clippy::missing_errors_doc)]
    pub async fn handle(&self) -> anyhow::Result<()> {
        let _updated_cfg = match &self.command {
            Commands::Init(cmd) => cmd.handle(&self.config)?,
            Commands::Runtimes(cmd) => cmd.handle(Config::load(&self.config)?).await?,
            Commands::Start(cmd) => cmd.handle(Config::load(&self.config)?).await?,
        };

        Ok(())
    }
}

#[derive(Debug, Subcommand)]
#[command(styles=utils::styles::get_styles())]
pub enum Commands {
    /// Start the agent HTTP server
    #[command(
        long_about = "Probe the host runtimes and serve invocations until SIGINT or SIGTERM (exposes /, /_/health and /_/runtimes)."
    )]
    Start(StartCmd),

    /// List runtimes and whether this host can run them
    #[command(long_about = "Probes every known runtime and prints its version or why it is unavailable.")]
    Runtimes(RuntimesCmd),

    /// Initialize configuration file
    #[command(long_about = "Initialize fnagent.toml configuration file with default values.")]
    Init(InitCmd),
}
