use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_invoker::InvokerOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub invoker: InvokerConfig,
    pub runtimes: RuntimesConfig,

    #[serde(skip)]
    path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InvokerConfig {
    /// Parent of every invocation's working directory
    pub staging_root: PathBuf,
    /// `0` disables admission control
    pub max_concurrent_invocations: usize,
    /// `0` disables the execution timeout
    pub timeout_secs: u64,
    pub keep_workdirs: bool,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        let defaults = InvokerOptions::default();
        Self {
            staging_root: defaults.staging_root,
            max_concurrent_invocations: defaults.max_concurrent_invocations,
            timeout_secs: defaults.timeout.map_or(0, |t| t.as_secs()),
            keep_workdirs: defaults.keep_workdirs,
        }
    }
}

impl InvokerConfig {
    pub fn options(&self) -> InvokerOptions {
        InvokerOptions {
            staging_root: self.staging_root.clone(),
            max_concurrent_invocations: self.max_concurrent_invocations,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            keep_workdirs: self.keep_workdirs,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimesConfig {
    /// Restrict probing to these runtimes, all built-in runtimes when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<String>>,
}

impl Config {
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::from("fnagent.toml")
    }

    pub fn with_path(mut self, path: &Utf8Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }

    /// Load the config at `path`, falling back to defaults when the file doesn't exist
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default().with_path(path));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let cfg: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {path}"))?;

        Ok(cfg.with_path(path))
    }

    /// # Errors
    ///
    /// Fails when the parent directory cannot be created or the file cannot be written
    pub fn save(&self) -> Result<()> {
        let path = self.path();

        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents).context("Failed to write config file")?;

        Ok(())
    }
}
