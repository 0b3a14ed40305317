use crate::dynamic::ValidatorConfig;
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Validator settings, meant to be flattened into an orchestrator's CLI.
#[derive(Clone, Debug, Parser)]
#[clap(
    name = "admission-validator",
    about = "Validates the cloud resources a cluster links to"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "admission_validator=info,warn",
        env = "ADMISSION_VALIDATOR_LOG"
    )]
    pub log_level: String,

    #[clap(long, default_value = "plain")]
    pub log_format: LogFormat,

    /// Seconds between authorization decision attempts.
    #[clap(long, default_value = "30")]
    pub authz_poll_interval: u64,

    /// Seconds to wait for role assignments to propagate before a missing
    /// permission is reported.
    #[clap(long, default_value = "360")]
    pub authz_poll_timeout: u64,

    #[clap(long, default_value = "https://management.azure.com/.default")]
    pub resource_manager_scope: String,

    #[clap(long, default_value = "https://graph.microsoft.com/.default")]
    pub graph_scope: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

// === impl Args ===

impl Args {
    pub fn config(&self) -> Result<ValidatorConfig> {
        if self.authz_poll_interval == 0 {
            bail!("--authz-poll-interval must be positive");
        }
        if self.authz_poll_timeout <= self.authz_poll_interval {
            bail!("--authz-poll-timeout must exceed --authz-poll-interval");
        }

        Ok(ValidatorConfig {
            poll_interval: Duration::from_secs(self.authz_poll_interval),
            poll_timeout: Duration::from_secs(self.authz_poll_timeout),
            resource_manager_scope: self.resource_manager_scope.clone(),
            graph_scope: self.graph_scope.clone(),
        })
    }

    /// Installs the global tracing subscriber.
    pub fn init_logging(&self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.log_level)?;
        let fmt = tracing_subscriber::fmt().with_env_filter(filter);
        match self.log_format {
            LogFormat::Plain => fmt.try_init(),
            LogFormat::Json => fmt.json().try_init(),
        }
        .map_err(|e| anyhow::anyhow!(e))
    }
}
