//! Command-line configuration for the coach service
//!
//! Provider credentials are not flags: each provider reads them from the environment variables
//! named in its chain entry.
use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tradal_coach::client::PoolConfig;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the coach service will listen.
    #[arg(short = 'p', long, env = "TRADAL_PORT", default_value_t = 3000)]
    pub port: u16,

    /// The port on which the metrics server will listen.
    #[arg(long, env = "TRADAL_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, env = "TRADAL_METRICS", default_value_t = true, action = clap::ArgAction::Set)]
    pub metrics: bool,

    /// The prefix to use for metrics.
    #[arg(long, env = "TRADAL_METRICS_PREFIX", default_value = "tradal")]
    pub metrics_prefix: String,

    /// JSON file describing the provider chain. The built-in chain is used when absent.
    #[arg(short = 'f', long, env = "TRADAL_PROVIDERS_FILE")]
    pub providers: Option<PathBuf>,

    /// Give up on a request after this many seconds across the whole chain. 0 disables.
    #[arg(long, env = "TRADAL_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Maximum number of idle HTTP connections to keep alive per upstream host.
    #[arg(long, default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    /// How long (in seconds) to keep idle HTTP connections alive.
    #[arg(long, default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if let Some(path) = &self.providers
            && !path.exists()
        {
            return Err(anyhow!(
                "Providers file '{}' does not exist",
                path.display()
            ));
        }
        if self.metrics && self.metrics_port == self.port {
            return Err(anyhow!(
                "Metrics port {} clashes with the service port",
                self.metrics_port
            ));
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
            max_idle_per_host: self.pool_max_idle_per_host,
        }
    }
}
