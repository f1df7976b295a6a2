use anyhow::{anyhow, Context};
use config::Config as CConfig;
use tokio::time::Duration;

use crate::connection::ConnectionSettings;

pub const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "PIHUB";

// Durations are kept as plain milliseconds so the TOML file stays readable; the accessors
// below hand out `Duration`s to the rest of the crate.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub banner_timeout_ms: u64,
    pub recv_buffer_size: usize,
    pub telemetry: TelemetryConfig,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub sensor_id: u32,
    pub measurement: String,
    pub interval_ms: u64,
    pub report_period_ms: u64,
    pub max_samples: Option<usize>,
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
    pub export_csv: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub workers: usize,
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub banner_grace_ms: u64,
    pub command_delay_ms: u64,
    pub seed: Option<u64>,
    pub commands: Vec<String>,
}

impl Config {
    /// Reads `path` (if it exists) and layers `PIHUB__*` environment variables on top,
    /// e.g. `PIHUB__LOAD__WORKERS=50`.
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let config: Self = CConfig::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recv_buffer_size == 0 {
            return Err(anyhow!("recv_buffer_size must be greater than 0"));
        }
        if self.telemetry.report_period_ms == 0 {
            return Err(anyhow!("telemetry.report_period_ms must be greater than 0"));
        }
        if self.telemetry.max_samples == Some(0) {
            return Err(anyhow!("telemetry.max_samples must be greater than 0 when set"));
        }
        if self.load.workers == 0 {
            return Err(anyhow!("load.workers must be greater than 0"));
        }
        if self.load.min_iterations > self.load.max_iterations {
            return Err(anyhow!(
                "load.min_iterations ({}) must not exceed load.max_iterations ({})",
                self.load.min_iterations,
                self.load.max_iterations
            ));
        }
        if self.load.commands.is_empty() {
            return Err(anyhow!("load.commands must contain at least one command"));
        }
        Ok(())
    }

    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            banner_timeout: Duration::from_millis(self.banner_timeout_ms),
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 65002,
            connect_timeout_ms: 3_000,
            send_timeout_ms: 2_000,
            response_timeout_ms: 2_000,
            banner_timeout_ms: 1_000,
            recv_buffer_size: 2048,
            telemetry: TelemetryConfig::default(),
            load: LoadConfig::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_millis(self.report_period_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            measurement: "temp".to_string(),
            interval_ms: 100,
            report_period_ms: 500,
            max_samples: None,
            reconnect_attempts: 0,
            reconnect_backoff_ms: 500,
            export_csv: None,
        }
    }
}

impl LoadConfig {
    pub fn banner_grace(&self) -> Duration {
        Duration::from_millis(self.banner_grace_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers: 25,
            min_iterations: 100,
            max_iterations: 200,
            banner_grace_ms: 500,
            command_delay_ms: 50,
            seed: None,
            commands: [
                "server uptime",
                "gpio set 0 1",
                "server net",
                "sensor list",
                "server help",
                "gpio get 1",
                "sensor read 0",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}
