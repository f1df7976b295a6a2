use std::fmt;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::{Connection, ConnectionResult, ConnectionSettings};
use crate::parser::parse_numeric;
use crate::series::{Sample, TimeSeries};

/// Polls one sensor reading over a persistent connection and appends every value it can
/// parse to a [`TimeSeries`].
///
/// Unparseable responses are logged and skipped. Any connection failure ends the session;
/// [`TelemetryReader::run_supervised`] decides whether to open a new one.
pub struct TelemetryReader {
    host: String,
    port: u16,
    settings: ConnectionSettings,
    command: String,
    key: String,
    interval: Duration,
    reconnect_attempts: u32,
    reconnect_backoff: Duration,
}

impl TelemetryReader {
    pub fn new(config: &Config) -> Self {
        let telemetry = &config.telemetry;
        Self {
            host: config.host.clone(),
            port: config.port,
            settings: config.connection(),
            command: format!("sensor get {} {}", telemetry.sensor_id, telemetry.measurement),
            key: telemetry.measurement.clone(),
            interval: telemetry.interval(),
            reconnect_attempts: telemetry.reconnect_attempts,
            reconnect_backoff: telemetry.reconnect_backoff(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// A single session: returns `Ok` only once `shutdown` is cancelled.
    pub async fn run(
        &self,
        series: &TimeSeries,
        shutdown: &CancellationToken,
    ) -> ConnectionResult<()> {
        let mut round_trips = 0;
        self.session(series, shutdown, &mut round_trips).await
    }

    /// Like [`run`](Self::run), but reopens the connection up to `reconnect_attempts` times
    /// in a row with exponential backoff. A session that completed at least one round trip
    /// resets the count.
    pub async fn run_supervised(
        &self,
        series: &TimeSeries,
        shutdown: &CancellationToken,
    ) -> ConnectionResult<()> {
        let mut attempt = 0;
        loop {
            let mut round_trips = 0;
            let err = match self.session(series, shutdown, &mut round_trips).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if round_trips > 0 {
                attempt = 0;
            }
            if attempt >= self.reconnect_attempts {
                return Err(err);
            }
            let backoff = self
                .reconnect_backoff
                .saturating_mul(2u32.saturating_pow(attempt));
            attempt += 1;
            tracing::warn!(
                "Telemetry connection failed: {}, reconnecting in {:?} [attempt={}/{}]",
                err,
                backoff,
                attempt,
                self.reconnect_attempts
            );
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn session(
        &self,
        series: &TimeSeries,
        shutdown: &CancellationToken,
        round_trips: &mut usize,
    ) -> ConnectionResult<()> {
        let mut conn = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            conn = Connection::open(&self.host, self.port, self.settings.clone()) => conn?,
        };
        if let Some(banner) = conn.drain_banner().await {
            tracing::debug!("Server says: {}", banner.trim());
        }
        tracing::info!("Polling `{}` every {:?}", self.command, self.interval);

        loop {
            let response = tokio::select! {
                _ = shutdown.cancelled() => break,
                response = conn.request(&self.command) => response?,
            };
            *round_trips += 1;
            match parse_numeric(&response, &self.key) {
                Some(value) => series.append(Sample::now(value)),
                None => tracing::warn!(
                    "Failed to parse {} from response: {}",
                    self.key,
                    response.trim()
                ),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        conn.close().await;
        Ok(())
    }
}

/// What the consumer side prints about the series on every tick.
#[derive(Debug, PartialEq)]
pub struct SeriesReport {
    samples: usize,
    span: Duration,
    latest: f64,
    min: f64,
    max: f64,
}

impl SeriesReport {
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let (first, last) = (samples.first()?, samples.last()?);
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
                (min.min(s.value), max.max(s.value))
            });
        Some(Self {
            samples: samples.len(),
            span: last.at.saturating_duration_since(first.at),
            latest: last.value,
            min,
            max,
        })
    }
}

impl fmt::Display for SeriesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples over {:.1}s, latest {:.2} (min {:.2}, max {:.2})",
            self.samples,
            self.span.as_secs_f64(),
            self.latest,
            self.min,
            self.max
        )
    }
}

/// The consumer task. Every `period` it takes a snapshot and logs a [`SeriesReport`]; the
/// lock is released before anything is formatted.
pub async fn report_loop(series: TimeSeries, period: Duration, shutdown: CancellationToken) {
    let mut ticks = IntervalStream::new(tokio::time::interval(period));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            tick = ticks.next() => {
                if tick.is_none() {
                    break;
                }
                match SeriesReport::from_samples(&series.snapshot()) {
                    Some(report) => tracing::info!("{}", report),
                    None => tracing::debug!("No samples yet"),
                }
            }
        }
    }
}

/// Dumps `samples` as `elapsed_secs,value` rows, elapsed time counted from the first sample.
pub async fn export_csv(path: &str, samples: &[Sample]) -> anyhow::Result<()> {
    let mut file = File::create(path)
        .await
        .with_context(|| format!("Error creating {}", path))?;
    // One write for the whole file.
    let mut buffer = String::from("elapsed_secs,value\n");
    if let Some(first) = samples.first() {
        for sample in samples {
            let elapsed = sample.at.saturating_duration_since(first.at);
            buffer.push_str(&format!("{:.3},{}\n", elapsed.as_secs_f64(), sample.value));
        }
    }
    file.write_all(buffer.as_bytes()).await?;
    file.flush().await?;
    tracing::info!("Exported {} samples to {}", samples.len(), path);
    Ok(())
}
