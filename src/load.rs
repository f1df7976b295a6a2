use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tokio::time::Duration;

use crate::config::Config;
use crate::connection::{Connection, ConnectionResult, ConnectionSettings};
use crate::error::ConnectionError;

#[derive(Debug)]
enum Outcome {
    Response(String),
    Timeout,
}

/// One simulated client. It owns its connection and shares nothing with other workers.
pub struct LoadWorker {
    id: usize,
    host: String,
    port: u16,
    settings: ConnectionSettings,
    commands: Arc<[String]>,
    iterations: RangeInclusive<usize>,
    banner_grace: Duration,
    command_delay: Duration,
}

#[derive(Debug)]
pub struct WorkerReport {
    pub id: usize,
    pub planned: usize,
    pub iterations: usize,
    pub timeouts: usize,
    pub failure: Option<ConnectionError>,
}

impl LoadWorker {
    pub fn new(id: usize, config: &Config, commands: Arc<[String]>) -> Self {
        let load = &config.load;
        Self {
            id,
            host: config.host.clone(),
            port: config.port,
            settings: config.connection(),
            commands,
            iterations: load.min_iterations..=load.max_iterations,
            banner_grace: load.banner_grace(),
            command_delay: load.command_delay(),
        }
    }

    /// Runs the worker to completion. Never fails: whatever ends the worker early is logged
    /// and recorded in the report.
    pub async fn run<R: Rng>(&self, rng: &mut R) -> WorkerReport {
        let mut report = WorkerReport {
            id: self.id,
            planned: 0,
            iterations: 0,
            timeouts: 0,
            failure: None,
        };
        if let Err(err) = self.drive(rng, &mut report).await {
            tracing::error!(
                worker = self.id,
                "Worker stopped after {} commands: {}",
                report.iterations,
                err
            );
            report.failure = Some(err);
        }
        report
    }

    async fn drive<R: Rng>(
        &self,
        rng: &mut R,
        report: &mut WorkerReport,
    ) -> ConnectionResult<()> {
        let mut conn = Connection::open(&self.host, self.port, self.settings.clone()).await?;
        tracing::info!(worker = self.id, "Connected to server");

        // Give the greeting time to arrive before the single banner read.
        tokio::time::sleep(self.banner_grace).await;
        if let Some(banner) = conn.drain_banner().await {
            tracing::debug!(worker = self.id, "Server says: {}", banner.trim());
        }

        report.planned = rng.gen_range(self.iterations.clone());
        for _ in 0..report.planned {
            let Some(command) = self.commands.choose(&mut *rng) else {
                break;
            };
            conn.send_command(command).await?;
            let outcome = match conn.receive().await {
                Ok(response) => Outcome::Response(response),
                Err(err) if err.is_timeout() => Outcome::Timeout,
                Err(err) => return Err(err),
            };
            report.iterations += 1;
            match outcome {
                Outcome::Response(response) => tracing::info!(
                    worker = self.id,
                    command = %command,
                    response = %response.trim(),
                    "Command answered"
                ),
                Outcome::Timeout => {
                    report.timeouts += 1;
                    tracing::warn!(
                        worker = self.id,
                        command = %command,
                        "Timeout waiting for response"
                    );
                }
            }
            tokio::time::sleep(self.command_delay).await;
        }

        conn.close().await;
        Ok(())
    }
}

/// Spawns `load.workers` independent workers and waits for all of them. There is no shared
/// rate limit: total load is whatever the workers produce together.
pub struct LoadCoordinator {
    config: Config,
}

impl LoadCoordinator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> LoadSummary {
        let load = &self.config.load;
        let commands: Arc<[String]> = load.commands.clone().into();
        tracing::info!(
            "Starting {} workers against {}:{}",
            load.workers,
            self.config.host,
            self.config.port
        );

        let mut workers = JoinSet::new();
        for id in 0..load.workers {
            let worker = LoadWorker::new(id, &self.config, commands.clone());
            let mut rng = match load.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
                None => StdRng::from_entropy(),
            };
            workers.spawn(async move { worker.run(&mut rng).await });
        }

        let mut summary = LoadSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => summary.record(report),
                // A panicking worker only takes itself down.
                Err(err) => {
                    tracing::error!("Worker task aborted: {}", err);
                    summary.aborted += 1;
                }
            }
        }
        summary.reports.sort_by_key(|report| report.id);
        tracing::info!("{}", summary);
        summary
    }
}

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub reports: Vec<WorkerReport>,
    pub aborted: usize,
}

impl LoadSummary {
    fn record(&mut self, report: WorkerReport) {
        self.reports.push(report);
    }

    pub fn workers(&self) -> usize {
        self.reports.len() + self.aborted
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.failure.is_some()).count() + self.aborted
    }

    pub fn commands(&self) -> usize {
        self.reports.iter().map(|r| r.iterations).sum()
    }

    pub fn timeouts(&self) -> usize {
        self.reports.iter().map(|r| r.timeouts).sum()
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "All {} workers finished: {} failed, {} commands sent, {} timeouts",
            self.workers(),
            self.failed(),
            self.commands(),
            self.timeouts()
        )
    }
}
