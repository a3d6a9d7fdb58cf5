//! Interval-triggered background jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use super::instrument::timeit_async;
use crate::domain::AppError;

/// A unit of work executed on a fixed interval.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), AppError>;
}

/// Configuration for a periodic job
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Delay between runs
    pub interval: Duration,
    /// Whether the job is scheduled at all
    pub enabled: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Runs one job until shutdown is signalled
pub struct JobRunner {
    job: Arc<dyn PeriodicJob>,
    config: JobConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl JobRunner {
    pub fn new(
        job: Arc<dyn PeriodicJob>,
        config: JobConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            job,
            config,
            shutdown_rx,
        }
    }

    /// Run the job loop
    pub async fn run(mut self) {
        let name = self.job.name().to_string();
        if !self.config.enabled {
            info!(job = %name, "Job is disabled");
            return;
        }

        info!(job = %name, interval = ?self.config.interval, "Starting job");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    self.tick(&name).await;
                }
                result = self.shutdown_rx.changed() => {
                    if result.is_err() || *self.shutdown_rx.borrow() {
                        info!(job = %name, "Job shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self, name: &str) {
        if let Err(e) = timeit_async(name, self.job.run()).await {
            error!(job = %name, error = ?e, "Job run failed");
        }
    }
}

/// Spawn a job as a tokio task
pub fn spawn_job(
    job: Arc<dyn PeriodicJob>,
    config: JobConfig,
) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = JobRunner::new(job, config, shutdown_rx);
    let handle = tokio::spawn(runner.run());
    (handle, shutdown_tx)
}
