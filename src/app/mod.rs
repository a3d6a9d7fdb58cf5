//! Application layer containing orchestration logic, shared state and jobs.

pub mod health_monitor;
pub mod instrument;
pub mod service;
pub mod state;
pub mod worker;

pub use health_monitor::HealthMonitorJob;
pub use instrument::{ignore_errors, ignore_errors_async, timeit, timeit_async};
pub use service::AppService;
pub use state::AppState;
pub use worker::{JobConfig, JobRunner, PeriodicJob, spawn_job};
