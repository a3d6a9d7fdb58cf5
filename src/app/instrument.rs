//! Call wrappers for timing and error suppression.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{error, warn};

/// Histogram recorded for every timed call, labelled by `function`.
pub const FUNCTION_DURATION_METRIC: &str = "function_duration_ms";

fn report(name: &str, elapsed: Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    warn!(function = %name, duration_ms = ms, "{name} took: {ms:.3} ms");
    metrics::histogram!(FUNCTION_DURATION_METRIC, "function" => name.to_string()).record(ms);
}

/// Runs `f`, logs how long it took and returns its result unchanged.
pub fn timeit<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    report(name, start.elapsed());
    result
}

/// Async counterpart of [`timeit`].
pub async fn timeit_async<F: Future>(name: &str, fut: F) -> F::Output {
    let start = Instant::now();
    let result = fut.await;
    report(name, start.elapsed());
    result
}

/// Runs a fallible call; an error is logged and turned into `None`.
pub fn ignore_errors<T, E: Display>(name: &str, f: impl FnOnce() -> Result<T, E>) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(e) => {
            error!(function = %name, error = %e, "Ignored error");
            None
        }
    }
}

/// Async counterpart of [`ignore_errors`].
pub async fn ignore_errors_async<T, E, F>(name: &str, fut: F) -> Option<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(function = %name, error = %e, "Ignored error");
            None
        }
    }
}
