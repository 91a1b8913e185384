use anyhow::{Context, Result};
use infer_bench_core::Profiler;
use tracing::dispatcher::DefaultGuard;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging and profiling for one process run.
///
/// The log filter applies to the console output only; the profiler sees
/// every span down to debug level regardless of it.
pub struct Telemetry {
    dispatch: Dispatch,
    profiler: Profiler,
}

impl Telemetry {
    pub fn new(log: &str) -> Result<Self> {
        let filter =
            EnvFilter::try_new(log).with_context(|| format!("invalid log filter {log:?}"))?;
        let profiler = Profiler::new();

        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(filter))
            .with(profiler.layer().with_filter(LevelFilter::DEBUG));

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            profiler,
        })
    }

    /// Installs this telemetry for the current thread until the guard drops.
    pub fn enter(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }
}
