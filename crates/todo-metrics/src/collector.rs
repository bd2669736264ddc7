//! Runtime collector — periodically samples process and tokio runtime
//! gauges into the shared registry.
//!
//! All series live under a common name prefix (`runtime_` by default) so
//! they cannot collide with application series. Process figures come from
//! `sysinfo` for the current PID.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MetricsError, MetricsResult};
use crate::registry::{Counter, Gauge, Registry};

/// Default name prefix for runtime series.
pub const DEFAULT_PREFIX: &str = "runtime_";

/// Extra work to run on every collection tick.
pub type TickHook = Arc<dyn Fn() + Send + Sync>;

/// Samples process-level gauges on a timer.
pub struct RuntimeCollector {
    resident_memory: Gauge,
    virtual_memory: Gauge,
    cpu_seconds: Counter,
    cpu_usage: Gauge,
    start_time: Gauge,
    uptime: Gauge,
    tokio_workers: Gauge,
    tokio_alive_tasks: Gauge,
    system: System,
    pid: Option<Pid>,
    started: Instant,
    last_cpu_seconds: f64,
    interval: Duration,
    on_tick: Option<TickHook>,
}

impl RuntimeCollector {
    /// Register the runtime series under `prefix`.
    pub fn new(registry: &Registry, prefix: &str, interval: Duration) -> MetricsResult<Self> {
        if interval.is_zero() {
            return Err(MetricsError::ZeroInterval);
        }

        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "process metrics unavailable on this platform");
                None
            }
        };

        let name = |suffix: &str| format!("{prefix}{suffix}");
        let collector = Self {
            resident_memory: registry.gauge(
                &name("resident_memory_bytes"),
                "Resident memory size in bytes",
                &[],
            )?,
            virtual_memory: registry.gauge(
                &name("virtual_memory_bytes"),
                "Virtual memory size in bytes",
                &[],
            )?,
            cpu_seconds: registry.counter(
                &name("cpu_seconds_total"),
                "Total user and system CPU time spent in seconds",
                &[],
            )?,
            cpu_usage: registry.gauge(
                &name("cpu_usage_percent"),
                "CPU usage of the process since the previous sample",
                &[],
            )?,
            start_time: registry.gauge(
                &name("start_time_seconds"),
                "Start time of the process since unix epoch in seconds",
                &[],
            )?,
            uptime: registry.gauge(&name("uptime_seconds"), "Process uptime in seconds", &[])?,
            tokio_workers: registry.gauge(
                &name("tokio_workers"),
                "Number of tokio runtime worker threads",
                &[],
            )?,
            tokio_alive_tasks: registry.gauge(
                &name("tokio_alive_tasks"),
                "Number of alive tasks in the tokio runtime",
                &[],
            )?,
            system: System::new(),
            pid,
            started: Instant::now(),
            last_cpu_seconds: 0.0,
            interval,
            on_tick: None,
        };

        // Overwritten with the OS start time once the process is sampled.
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        collector.start_time.set(&[], epoch)?;
        Ok(collector)
    }

    /// Run `hook` after every sample (e.g. to publish pool usage).
    pub fn with_hook(mut self, hook: TickHook) -> Self {
        self.on_tick = Some(hook);
        self
    }

    /// Take one sample of every runtime gauge.
    pub fn collect(&mut self) -> MetricsResult<()> {
        self.uptime
            .set(&[], self.started.elapsed().as_secs_f64())?;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let metrics = handle.metrics();
            self.tokio_workers.set(&[], metrics.num_workers() as f64)?;
            self.tokio_alive_tasks
                .set(&[], metrics.num_alive_tasks() as f64)?;
        }

        if let Some(pid) = self.pid {
            self.sample_process(pid)?;
        }

        if let Some(hook) = &self.on_tick {
            hook();
        }
        Ok(())
    }

    fn sample_process(&mut self, pid: Pid) -> MetricsResult<()> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let Some(process) = self.system.process(pid) else {
            warn!(%pid, "current process not found by sysinfo");
            return Ok(());
        };

        self.resident_memory.set(&[], process.memory() as f64)?;
        self.virtual_memory.set(&[], process.virtual_memory() as f64)?;
        self.cpu_usage.set(&[], f64::from(process.cpu_usage()))?;
        self.start_time.set(&[], process.start_time() as f64)?;
        self.uptime.set(&[], process.run_time() as f64)?;

        let cpu_seconds = process.accumulated_cpu_time() as f64 / 1000.0;
        let delta = cpu_seconds - self.last_cpu_seconds;
        if delta > 0.0 {
            self.cpu_seconds.inc_by(&[], delta)?;
            self.last_cpu_seconds = cpu_seconds;
        }
        Ok(())
    }

    /// Sample on every interval until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "runtime collector started"
        );
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.collect() {
                        warn!(error = %e, "runtime metrics sample failed");
                    } else {
                        debug!("runtime metrics sampled");
                    }
                }
                _ = shutdown.changed() => {
                    info!("runtime collector shutting down");
                    break;
                }
            }
        }
    }
}
