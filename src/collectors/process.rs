use anyhow::Result;
use prometheus::proto::MetricFamily;
use prometheus::{Counter, Gauge, IntGauge, Registry};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Default metrics about the exporter process itself, served next to the
/// cluster metrics when `--default-metrics` is set.
///
/// - `process_cpu_seconds_total` (Counter): user + system CPU time
/// - `process_resident_memory_bytes` / `process_virtual_memory_bytes`
/// - `process_threads`, `process_open_fds` (Linux only, 0 elsewhere)
/// - `process_start_time_seconds`
#[derive(Clone)]
pub struct ProcessMetrics {
    registry: Registry,
    cpu_seconds_total: Counter,
    resident_memory_bytes: IntGauge,
    virtual_memory_bytes: IntGauge,
    open_fds: IntGauge,
    threads: IntGauge,
    start_time_seconds: Gauge,
    state: Arc<Mutex<State>>,
    pid: Pid,
}

struct State {
    system: System,
    last_cpu_time: Option<Duration>,
}

impl ProcessMetrics {
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be registered.
    pub fn new() -> Result<Self> {
        let cpu_seconds_total = Counter::new(
            "process_cpu_seconds_total",
            "Total user and system CPU time spent in seconds",
        )?;
        let resident_memory_bytes =
            IntGauge::new("process_resident_memory_bytes", "Resident memory size in bytes")?;
        let virtual_memory_bytes =
            IntGauge::new("process_virtual_memory_bytes", "Virtual memory size in bytes")?;
        let open_fds = IntGauge::new("process_open_fds", "Number of open file descriptors")?;
        let threads = IntGauge::new("process_threads", "Number of OS threads in the process")?;
        let start_time_seconds = Gauge::new(
            "process_start_time_seconds",
            "Start time of the process since unix epoch in seconds",
        )?;

        let registry = Registry::new();
        registry.register(Box::new(cpu_seconds_total.clone()))?;
        registry.register(Box::new(resident_memory_bytes.clone()))?;
        registry.register(Box::new(virtual_memory_bytes.clone()))?;
        registry.register(Box::new(open_fds.clone()))?;
        registry.register(Box::new(threads.clone()))?;
        registry.register(Box::new(start_time_seconds.clone()))?;

        Ok(Self {
            registry,
            cpu_seconds_total,
            resident_memory_bytes,
            virtual_memory_bytes,
            open_fds,
            threads,
            start_time_seconds,
            state: Arc::new(Mutex::new(State {
                system: System::new(),
                last_cpu_time: None,
            })),
            pid: Pid::from_u32(std::process::id()),
        })
    }

    /// Refresh from the OS and return the families.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.refresh();
        self.registry.gather()
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
    fn refresh(&self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("process metrics state was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        state
            .system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let Some(process) = state.system.process(self.pid) else {
            debug!(pid = %self.pid, "exporter process not found");
            return;
        };

        let rss = process.memory();
        let vsz = process.virtual_memory();
        let cpu_time = Duration::from_millis(process.accumulated_cpu_time());
        let started = process.start_time();

        self.resident_memory_bytes.set(rss as i64);
        self.virtual_memory_bytes.set(vsz as i64);
        self.start_time_seconds.set(started as f64);

        let delta = state
            .last_cpu_time
            .map_or(cpu_time, |last| cpu_time.saturating_sub(last));
        self.cpu_seconds_total.inc_by(delta.as_secs_f64());
        state.last_cpu_time = Some(cpu_time);

        self.threads.set(count_proc_entries(self.pid, "task"));
        self.open_fds.set(count_proc_entries(self.pid, "fd"));

        debug!(
            rss_mb = rss / 1024 / 1024,
            cpu_seconds_total = self.cpu_seconds_total.get(),
            threads = self.threads.get(),
            fds = self.open_fds.get(),
            "collected process metrics"
        );
    }
}

#[cfg(target_os = "linux")]
#[allow(clippy::cast_possible_wrap)]
fn count_proc_entries(pid: Pid, dir: &str) -> i64 {
    std::fs::read_dir(format!("/proc/{pid}/{dir}")).map_or(0, |entries| entries.count() as i64)
}

#[cfg(not(target_os = "linux"))]
fn count_proc_entries(_pid: Pid, _dir: &str) -> i64 {
    0
}
