use anyhow::{Result, bail};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Task {
    name: String,
    elapsed: Duration,
}

/// Times named, non-overlapping tasks and renders a proportional breakdown.
///
/// ```
/// # use gp_exporter::collectors::stopwatch::Stopwatch;
/// # fn main() -> anyhow::Result<()> {
/// let mut watch = Stopwatch::new("scrape");
/// watch.start("check connections")?;
/// watch.stop()?;
/// assert_eq!(watch.task_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Stopwatch {
    id: String,
    running: Option<(String, Instant)>,
    tasks: Vec<Task>,
    total: Duration,
}

impl Stopwatch {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            running: None,
            tasks: Vec::new(),
            total: Duration::ZERO,
        }
    }

    /// Start timing `task`.
    ///
    /// # Errors
    ///
    /// Fails if `task` is empty or another task is still running.
    pub fn start(&mut self, task: impl Into<String>) -> Result<()> {
        let task = task.into();

        if task.is_empty() {
            bail!("task name must not be empty");
        }

        if let Some((current, _)) = &self.running {
            bail!("can not start new task, current task: {current} is running");
        }

        self.running = Some((task, Instant::now()));

        Ok(())
    }

    /// Stop the running task and record its elapsed time.
    ///
    /// # Errors
    ///
    /// Fails if no task is running.
    pub fn stop(&mut self) -> Result<()> {
        let Some((name, started)) = self.running.take() else {
            bail!("can not stop stopwatch '{}': it's not running", self.id);
        };

        self.record(name, started.elapsed());

        Ok(())
    }

    fn record(&mut self, name: String, elapsed: Duration) {
        self.total += elapsed;
        self.tasks.push(Task { name, elapsed });
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Names of the recorded tasks, in the order they ran.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    #[must_use]
    pub fn short_summary(&self) -> String {
        format!(
            "StopWatch '{}': running time (ms) = {}\n",
            self.id,
            self.total.as_millis()
        )
    }

    /// Table of every task with its milliseconds and share of the total.
    #[must_use]
    pub fn pretty_print(&self) -> String {
        let mut buf = self.short_summary();

        buf.push_str("-----------------------------------------\n");
        buf.push_str("ms        %         Task name\n");
        buf.push_str("-----------------------------------------\n");

        for task in &self.tasks {
            let percent = if self.total.is_zero() {
                0
            } else {
                task.elapsed.as_nanos() * 100 / self.total.as_nanos()
            };

            let _ = writeln!(
                buf,
                "{:<10}{:<10}{}",
                task.elapsed.as_millis(),
                format!("{percent}%"),
                task.name
            );
        }

        buf
    }

    pub fn clear(&mut self) {
        self.running = None;
        self.tasks.clear();
        self.total = Duration::ZERO;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_records_task() {
        let mut watch = Stopwatch::new("scrape");
        watch.start("check connections").unwrap();
        assert!(watch.is_running());
        watch.stop().unwrap();

        assert!(!watch.is_running());
        assert_eq!(watch.task_count(), 1);
        assert_eq!(watch.task_names().collect::<Vec<_>>(), vec!["check connections"]);
    }

    #[test]
    fn test_overlapping_start_is_rejected() {
        let mut watch = Stopwatch::new("scrape");
        watch.start("a").unwrap();

        let err = watch.start("b").unwrap_err();
        assert!(err.to_string().contains("current task: a is running"));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut watch = Stopwatch::new("scrape");
        assert!(watch.start("").is_err());
    }

    #[test]
    fn test_stop_without_start_fails() {
        let mut watch = Stopwatch::new("scrape");
        assert!(watch.stop().is_err());
    }

    #[test]
    fn test_pretty_print_proportions() {
        let mut watch = Stopwatch::new("scrape");
        watch.record("fast".to_string(), Duration::from_millis(25));
        watch.record("slow".to_string(), Duration::from_millis(75));

        let out = watch.pretty_print();
        assert!(out.starts_with("StopWatch 'scrape': running time (ms) = 100\n"));
        assert!(out.contains("25        25%       fast\n"));
        assert!(out.contains("75        75%       slow\n"));
    }

    #[test]
    fn test_pretty_print_zero_total() {
        let mut watch = Stopwatch::new("scrape");
        watch.record("noop".to_string(), Duration::ZERO);

        assert!(watch.pretty_print().contains("0         0%        noop\n"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut watch = Stopwatch::new("scrape");
        watch.record("x".to_string(), Duration::from_millis(5));
        watch.start("y").unwrap();
        watch.clear();

        assert_eq!(watch.task_count(), 0);
        assert_eq!(watch.total(), Duration::ZERO);
        assert!(!watch.is_running());
    }
}
