//! Usage snapshot translation.
//!
//! Converts raw cgroup accounting (tick counters and `key value` text
//! blobs) into a structured, rate-computed [`UsageSnapshot`]. CPU
//! percentages come from stateful rate accumulators; the first sample
//! after creation or reattach necessarily reports 0%.

use std::time::Instant;

use lxtask_common::constants::CLOCK_TICKS_PER_SEC;
use lxtask_common::types::{CpuTimes, CpuUsage, MemoryUsage};
use lxtask_lxc::container::LxcContainer;

/// One rate accumulator: percentage of a core from tick deltas over
/// elapsed wall time.
#[derive(Debug, Default)]
pub struct CpuRate {
    last_value: f64,
    last_sample: Option<Instant>,
}

impl CpuRate {
    /// Creates an accumulator with no prior sample.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_value: 0.0,
            last_sample: None,
        }
    }

    /// Feeds a new cumulative tick count, returning the usage percentage
    /// since the previous sample.
    pub fn percent(&mut self, value: f64) -> f64 {
        self.percent_at(value, Instant::now())
    }

    fn percent_at(&mut self, value: f64, now: Instant) -> f64 {
        let pct = match self.last_sample {
            Some(prev) => {
                let elapsed = now.duration_since(prev).as_secs_f64();
                if elapsed > 0.0 {
                    let delta = (value - self.last_value).max(0.0);
                    delta / (elapsed * CLOCK_TICKS_PER_SEC) * 100.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last_value = value;
        self.last_sample = Some(now);
        pct
    }
}

/// The three independent accumulators a handle keeps for its lifetime.
#[derive(Debug, Default)]
pub(crate) struct CpuRates {
    pub total: CpuRate,
    pub user: CpuRate,
    pub system: CpuRate,
}

impl CpuRates {
    /// Produces the CPU portion of a snapshot from a fresh sample.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&mut self, times: CpuTimes, total_ticks: u64) -> CpuUsage {
        CpuUsage {
            system_mode: self.system.percent(times.system as f64),
            user_mode: self.user.percent(times.user as f64),
            percent: self.total.percent(total_ticks as f64),
            total_ticks: (times.user + times.system) as f64,
        }
    }
}

/// Collects the memory portion of a snapshot from the container's cgroup
/// accounting files. Missing files yield zeroes, never errors.
pub(crate) fn collect_memory(container: &dyn LxcContainer) -> MemoryUsage {
    let mut usage = MemoryUsage::default();

    for line in container.cgroup_item("memory.stat") {
        let Some((key, value)) = parse_stat_line(&line) else {
            tracing::warn!(%line, "skipping malformed memory.stat line");
            continue;
        };
        match key {
            "rss" => usage.rss = value,
            "cache" => usage.cache = value,
            "swap" => usage.swap = value,
            _ => {}
        }
    }

    usage.max_usage = single_value(container, "memory.max_usage_in_bytes");
    usage.kernel_usage = single_value(container, "memory.kmem.usage_in_bytes");
    usage.kernel_max_usage = single_value(container, "memory.kmem.max_usage_in_bytes");
    usage
}

/// Parses one `<key> <value>` accounting line.
fn parse_stat_line(line: &str) -> Option<(&str, u64)> {
    let mut tokens = line.split(' ');
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(key), Some(value), None) => Some((key, value.parse().ok()?)),
        _ => None,
    }
}

fn single_value(container: &dyn LxcContainer, key: &str) -> u64 {
    for line in container.cgroup_item(key) {
        match line.trim().parse() {
            Ok(value) => return value,
            Err(e) => {
                tracing::warn!(key, %line, error = %e, "unparseable cgroup value");
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testutil::FakeContainer;

    #[test]
    fn first_sample_reports_zero_percent() {
        let mut rate = CpuRate::new();
        assert!(rate.percent_at(1000.0, Instant::now()).abs() < f64::EPSILON);
    }

    #[test]
    fn second_sample_reports_positive_bounded_percent() {
        let mut rate = CpuRate::new();
        let start = Instant::now();
        let _ = rate.percent_at(1000.0, start);
        // 100 ticks over 1s is one full core at USER_HZ=100.
        let pct = rate.percent_at(1100.0, start + Duration::from_secs(1));
        assert!((pct - 100.0).abs() < 1e-6, "got {pct}");
    }

    #[test]
    fn counter_going_backwards_clamps_to_zero() {
        let mut rate = CpuRate::new();
        let start = Instant::now();
        let _ = rate.percent_at(1000.0, start);
        let pct = rate.percent_at(900.0, start + Duration::from_secs(1));
        assert!(pct.abs() < f64::EPSILON);
    }

    #[test]
    fn rates_sample_sums_total_ticks() {
        let mut rates = CpuRates::default();
        let usage = rates.sample(CpuTimes { user: 30, system: 12 }, 42);
        assert!((usage.total_ticks - 42.0).abs() < f64::EPSILON);
        assert!(usage.percent.abs() < f64::EPSILON);
    }

    #[test]
    fn memory_stat_lines_are_translated() {
        let container = FakeContainer::named("web-a1");
        container.set_item(
            "memory.stat",
            &["rss 1024", "cache 2048", "swap 512", "pgfault 99"],
        );
        container.set_item("memory.max_usage_in_bytes", &["4096"]);
        let usage = collect_memory(&container);
        assert_eq!(usage.rss, 1024);
        assert_eq!(usage.cache, 2048);
        assert_eq!(usage.swap, 512);
        assert_eq!(usage.max_usage, 4096);
        assert_eq!(usage.kernel_usage, 0);
    }

    #[test]
    fn malformed_stat_lines_are_skipped() {
        let container = FakeContainer::named("web-a1");
        container.set_item("memory.stat", &["rss", "rss notanumber", "rss 7"]);
        let usage = collect_memory(&container);
        assert_eq!(usage.rss, 7);
    }
}
