// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::time::Duration;

use itertools::Itertools;
use sysinfo::System;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PerformanceMetrics {
    pub(crate) records_per_second: f64,
    pub(crate) memory_usage_percent: f64,
    pub(crate) cpu_usage_percent: f64,
    pub(crate) duration_seconds: f64,
    pub(crate) total_records: u64,
}

impl PerformanceMetrics {
    pub(crate) fn log(&self, table: &str) {
        log::info!("performance metrics for {table}:");
        log::info!("  records/second: {:.2}", self.records_per_second);
        log::info!("  memory usage: {:.1}%", self.memory_usage_percent);
        log::info!("  cpu usage: {:.1}%", self.cpu_usage_percent);
        log::info!("  duration: {:.2}s", self.duration_seconds);
        log::info!("  total records: {}", grouped(self.total_records));
    }
}

/// System-wide resource readings.
pub(crate) struct Sampler {
    system: System,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}

impl Sampler {
    pub(crate) fn new() -> Self {
        let mut system = System::new();
        // cpu usage is measured between two refreshes
        system.refresh_cpu_usage();
        Self { system }
    }

    pub(crate) fn measure(&mut self, duration: Duration, records: u64) -> PerformanceMetrics {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let seconds = duration.as_secs_f64();
        let total_memory = self.system.total_memory();

        PerformanceMetrics {
            records_per_second: if seconds > 0.0 {
                records as f64 / seconds
            } else {
                0.0
            },
            memory_usage_percent: if total_memory > 0 {
                self.system.used_memory() as f64 / total_memory as f64 * 100.0
            } else {
                0.0
            },
            cpu_usage_percent: f64::from(self.system.global_cpu_usage()),
            duration_seconds: seconds,
            total_records: records,
        }
    }
}

/// Formats `12345` as `12,345`.
pub(crate) fn grouped(value: u64) -> String {
    let digits = value.to_string().chars().collect::<Vec<_>>();
    digits
        .rchunks(3)
        .rev()
        .map(|chunk| chunk.iter().collect::<String>())
        .join(",")
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use test_log::test;

    use super::{Sampler, grouped};

    #[test]
    fn grouping() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(999), "999");
        assert_eq!(grouped(1000), "1,000");
        assert_eq!(grouped(1_234_567), "1,234,567");
    }

    #[test]
    fn rate() {
        let mut sampler = Sampler::new();

        let metrics = sampler.measure(Duration::from_secs(4), 1000);
        assert_eq!(metrics.records_per_second, 250.0);
        assert_eq!(metrics.total_records, 1000);
        assert!((0.0..=100.0).contains(&metrics.memory_usage_percent));

        let instant = sampler.measure(Duration::ZERO, 1000);
        assert_eq!(instant.records_per_second, 0.0);
    }
}
