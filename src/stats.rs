//! Aggregation of run outcomes into the final report.
//!
//! Successful responses are grouped by status code, and each group keeps an
//! HDR histogram of its latencies (microseconds, 3 significant digits).
//! Everything else is only counted.

use hdrhistogram::Histogram;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::warn;

use crate::errors::status_code_name;
use crate::outcome::ExecutionOutcome;

/// Groups with fewer samples than this get no distribution in the report.
pub const MIN_DISTRIBUTION_SAMPLES: u64 = 5;

/// Latencies above one hour are clamped.
const MAX_LATENCY_US: u64 = 3_600_000_000;

/// Latency distribution of one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    pub fastest: Duration,
    pub p20: Duration,
    pub p40: Duration,
    pub p60: Duration,
    pub p80: Duration,
    pub slowest: Duration,
}

#[derive(Debug)]
struct StatusGroup {
    count: u64,
    total: Duration,
    histogram: Histogram<u64>,
}

impl StatusGroup {
    fn new() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            // Constant bounds, always valid
            histogram: Histogram::new_with_bounds(1, MAX_LATENCY_US, 3)
                .expect("Failed to create histogram"),
        }
    }

    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;

        let latency_us = u64::try_from(duration.as_micros())
            .unwrap_or(MAX_LATENCY_US)
            .clamp(1, MAX_LATENCY_US);
        if let Err(e) = self.histogram.record(latency_us) {
            warn!(latency_us, error = %e, "Failed to record latency in histogram");
        }
    }

    fn quantile(&self, quantile: f64) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(quantile))
    }

    fn distribution(&self) -> Option<Distribution> {
        if self.count < MIN_DISTRIBUTION_SAMPLES {
            return None;
        }

        Some(Distribution {
            fastest: Duration::from_micros(self.histogram.min()),
            p20: self.quantile(0.2),
            p40: self.quantile(0.4),
            p60: self.quantile(0.6),
            p80: self.quantile(0.8),
            slowest: Duration::from_micros(self.histogram.max()),
        })
    }
}

/// Collects statistics about the outcomes of a run.
#[derive(Debug)]
pub struct Stats {
    concurrency: usize,
    requests: u64,
    total_duration: Duration,
    success: BTreeMap<i32, StatusGroup>,
    non_success: BTreeMap<i32, u64>,
}

impl Stats {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            requests: 0,
            total_duration: Duration::ZERO,
            success: BTreeMap::new(),
            non_success: BTreeMap::new(),
        }
    }

    pub fn update(&mut self, outcome: &ExecutionOutcome) {
        self.requests += 1;
        self.total_duration += outcome.duration;

        if outcome.is_success() {
            self.success
                .entry(outcome.status_code)
                .or_insert_with(StatusGroup::new)
                .record(outcome.duration);
        } else {
            *self.non_success.entry(outcome.status_code).or_insert(0) += 1;
        }
    }

    /// Outcomes seen so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Mean duration over every outcome, zero when there are none.
    pub fn average(&self) -> Duration {
        average(self.total_duration, self.requests)
    }

    /// Requests per second over the wall-clock run time.
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.requests as f64 / secs
        } else {
            0.0
        }
    }

    /// Count of 2xx responses with the given status.
    pub fn success_count(&self, status_code: i32) -> u64 {
        self.success.get(&status_code).map(|g| g.count).unwrap_or(0)
    }

    /// Count of outcomes with a non-2xx status or a client error code.
    pub fn non_success_count(&self, status_code: i32) -> u64 {
        self.non_success.get(&status_code).copied().unwrap_or(0)
    }

    pub fn distribution(&self, status_code: i32) -> Option<Distribution> {
        self.success.get(&status_code)?.distribution()
    }

    /// Render the final report.
    pub fn report(&self, elapsed: Duration) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== Result Stats ===");
        let _ = writeln!(out, "Executed requests: {}", self.requests);
        let _ = writeln!(out, "Concurrent requests: {}", self.concurrency);
        let _ = writeln!(out, "Time taken to complete: {:?}", elapsed);
        let _ = writeln!(out, "Requests per second: {:.4}", self.throughput(elapsed));
        let _ = writeln!(out, "Avg response time: {:?}", self.average());

        for (status, group) in &self.success {
            let _ = writeln!(out, "=== Status {} ===", status);
            let _ = writeln!(
                out,
                "{} requests, with avg response time of {:?}",
                group.count,
                average(group.total, group.count)
            );

            if let Some(dist) = group.distribution() {
                let _ = writeln!(out, "And the following distribution:");
                let _ = writeln!(out, "- The fastest request took {:?}", dist.fastest);
                let _ = writeln!(out, "- 20% of requests under {:?}", dist.p20);
                let _ = writeln!(out, "- 40% of requests under {:?}", dist.p40);
                let _ = writeln!(out, "- 60% of requests under {:?}", dist.p60);
                let _ = writeln!(out, "- 80% of requests under {:?}", dist.p80);
                let _ = writeln!(out, "- The slowest request took {:?}", dist.slowest);
            }
        }

        if !self.non_success.is_empty() {
            let _ = writeln!(out, "=== Non Success Status ===");
            for (status, count) in &self.non_success {
                let _ = writeln!(
                    out,
                    "Status {} ({}): {} requests",
                    status,
                    status_code_name(*status),
                    count
                );
            }
        }

        out
    }

    /// Prints the final report.
    pub fn print(&self, elapsed: Duration) {
        print!("{}", self.report(elapsed));
    }
}

fn average(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}
