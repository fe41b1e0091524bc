use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Latency summary of a batch run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
    pub elapsed: Duration,
    pub average: Duration,
    pub median: Duration,
    pub p95: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl LatencyReport {
    /// Summarize the per-job latencies of successful jobs
    pub fn new(mut samples: Vec<Duration>, failed: usize, bytes: u64, elapsed: Duration) -> Self {
        samples.sort_unstable();
        let total: Duration = samples.iter().sum();
        let average = match samples.len() {
            0 => Duration::ZERO,
            n => total / n as u32,
        };

        Self {
            succeeded: samples.len(),
            failed,
            bytes,
            elapsed,
            average,
            median: median(&samples),
            p95: percentile(&samples, 95),
            min: samples.first().copied().unwrap_or_default(),
            max: samples.last().copied().unwrap_or_default(),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Documents per second over the wall-clock time
    pub fn throughput(&self) -> f64 {
        per_second(self.succeeded as f64, self.elapsed)
    }

    /// Kilobytes per second over the wall-clock time
    pub fn kb_per_second(&self) -> f64 {
        per_second(self.bytes as f64 / 1024.0, self.elapsed)
    }
}

fn per_second(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

/// Expects sorted samples
fn median(sorted: &[Duration]) -> Duration {
    let n = sorted.len();
    match n {
        0 => Duration::ZERO,
        _ if n % 2 == 0 => (sorted[n / 2 - 1] + sorted[n / 2]) / 2,
        _ => sorted[n / 2],
    }
}

/// Nearest-rank percentile; expects sorted samples
fn percentile(sorted: &[Duration], percentile: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let index = (sorted.len() * percentile / 100).min(sorted.len() - 1);
    sorted[index]
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "documents:   {} ok, {} failed", self.succeeded, self.failed)?;
        writeln!(f, "elapsed:     {:?}", self.elapsed)?;
        writeln!(f, "average:     {:?}", self.average)?;
        writeln!(f, "median:      {:?}", self.median)?;
        writeln!(f, "p95:         {:?}", self.p95)?;
        writeln!(f, "min:         {:?}", self.min)?;
        writeln!(f, "max:         {:?}", self.max)?;
        writeln!(f, "throughput:  {:.2} documents/second", self.throughput())?;
        write!(f, "throughput:  {:.2} KB/second", self.kb_per_second())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_report() {
        let report = LatencyReport::new(
            ms(&[40, 10, 30, 20]),
            1,
            4 * 1024,
            Duration::from_secs(2),
        );
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.total(), 5);
        assert_eq!(report.average, Duration::from_millis(25));
        assert_eq!(report.median, Duration::from_millis(25));
        assert_eq!(report.p95, Duration::from_millis(40));
        assert_eq!(report.min, Duration::from_millis(10));
        assert_eq!(report.max, Duration::from_millis(40));
        assert_eq!(report.throughput(), 2.0);
        assert_eq!(report.kb_per_second(), 2.0);
    }

    #[test]
    fn test_odd_median_and_percentile() {
        let samples = ms(&(1..=21).collect::<Vec<_>>());
        let report = LatencyReport::new(samples, 0, 0, Duration::from_secs(1));
        assert_eq!(report.median, Duration::from_millis(11));
        // index 21 * 95 / 100 = 19
        assert_eq!(report.p95, Duration::from_millis(20));
    }

    #[test]
    fn test_empty_report() {
        let report = LatencyReport::new(Vec::new(), 3, 0, Duration::ZERO);
        assert_eq!(report.average, Duration::ZERO);
        assert_eq!(report.median, Duration::ZERO);
        assert_eq!(report.throughput(), 0.0);
        assert!(report.to_string().contains("0 ok, 3 failed"));
    }
}
