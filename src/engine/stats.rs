use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    HttpStatus,
    Connection,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure(FailureKind),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// The result of a single request attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub user_id: u32,
    pub outcome: Outcome,
    pub latency_ms: f64,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBreakdown {
    pub timeout: u64,
    pub http_status: u64,
    pub connection: u64,
    pub other: u64,
}

impl FailureBreakdown {
    fn bump(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Timeout => self.timeout += 1,
            FailureKind::HttpStatus => self.http_status += 1,
            FailureKind::Connection => self.connection += 1,
            FailureKind::Other => self.other += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.timeout + self.http_status + self.connection + self.other
    }
}

/// Aggregate statistics of one run.
///
/// `response_times` and `timestamps` are parallel sequences in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub response_times: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub errors: VecDeque<String>,
    pub errors_dropped: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub failures: FailureBreakdown,
}

impl RunStats {
    fn apply(&mut self, measurement: Measurement, max_errors: usize) {
        self.total_requests += 1;
        self.response_times.push(measurement.latency_ms);
        self.timestamps.push(measurement.timestamp);

        if let Some(status) = measurement.status {
            *self.status_codes.entry(status).or_insert(0) += 1;
        }

        match measurement.outcome {
            Outcome::Success => self.successful_requests += 1,
            Outcome::Failure(kind) => {
                self.failed_requests += 1;
                self.failures.bump(kind);

                let detail = measurement.error.as_deref().unwrap_or("Unknown error");
                self.errors
                    .push_back(format!("User {}: {}", measurement.user_id, detail));
                while self.errors.len() > max_errors {
                    self.errors.pop_front();
                    self.errors_dropped += 1;
                }
            }
        }
    }

    /// Success rate as a percentage in `[0, 100]`; zero when nothing was sent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.response_times.is_empty() {
            0.0
        } else {
            self.response_times.iter().sum::<f64>() / self.response_times.len() as f64
        }
    }

    pub fn min_latency_ms(&self) -> f64 {
        self.response_times
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    pub fn max_latency_ms(&self) -> f64 {
        self.response_times
            .iter()
            .copied()
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    pub fn summarize(&self, elapsed: Duration) -> StatsSummary {
        let mut sorted_times = self.response_times.clone();
        sorted_times.sort_by(|a, b| a.total_cmp(b));

        let percentile = |p: usize| -> f64 {
            if sorted_times.is_empty() {
                return 0.0;
            }
            let index = (sorted_times.len() * p / 100).min(sorted_times.len() - 1);
            sorted_times[index]
        };

        let requests_per_second = if elapsed > Duration::ZERO {
            self.total_requests as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        StatsSummary {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            success_rate: self.success_rate(),
            average_latency_ms: self.average_latency_ms(),
            min_latency_ms: self.min_latency_ms(),
            max_latency_ms: self.max_latency_ms(),
            p50_latency_ms: percentile(50),
            p95_latency_ms: percentile(95),
            p99_latency_ms: percentile(99),
            requests_per_second,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub requests_per_second: f64,
}

/// Shared handle to the statistics of the current run.
///
/// Every mutation happens under a single lock, so concurrent `record` calls
/// from all virtual users never lose a count or interleave a sequence.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    inner: Arc<Mutex<RunStats>>,
    max_errors: usize,
}

impl StatsAggregator {
    pub fn new(max_errors: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunStats::default())),
            max_errors,
        }
    }

    pub async fn record(&self, measurement: Measurement) {
        trace!(
            user = measurement.user_id,
            outcome = ?measurement.outcome,
            latency_ms = measurement.latency_ms,
            "measurement"
        );
        let mut stats = self.inner.lock().await;
        stats.apply(measurement, self.max_errors);
    }

    /// Clear everything. Callers must ensure no loop of a previous run can still record.
    pub async fn reset(&self) {
        let mut stats = self.inner.lock().await;
        *stats = RunStats::default();
    }

    pub async fn snapshot(&self) -> RunStats {
        self.inner.lock().await.clone()
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(1000)
    }
}
