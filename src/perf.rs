use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Samples kept per span name
const MAX_SAMPLES: usize = 1000;

/// Aggregate of one span name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanSummary {
    pub name: String,
    pub count: usize,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Collects named duration samples
#[derive(Debug)]
pub struct PerfRegistry {
    samples: DashMap<String, VecDeque<f64>>,
    slow_threshold: Duration,
}

impl Default for PerfRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl PerfRegistry {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            samples: DashMap::new(),
            slow_threshold,
        }
    }

    /// Start timing `name`; the sample is recorded when the guard drops
    pub fn span(self: &Arc<Self>, name: &str) -> PerfSpan {
        PerfSpan {
            registry: Arc::clone(self),
            name: name.to_string(),
            started: Instant::now(),
        }
    }

    pub fn record(&self, name: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed >= self.slow_threshold {
            debug!("[PERF] {} took {:.2} ms", name, elapsed_ms);
        }

        let mut samples = self.samples.entry(name.to_string()).or_default();
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(elapsed_ms);
    }

    /// Per-name count, mean, nearest-rank 95th percentile and max, sorted by name
    pub fn summary(&self) -> Vec<SpanSummary> {
        let mut summaries: Vec<SpanSummary> = self
            .samples
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| {
                let mut sorted: Vec<f64> = entry.value().iter().copied().collect();
                sorted.sort_by(|a, b| a.total_cmp(b));

                let count = sorted.len();
                let rank = ((count as f64) * 0.95).ceil() as usize;
                let p95 = sorted[rank.clamp(1, count) - 1];

                SpanSummary {
                    name: entry.key().clone(),
                    count,
                    avg_ms: sorted.iter().sum::<f64>() / count as f64,
                    p95_ms: p95,
                    max_ms: sorted[count - 1],
                }
            })
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Log the summary at info level
    pub fn log_summary(&self) {
        for span in self.summary() {
            info!(
                "[PERF] {}: count={} avg={:.2}ms p95={:.2}ms max={:.2}ms",
                span.name, span.count, span.avg_ms, span.p95_ms, span.max_ms
            );
        }
    }

    pub fn clear(&self) {
        self.samples.clear();
    }
}

/// Scoped measurement; records into its registry on drop
pub struct PerfSpan {
    registry: Arc<PerfRegistry>,
    name: String,
    started: Instant,
}

impl PerfSpan {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        self.registry.record(&self.name, self.started.elapsed());
    }
}

#[cfg(test)]
#[path = "perf_test.rs"]
mod perf_test;
