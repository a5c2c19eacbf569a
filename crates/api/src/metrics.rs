use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counters exposed at `/metrics`.
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_ingest_time_us: AtomicU64,
    total_query_time_us: AtomicU64,
    total_search_time_us: AtomicU64,
    total_idea_time_us: AtomicU64,

    // Counts
    documents_ingested: AtomicUsize,
    total_chunks_processed: AtomicUsize,
    queries_answered: AtomicUsize,
    searches_run: AtomicUsize,
    ideas_generated: AtomicUsize,
    idea_requests: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            total_ingest_time_us: AtomicU64::new(0),
            total_query_time_us: AtomicU64::new(0),
            total_search_time_us: AtomicU64::new(0),
            total_idea_time_us: AtomicU64::new(0),
            documents_ingested: AtomicUsize::new(0),
            total_chunks_processed: AtomicUsize::new(0),
            queries_answered: AtomicUsize::new(0),
            searches_run: AtomicUsize::new(0),
            ideas_generated: AtomicUsize::new(0),
            idea_requests: AtomicUsize::new(0),
        })
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ingest(&self, duration: Duration, chunks: usize) {
        add_micros(&self.total_ingest_time_us, duration);
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.total_chunks_processed.fetch_add(chunks, Ordering::Relaxed);
    }

    pub fn record_query(&self, duration: Duration) {
        add_micros(&self.total_query_time_us, duration);
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search(&self, duration: Duration) {
        add_micros(&self.total_search_time_us, duration);
        self.searches_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ideas(&self, duration: Duration, ideas: usize) {
        add_micros(&self.total_idea_time_us, duration);
        self.idea_requests.fetch_add(1, Ordering::Relaxed);
        self.ideas_generated.fetch_add(ideas, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            total_chunks_processed: self.total_chunks_processed.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            searches_run: self.searches_run.load(Ordering::Relaxed),
            ideas_generated: self.ideas_generated.load(Ordering::Relaxed),
            avg_ingest_time_ms: avg_time_ms(&self.total_ingest_time_us, &self.documents_ingested),
            avg_query_time_ms: avg_time_ms(&self.total_query_time_us, &self.queries_answered),
            avg_search_time_ms: avg_time_ms(&self.total_search_time_us, &self.searches_run),
            avg_idea_time_ms: avg_time_ms(&self.total_idea_time_us, &self.idea_requests),
        }
    }
}

fn add_micros(total: &AtomicU64, duration: Duration) {
    total.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub documents_ingested: usize,
    pub total_chunks_processed: usize,
    pub queries_answered: usize,
    pub searches_run: usize,
    pub ideas_generated: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_query_time_ms: f64,
    pub avg_search_time_ms: f64,
    pub avg_idea_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_are_per_operation() {
        let metrics = Metrics::new();
        metrics.record_ingest(Duration::from_millis(10), 3);
        metrics.record_ingest(Duration::from_millis(30), 5);
        metrics.record_query(Duration::from_millis(4));

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.total_chunks_processed, 8);
        assert!((snapshot.avg_ingest_time_ms - 20.0).abs() < 1e-9);
        assert!((snapshot.avg_query_time_ms - 4.0).abs() < 1e-9);
        assert_eq!(snapshot.avg_search_time_ms, 0.0);
    }

    #[test]
    fn requests_split_by_outcome() {
        let metrics = Metrics::new();
        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_request(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
    }
}
