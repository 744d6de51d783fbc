//! Pipeline statistics tracking.
//!
//! Tracks call counts, cache hits, token activity, advisory failures and
//! latencies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Latencies kept for percentile calculation
const LATENCY_WINDOW: usize = 1000;

/// Thread-safe pipeline statistics
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Completed sanitize calls
    calls: AtomicU64,
    /// Calls that failed closed
    failures: AtomicU64,
    /// Calls whose output was already cached
    cache_hits: AtomicU64,
    /// Tokens minted
    tokens_minted: AtomicU64,
    /// Presented tokens that failed validation
    tokens_rejected: AtomicU64,
    /// Audit sink failures
    audit_failures: AtomicU64,
    /// Validation hook failures
    hook_failures: AtomicU64,
    /// Bytes in / out
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    /// Call latencies
    latencies: RwLock<Vec<Duration>>,
    /// Start time
    started_at: RwLock<Option<Instant>>,
}

impl PipelineStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: RwLock::new(Some(Instant::now())),
            ..Default::default()
        }
    }

    /// Record a completed call
    pub fn record_call(&self, bytes_in: usize, bytes_out: usize, latency: Duration, cache_hit: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in as u64, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out as u64, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push(latency);
            if latencies.len() > LATENCY_WINDOW {
                latencies.remove(0);
            }
        }
    }

    /// Record a call that failed closed
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a minted token
    pub fn record_token_minted(&self) {
        self.tokens_minted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected presented token
    pub fn record_token_rejected(&self) {
        self.tokens_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an audit sink failure
    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a validation hook failure
    pub fn record_hook_failure(&self) {
        self.hook_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed calls
    pub fn total_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls that failed closed
    pub fn total_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Cache hits
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Tokens minted
    pub fn tokens_minted(&self) -> u64 {
        self.tokens_minted.load(Ordering::Relaxed)
    }

    /// Presented tokens rejected
    pub fn tokens_rejected(&self) -> u64 {
        self.tokens_rejected.load(Ordering::Relaxed)
    }

    /// Audit sink failures
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Hook failures
    pub fn hook_failures(&self) -> u64 {
        self.hook_failures.load(Ordering::Relaxed)
    }

    /// Fraction of completed calls served from an existing cache entry
    pub fn cache_hit_ratio(&self) -> f64 {
        let calls = self.total_calls();
        if calls == 0 {
            0.0
        } else {
            self.cache_hits() as f64 / calls as f64
        }
    }

    /// p50 latency
    pub fn p50_latency(&self) -> Option<Duration> {
        self.percentile_latency(50)
    }

    /// p99 latency
    pub fn p99_latency(&self) -> Option<Duration> {
        self.percentile_latency(99)
    }

    /// Fastest call in the window
    pub fn min_latency(&self) -> Option<Duration> {
        self.latencies.read().ok()?.iter().min().copied()
    }

    /// Slowest call in the window
    pub fn max_latency(&self) -> Option<Duration> {
        self.latencies.read().ok()?.iter().max().copied()
    }

    /// Mean over the window
    pub fn mean_latency(&self) -> Option<Duration> {
        let latencies = self.latencies.read().ok()?;
        let count = u32::try_from(latencies.len()).ok().filter(|&n| n > 0)?;
        Some(latencies.iter().sum::<Duration>() / count)
    }

    fn percentile_latency(&self, percentile: usize) -> Option<Duration> {
        let latencies = self.latencies.read().ok()?;
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        Some(sorted[idx])
    }

    /// Time since creation
    pub fn uptime(&self) -> Duration {
        self.started_at
            .read()
            .ok()
            .and_then(|s| s.map(|start| start.elapsed()))
            .unwrap_or_default()
    }

    /// Snapshot as a serializable struct
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            total_calls: self.total_calls(),
            total_failures: self.total_failures(),
            cache_hits: self.cache_hits(),
            cache_hit_ratio: self.cache_hit_ratio(),
            tokens_minted: self.tokens_minted(),
            tokens_rejected: self.tokens_rejected(),
            audit_failures: self.audit_failures(),
            hook_failures: self.hook_failures(),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            min_latency_ms: self.min_latency().map(|d| d.as_secs_f64() * 1000.0),
            max_latency_ms: self.max_latency().map(|d| d.as_secs_f64() * 1000.0),
            mean_latency_ms: self.mean_latency().map(|d| d.as_secs_f64() * 1000.0),
            p50_latency_ms: self.p50_latency().map(|d| d.as_secs_f64() * 1000.0),
            p99_latency_ms: self.p99_latency().map(|d| d.as_secs_f64() * 1000.0),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// Statistics snapshot
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total_calls: u64,
    pub total_failures: u64,
    pub cache_hits: u64,
    pub cache_hit_ratio: f64,
    pub tokens_minted: u64,
    pub tokens_rejected: u64,
    pub audit_failures: u64,
    pub hook_failures: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub mean_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call() {
        let stats = PipelineStats::new();
        stats.record_call(100, 80, Duration::from_millis(2), false);
        stats.record_call(100, 80, Duration::from_millis(4), true);

        assert_eq!(stats.total_calls(), 2);
        assert_eq!(stats.cache_hits(), 1);
        assert!((stats.cache_hit_ratio() - 0.5).abs() < f64::EPSILON);
        assert!(stats.p50_latency().is_some());
        assert_eq!(stats.min_latency(), Some(Duration::from_millis(2)));
        assert_eq!(stats.max_latency(), Some(Duration::from_millis(4)));
        assert_eq!(stats.mean_latency(), Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_advisory_counters() {
        let stats = PipelineStats::new();
        stats.record_audit_failure();
        stats.record_hook_failure();
        stats.record_token_rejected();
        stats.record_failure();

        let summary = stats.summary();
        assert_eq!(summary.audit_failures, 1);
        assert_eq!(summary.hook_failures, 1);
        assert_eq!(summary.tokens_rejected, 1);
        assert_eq!(summary.total_failures, 1);
        assert_eq!(summary.total_calls, 0);
    }

    #[test]
    fn test_empty_latencies() {
        let stats = PipelineStats::new();
        assert!(stats.p99_latency().is_none());
        assert!(stats.mean_latency().is_none());
        assert_eq!(stats.cache_hit_ratio(), 0.0);
    }
}
