//! Request metrics for the phonebook server
//!
//! Lightweight, thread-safe counters shared by every session thread.
//! Collection is opt-in (`--metrics`); when disabled the server holds no
//! `Metrics` at all and sessions skip recording.
//!
//! Tracks:
//! - Request latencies with percentile calculations (p50, p95, p99)
//! - Slow request detection
//! - Per-command counts and average latencies
//! - Connections accepted and rejected

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::model::Command;

/// Rolling window of request latencies kept for percentiles.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Only the most recent slow requests are kept.
const MAX_SLOW_REQUESTS: usize = 10;

/// Requests taking at least this long are recorded as slow.
pub const SLOW_REQUEST_THRESHOLD_MS: u64 = 100;

/// Per-command counter pair.
#[derive(Default)]
struct CommandStats {
    count: AtomicU64,
    latency_sum_ms: AtomicU64,
}

/// Thread-safe metrics collector. Create one per server and share it via `Arc`.
pub struct Metrics {
    request_count: AtomicU64,
    slow_request_count: AtomicU64,

    /// Protected by mutex since VecDeque isn't atomic
    latencies_ms: Mutex<VecDeque<u64>>,

    add: CommandStats,
    delete: CommandStats,
    update: CommandStats,

    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,

    slow_requests: Mutex<VecDeque<SlowRequest>>,

    started_at: Instant,
}

/// A request that exceeded [`SLOW_REQUEST_THRESHOLD_MS`].
#[derive(Clone, Debug, PartialEq)]
pub struct SlowRequest {
    pub command: Command,
    pub duration_ms: u64,
    /// ms since metrics started
    pub timestamp_ms: u64,
}

/// Count and average latency for one command.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandStat {
    pub command: Command,
    pub count: u64,
    pub avg_ms: u64,
}

/// Point-in-time copy of all metrics. Plain values, no atomics.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub slow_request_count: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub avg_ms: u64,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    /// Commands with at least one request, most frequent first
    pub commands: Vec<CommandStat>,
    pub slow_requests: Vec<SlowRequest>,
    pub uptime_secs: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            slow_request_count: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            add: CommandStats::default(),
            delete: CommandStats::default(),
            update: CommandStats::default(),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            slow_requests: Mutex::new(VecDeque::with_capacity(MAX_SLOW_REQUESTS)),
            started_at: Instant::now(),
        }
    }

    fn stats_for(&self, command: Command) -> &CommandStats {
        match command {
            Command::Add => &self.add,
            Command::Delete => &self.delete,
            Command::Update => &self.update,
        }
    }

    /// Record one handled request.
    ///
    /// Returns `true` if the request counted as slow.
    pub fn record_request(&self, command: Command, duration_ms: u64) -> bool {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let stats = self.stats_for(command);
        stats.count.fetch_add(1, Ordering::Relaxed);
        stats.latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);

        // A poisoned window only loses percentile data
        if let Ok(mut latencies) = self.latencies_ms.lock() {
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                latencies.pop_front();
            }
            latencies.push_back(duration_ms);
        }

        if duration_ms < SLOW_REQUEST_THRESHOLD_MS {
            return false;
        }

        self.slow_request_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slow) = self.slow_requests.lock() {
            if slow.len() >= MAX_SLOW_REQUESTS {
                slow.pop_front();
            }
            slow.push_back(SlowRequest {
                command,
                duration_ms,
                timestamp_ms: self.started_at.elapsed().as_millis() as u64,
            });
        }
        true
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// O(LATENCY_WINDOW_SIZE) for the percentile sort.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = match self.latencies_ms.lock() {
            Ok(latencies) if !latencies.is_empty() => {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();

                let len = sorted.len();
                let avg = sorted.iter().sum::<u64>() / len as u64;
                (
                    sorted[len * 50 / 100],
                    sorted[len * 95 / 100],
                    sorted[len * 99 / 100],
                    avg,
                )
            }
            _ => (0, 0, 0, 0),
        };

        let mut commands: Vec<CommandStat> = [Command::Add, Command::Delete, Command::Update]
            .into_iter()
            .filter_map(|command| {
                let stats = self.stats_for(command);
                let count = stats.count.load(Ordering::Relaxed);
                (count > 0).then(|| CommandStat {
                    command,
                    count,
                    avg_ms: stats.latency_sum_ms.load(Ordering::Relaxed) / count,
                })
            })
            .collect();
        commands.sort_by(|a, b| b.count.cmp(&a.count));

        let slow_requests = self
            .slow_requests
            .lock()
            .map(|slow| slow.iter().cloned().collect())
            .unwrap_or_default();

        MetricsSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            slow_request_count: self.slow_request_count.load(Ordering::Relaxed),
            p50_ms: p50,
            p95_ms: p95,
            p99_ms: p99,
            avg_ms: avg,
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            commands,
            slow_requests,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.p50_ms, 0);
        assert_eq!(snapshot.p99_ms, 0);
        assert!(snapshot.commands.is_empty());
        assert!(snapshot.slow_requests.is_empty());
    }

    #[test]
    fn test_record_request_counts_per_command() {
        let metrics = Metrics::new();
        metrics.record_request(Command::Update, 2);
        metrics.record_request(Command::Update, 4);
        metrics.record_request(Command::Add, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(
            snapshot.commands,
            vec![
                CommandStat { command: Command::Update, count: 2, avg_ms: 3 },
                CommandStat { command: Command::Add, count: 1, avg_ms: 1 },
            ]
        );
    }

    #[test]
    fn test_percentile_calculation() {
        let metrics = Metrics::new();
        for ms in 1..=100 {
            metrics.record_request(Command::Update, ms);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.p50_ms, 51);
        assert_eq!(snapshot.p95_ms, 96);
        assert_eq!(snapshot.p99_ms, 100);
        assert_eq!(snapshot.avg_ms, 50);
    }

    #[test]
    fn test_latency_window_eviction() {
        let metrics = Metrics::new();
        for _ in 0..LATENCY_WINDOW_SIZE {
            metrics.record_request(Command::Add, 1);
        }
        for _ in 0..LATENCY_WINDOW_SIZE {
            metrics.record_request(Command::Add, 9);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.p50_ms, 9);
        assert_eq!(snapshot.avg_ms, 9);
        assert_eq!(snapshot.request_count, 2 * LATENCY_WINDOW_SIZE as u64);
    }

    #[test]
    fn test_slow_requests_tracked_and_bounded() {
        let metrics = Metrics::new();
        assert!(!metrics.record_request(Command::Add, SLOW_REQUEST_THRESHOLD_MS - 1));
        assert!(metrics.record_request(Command::Delete, SLOW_REQUEST_THRESHOLD_MS));

        for _ in 0..MAX_SLOW_REQUESTS + 5 {
            metrics.record_request(Command::Update, 500);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.slow_request_count, MAX_SLOW_REQUESTS as u64 + 6);
        assert_eq!(snapshot.slow_requests.len(), MAX_SLOW_REQUESTS);
        assert!(snapshot.slow_requests.iter().all(|s| s.command == Command::Update));
    }

    #[test]
    fn test_connection_counters() {
        let metrics = Metrics::new();
        metrics.record_connection_accepted();
        metrics.record_connection_accepted();
        metrics.record_connection_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_accepted, 2);
        assert_eq!(snapshot.connections_rejected, 1);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for i in 0..250 {
                        m.record_request(Command::Update, i % 5);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 2000);
        assert_eq!(snapshot.commands[0].count, 2000);
    }
}
