//! Per-job instrumentation with bounded in-memory retention.
//!
//! A [`MetricsTracker`] is created once and shared (behind an `Arc`) by every
//! pipeline that reports into it. Records are keyed by job id and kept in
//! insertion order; once more than `capacity` jobs are held, the oldest
//! inserted records are evicted.

use crate::constants::DEFAULT_METRICS_CAPACITY;
use crate::models::ProcessingMetrics;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct MetricsStore {
    records: HashMap<String, ProcessingMetrics>,
    order: VecDeque<String>,
}

impl MetricsStore {
    fn evict_over(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.records.len() > capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if self.records.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }
}

/// Shared per-job metrics store
#[derive(Debug)]
pub struct MetricsTracker {
    capacity: usize,
    store: Mutex<MetricsStore>,
}

impl MetricsTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            store: Mutex::new(MetricsStore::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock leaves the maps consistent, so poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, MetricsStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin a fresh record for `job_id`.
    ///
    /// Restarting an id that is still held replaces its record but keeps its
    /// original position in the eviction order.
    pub fn start_tracking(
        &self,
        job_id: &str,
        file_name: &str,
        vendor: Option<&str>,
        format: Option<&str>,
    ) {
        let record = ProcessingMetrics::new(
            job_id,
            file_name,
            vendor.map(str::to_string),
            format.map(str::to_string),
        );

        let mut store = self.lock();
        if store.records.insert(job_id.to_string(), record).is_none() {
            store.order.push_back(job_id.to_string());
        }
        let evicted = store.evict_over(self.capacity);
        if evicted > 0 {
            debug!(evicted, capacity = self.capacity, "Evicted oldest job metrics");
        }
    }

    /// Record a stage duration; a later call for the same stage overwrites it
    pub fn record_stage(&self, job_id: &str, stage: &str, duration_ms: u64) {
        if let Some(record) = self.lock().records.get_mut(job_id) {
            record.record_stage(stage, duration_ms);
        }
    }

    pub fn increment_counter(&self, job_id: &str, counter: &str, amount: u64) {
        if let Some(record) = self.lock().records.get_mut(job_id) {
            *record.counters.entry(counter.to_string()).or_insert(0) += amount;
        }
    }

    pub fn record_error(&self, job_id: &str, error: &str) {
        if let Some(record) = self.lock().records.get_mut(job_id) {
            record.errors.push(error.to_string());
        }
    }

    /// Snapshot of one job's record
    pub fn get_metrics(&self, job_id: &str) -> Option<ProcessingMetrics> {
        self.lock().records.get(job_id).cloned()
    }

    /// Snapshots of every held record, oldest inserted first
    pub fn get_all_metrics(&self) -> Vec<ProcessingMetrics> {
        let store = self.lock();
        store
            .order
            .iter()
            .filter_map(|id| store.records.get(id).cloned())
            .collect()
    }

    /// Log a per-stage breakdown of a job at info level
    pub fn log_summary(&self, job_id: &str) {
        let Some(metrics) = self.get_metrics(job_id) else {
            return;
        };

        info!(
            job_id = %metrics.job_id,
            file = %metrics.file_name,
            vendor = metrics.vendor.as_deref().unwrap_or("-"),
            format = metrics.format.as_deref().unwrap_or("-"),
            total_ms = metrics.total_time_ms(),
            errors = metrics.errors.len(),
            "Processing summary"
        );

        for line in metrics.summary_lines() {
            info!(job_id = %metrics.job_id, "  {}", line);
        }
    }

    /// Evict oldest-inserted records until at most `capacity` remain
    pub fn cleanup(&self) {
        let evicted = self.lock().evict_over(self.capacity);
        if evicted > 0 {
            debug!(evicted, "Metrics cleanup");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `stage` and record its wall-clock duration under `name`
    pub async fn time_stage<T, Fut>(&self, job_id: &str, name: &str, stage: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let started = Instant::now();
        let output = stage.await;
        self.record_stage(job_id, name, started.elapsed().as_millis() as u64);
        output
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(DEFAULT_METRICS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stage_and_counters() {
        let tracker = MetricsTracker::default();
        tracker.start_tracking("job-1", "ELITECH_log.csv", Some("Elitech"), Some("csv"));

        tracker.record_stage("job-1", "detect", 10);
        tracker.record_stage("job-1", "parse", 90);
        tracker.record_stage("job-1", "parse", 40);
        tracker.increment_counter("job-1", "readings_valid", 5);
        tracker.increment_counter("job-1", "readings_valid", 3);
        tracker.record_error("job-1", "line 4: bad timestamp");

        let metrics = tracker.get_metrics("job-1").unwrap();
        assert_eq!(metrics.vendor.as_deref(), Some("Elitech"));
        assert_eq!(metrics.stage("parse").unwrap().duration_ms, 40);
        assert_eq!(metrics.total_time_ms(), 50);
        assert_eq!(metrics.counter("readings_valid"), 8);
        assert_eq!(metrics.errors, vec!["line 4: bad timestamp".to_string()]);
    }

    #[test]
    fn test_unknown_job_is_noop() {
        let tracker = MetricsTracker::default();
        tracker.record_stage("ghost", "parse", 1);
        tracker.increment_counter("ghost", "lines_total", 1);
        tracker.record_error("ghost", "nope");
        tracker.log_summary("ghost");

        assert!(tracker.get_metrics("ghost").is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_summary_lists_stages_in_recorded_order() {
        let tracker = MetricsTracker::default();
        tracker.start_tracking("job", "log.csv", Some("Elitech"), Some("csv"));
        tracker.record_stage("job", "parse", 75);
        tracker.record_stage("job", "detect", 25);
        tracker.increment_counter("job", "lines_total", 12);
        tracker.log_summary("job");

        let lines = tracker.get_metrics("job").unwrap().summary_lines();
        assert_eq!(
            lines,
            vec![
                "parse: 75ms (75%)".to_string(),
                "detect: 25ms (25%)".to_string(),
                "lines_total: 12".to_string(),
            ]
        );
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let tracker = MetricsTracker::default();
        for i in 0..1500 {
            tracker.start_tracking(&format!("job-{}", i), "f.csv", None, None);
        }

        assert_eq!(tracker.len(), 1000);
        assert!(tracker.get_metrics("job-0").is_none());
        assert!(tracker.get_metrics("job-499").is_none());
        assert!(tracker.get_metrics("job-500").is_some());

        let all = tracker.get_all_metrics();
        assert_eq!(all.first().unwrap().job_id, "job-500");
        assert_eq!(all.last().unwrap().job_id, "job-1499");
    }

    #[test]
    fn test_restart_keeps_position_and_resets_record() {
        let tracker = MetricsTracker::new(2);
        tracker.start_tracking("a", "a.csv", None, None);
        tracker.start_tracking("b", "b.csv", None, None);
        tracker.increment_counter("a", "lines_total", 7);

        tracker.start_tracking("a", "a2.csv", None, None);
        let a = tracker.get_metrics("a").unwrap();
        assert_eq!(a.file_name, "a2.csv");
        assert_eq!(a.counter("lines_total"), 0);

        // "a" is still the oldest insertion
        tracker.start_tracking("c", "c.csv", None, None);
        assert!(tracker.get_metrics("a").is_none());
        let ids: Vec<String> = tracker.get_all_metrics().into_iter().map(|m| m.job_id).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let tracker = MetricsTracker::default();
        tracker.start_tracking("job", "f.csv", None, None);
        let before = tracker.get_metrics("job").unwrap();
        tracker.increment_counter("job", "lines_total", 1);

        assert_eq!(before.counter("lines_total"), 0);
        assert_eq!(tracker.get_metrics("job").unwrap().counter("lines_total"), 1);
    }

    #[test]
    fn test_cleanup_within_capacity_is_noop() {
        let tracker = MetricsTracker::new(5);
        tracker.start_tracking("job", "f.csv", None, None);
        tracker.cleanup();
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_time_stage_records_duration() {
        let tracker = MetricsTracker::default();
        tracker.start_tracking("job", "f.csv", None, None);

        let value = tracker
            .time_stage("job", "parse", async {
                tokio::time::sleep(std::time::Duration::from_millis(15)).await;
                42
            })
            .await;

        assert_eq!(value, 42);
        assert!(tracker.get_metrics("job").unwrap().stage("parse").unwrap().duration_ms >= 10);
    }

    #[test]
    fn test_shared_across_threads() {
        let tracker = Arc::new(MetricsTracker::default());
        tracker.start_tracking("job", "f.csv", None, None);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.increment_counter("job", "lines_total", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.get_metrics("job").unwrap().counter("lines_total"), 400);
    }
}
