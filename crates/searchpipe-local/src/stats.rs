use searchpipe_core::{OperationKind, OperationStats, StatsSnapshot};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

/// Per-operation call counters and latency sums.
///
/// Each `record` is a single critical section, so a snapshot never sees a half-applied
/// update. Counters only grow.
#[derive(Debug)]
pub struct StatsAggregator {
    started_at_epoch_s: u64,
    operations: Mutex<BTreeMap<OperationKind, OperationStats>>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        let operations = OperationKind::ALL
            .iter()
            .map(|k| (*k, OperationStats::default()))
            .collect();
        Self {
            started_at_epoch_s: now_epoch_s(),
            operations: Mutex::new(operations),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<OperationKind, OperationStats>> {
        self.operations.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, kind: OperationKind, ok: bool, elapsed: Duration) {
        let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let mut ops = self.lock();
        let entry = ops.entry(kind).or_default();
        entry.total += 1;
        if ok {
            entry.successful += 1;
        } else {
            entry.failed += 1;
        }
        entry.elapsed_us_sum = entry.elapsed_us_sum.saturating_add(elapsed_us);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at_epoch_s: self.started_at_epoch_s,
            operations: self.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_outcomes_per_operation() {
        let s = StatsAggregator::new();
        s.record(OperationKind::Search, true, Duration::from_millis(10));
        s.record(OperationKind::Search, false, Duration::from_millis(30));
        s.record(OperationKind::Crawl, true, Duration::from_millis(5));

        let snap = s.snapshot();
        let search = snap.operation(OperationKind::Search);
        assert_eq!((search.total, search.successful, search.failed), (2, 1, 1));
        assert!((search.average_latency_ms() - 20.0).abs() < 1e-9);
        assert_eq!(snap.total_crawls(), 1);
        assert_eq!(snap.total_news_searches(), 0);
        assert_eq!(snap.total_requests(), 3);
        assert_eq!(snap.failed_requests(), 1);
    }

    #[test]
    fn snapshot_lists_every_operation_from_the_start() {
        let snap = StatsAggregator::new().snapshot();
        assert_eq!(snap.operations.len(), OperationKind::ALL.len());
        assert!(snap.started_at_epoch_s > 0);
    }

    #[test]
    fn parallel_records_are_never_lost() {
        let s = StatsAggregator::new();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let s = &s;
                scope.spawn(move || {
                    for _ in 0..250 {
                        s.record(OperationKind::News, i % 2 == 0, Duration::from_micros(4));
                    }
                });
            }
        });
        let news = s.snapshot().operation(OperationKind::News);
        assert_eq!(news.total, 2_000);
        assert_eq!(news.successful + news.failed, 2_000);
        assert_eq!(news.elapsed_us_sum, 8_000);
    }
}
