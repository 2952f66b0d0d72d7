//! Result collection and reduction for the concurrency sweep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// One timed batched read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub key_count: usize,
    pub elapsed: Duration,
}

impl Sample {
    pub fn millis(&self) -> f64 {
        nanos_to_millis(self.elapsed.as_nanos() as f64)
    }
}

pub fn nanos_to_millis(ns: f64) -> f64 {
    ns / 1_000_000.0
}

/// Fixed-size array of durations, one slot per job index.
///
/// Each slot is its own atomic so workers never contend on a lock while
/// recording.
#[derive(Debug)]
pub struct ResultSet {
    slots: Vec<AtomicU64>,
}

impl ResultSet {
    pub fn new(cycles: usize) -> Self {
        Self { slots: (0..cycles).map(|_| AtomicU64::new(0)).collect() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store the duration for job `index`. Indices past the end are ignored.
    pub fn set_slot(&self, index: usize, elapsed: Duration) {
        if let Some(slot) = self.slots.get(index) {
            let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
            slot.store(ns, Ordering::Relaxed);
        }
    }

    /// Durations in nanoseconds, sorted ascending.
    pub fn sorted(&self) -> Vec<u64> {
        let mut v: Vec<u64> = self.slots.iter().map(|s| s.load(Ordering::Relaxed)).collect();
        v.sort_unstable();
        v
    }
}

/// Median of an ascending slice, in the same unit as the data.
///
/// Odd lengths take the middle element. Even lengths average the elements at
/// `n/2 - 1` and `n/2 + 1`, which is how the reference tool computed it. The
/// upper index is clamped for `n == 2`.
pub fn median(sorted: &[u64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        return Some(sorted[n / 2] as f64);
    }
    let lo = sorted[n / 2 - 1];
    let hi = sorted[(n / 2 + 1).min(n - 1)];
    Some((lo as f64 + hi as f64) / 2.0)
}

/// Distribution summary reported alongside the median. Values in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

impl LatencySummary {
    pub fn from_nanos(samples: &[u64]) -> Option<Self> {
        let mut hist = Histogram::<u64>::new(3).ok()?;
        for &ns in samples {
            hist.saturating_record(ns.max(1));
        }
        if hist.len() == 0 {
            return None;
        }
        let ms = |ns: u64| nanos_to_millis(ns as f64);
        Some(Self {
            min_ms: ms(hist.min()),
            p90_ms: ms(hist.value_at_quantile(0.90)),
            p99_ms: ms(hist.value_at_quantile(0.99)),
            max_ms: ms(hist.max()),
            mean_ms: nanos_to_millis(hist.mean()),
        })
    }
}

/// Batch sizes measured by the concurrency sweep. The leading `1` is
/// repeated on purpose: the first row warms the client up.
pub fn key_count_ladder() -> Vec<usize> {
    let mut counts = vec![1, 1];
    counts.extend((5..=100).step_by(5));
    counts
}

/// `min, 2*min, 4*min, ...` up to and including `max`.
pub fn concurrency_ladder(min: usize, max: usize) -> Vec<usize> {
    let mut levels = Vec::new();
    if min == 0 {
        return levels;
    }
    let mut c = min;
    while c <= max {
        levels.push(c);
        match c.checked_mul(2) {
            Some(next) => c = next,
            None => break,
        }
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_ladder_is_geometric() {
        assert_eq!(concurrency_ladder(1, 16), vec![1, 2, 4, 8, 16]);
        assert_eq!(concurrency_ladder(3, 20), vec![3, 6, 12]);
        assert_eq!(concurrency_ladder(5, 5), vec![5]);
        assert!(concurrency_ladder(0, 4).is_empty());
        assert_eq!(concurrency_ladder(usize::MAX / 2 + 1, usize::MAX).len(), 1);
    }

    #[test]
    fn key_count_ladder_repeats_warmup_row() {
        let ladder = key_count_ladder();
        assert_eq!(&ladder[..4], &[1, 1, 5, 10]);
        assert_eq!(*ladder.last().unwrap(), 100);
        assert_eq!(ladder.len(), 22);
    }

    #[test]
    fn median_odd_takes_middle() {
        assert_eq!(median(&[2, 4, 6]), Some(4.0));
        assert_eq!(median(&[7]), Some(7.0));
    }

    #[test]
    fn median_even_skips_upper_middle() {
        assert_eq!(median(&[1, 2, 3, 4]), Some(3.0));
        assert_eq!(median(&[10, 20, 30, 40, 50, 60]), Some(40.0));
        assert_eq!(median(&[1, 3]), Some(2.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn result_set_sorts_slots() {
        let set = ResultSet::new(4);
        set.set_slot(2, Duration::from_nanos(30));
        set.set_slot(0, Duration::from_nanos(50));
        set.set_slot(3, Duration::from_nanos(10));
        set.set_slot(1, Duration::from_nanos(20));
        set.set_slot(9, Duration::from_nanos(1));
        assert_eq!(set.len(), 4);
        assert_eq!(set.sorted(), vec![10, 20, 30, 50]);
    }

    #[test]
    fn summary_covers_extremes() {
        let ns: Vec<u64> = (1..=100).map(|i| i * 1_000_000).collect();
        let s = LatencySummary::from_nanos(&ns).unwrap();
        assert!((s.min_ms - 1.0).abs() < 0.01);
        assert!((s.max_ms - 100.0).abs() < 0.1);
        assert!(s.p90_ms >= 89.0 && s.p90_ms <= 91.0);
        assert!(LatencySummary::from_nanos(&[]).is_none());
    }
}
