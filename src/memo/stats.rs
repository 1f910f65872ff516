//! Memo Counters
//!
//! How often calls were answered from memory, how often the wrapped function
//! ran, and how many cells the sweep has forgotten.

use serde::Serialize;

// == Memo Stats ==
/// Snapshot of a memoizer's counters, as returned by `Memoizer::stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoStats {
    /// Number of calls answered from an existing cell
    pub hits: u64,
    /// Number of calls that invoked the wrapped function
    pub misses: u64,
    /// Number of cells removed by the eviction sweep
    pub evictions: u64,
    /// Current number of cells in the store
    pub total_entries: usize,
}

impl MemoStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls answered from memory, as a fraction of all calls. Zero before
    /// the first call.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            calls => self.hits as f64 / calls as f64,
        }
    }

    /// Number of times the wrapped function ran.
    pub fn computations(&self) -> u64 {
        self.misses
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_counters_are_zero() {
        let stats = MemoStats::new();
        assert_eq!(stats, MemoStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.computations(), 0);
    }

    #[test]
    fn test_one_computation_then_replays() {
        let mut stats = MemoStats::new();
        stats.record_miss();
        for _ in 0..3 {
            stats.record_hit();
        }
        assert_eq!(stats.computations(), 1);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_evictions() {
        let mut stats = MemoStats::new();
        stats.record_evictions(2);
        stats.record_evictions(0);
        stats.record_evictions(1);
        assert_eq!(stats.evictions, 3);
    }

    #[test]
    fn test_serialize() {
        let mut stats = MemoStats::new();
        stats.record_hit();
        stats.set_total_entries(4);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["total_entries"], 4);
    }
}
