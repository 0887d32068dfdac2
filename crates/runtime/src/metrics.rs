use std::collections::BTreeMap;

use serde::Serialize;

/// Counter names recorded by the reconciliation session.
pub mod names {
    pub const LOADS_ISSUED: &str = "loads_issued";
    pub const LOADS_SUCCEEDED: &str = "loads_succeeded";
    pub const LOADS_FAILED: &str = "loads_failed";
    pub const STALE_LOADS: &str = "stale_loads";
    pub const UNLOADS_ISSUED: &str = "unloads_issued";
    pub const UNLOADS_FAILED: &str = "unloads_failed";
    pub const PASSES: &str = "passes";

    pub const LEDGER_LEN: &str = "ledger_len";
    pub const IN_FLIGHT: &str = "in_flight";
}

/// Deterministic metrics aggregation.
///
/// Sorted maps keep snapshots in stable order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<(String, u64)>,
    pub gauges: Vec<(String, i64)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc_counter(&mut self, name: impl Into<String>, by: u64) {
        *self.counters.entry(name.into()).or_insert(0) += by;
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    pub fn set_gauge(&mut self, name: impl Into<String>, value: i64) {
        self.gauges.insert(name.into(), value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{names, Metrics};

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::new();
        m.inc_counter(names::LOADS_ISSUED, 1);
        m.inc_counter(names::LOADS_ISSUED, 2);
        assert_eq!(m.counter(names::LOADS_ISSUED), 3);
        assert_eq!(m.counter("missing"), 0);
    }

    #[test]
    fn gauges_overwrite() {
        let mut m = Metrics::new();
        assert_eq!(m.gauge(names::IN_FLIGHT), None);
        m.set_gauge(names::IN_FLIGHT, 2);
        m.set_gauge(names::IN_FLIGHT, 0);
        assert_eq!(m.gauge(names::IN_FLIGHT), Some(0));
    }

    #[test]
    fn snapshot_is_stably_sorted() {
        let mut m = Metrics::new();
        m.inc_counter("b", 1);
        m.inc_counter("a", 1);
        m.set_gauge("z", 1);
        m.set_gauge("m", 2);

        let snap = m.snapshot();
        assert_eq!(
            snap.counters,
            vec![("a".to_string(), 1), ("b".to_string(), 1)]
        );
        assert_eq!(
            snap.gauges,
            vec![("m".to_string(), 2), ("z".to_string(), 1)]
        );
    }
}
