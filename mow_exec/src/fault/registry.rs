//! Per kind fault counters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::FaultKind;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Counters kept for one fault kind.
///
/// `max_count_seen >= count_since_reset` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCounter {
    /// Number of records since the last periodic reset
    pub count_since_reset: u32,

    /// Highest `count_since_reset` reached since the last full clear
    pub max_count_seen: u32,
}

/// One persisted entry of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub kind: FaultKind,
    pub count_since_reset: u32,
    pub max_count_seen: u32,
}

/// Escalation threshold for one fault kind, as read from the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultThreshold {
    pub kind: FaultKind,

    /// Reaching this `max_count_seen` forces the Error state
    pub max_count: u32,
}

/// Registry of fault counters, one per `FaultKind`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultRegistry {
    counters: [FaultCounter; FaultKind::COUNT],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurence of the given fault.
    pub fn record(&mut self, kind: FaultKind) {
        let counter = &mut self.counters[kind.index()];

        counter.count_since_reset = counter.count_since_reset.saturating_add(1);
        if counter.count_since_reset > counter.max_count_seen {
            counter.max_count_seen = counter.count_since_reset;
        }

        warn!(
            "Fault {} recorded ({} since reset, max {})",
            kind, counter.count_since_reset, counter.max_count_seen
        );
    }

    /// Zero every `count_since_reset`, keeping the peaks.
    pub fn periodic_reset(&mut self) {
        for counter in self.counters.iter_mut() {
            counter.count_since_reset = 0;
        }
    }

    /// Zero every counter including the peaks.
    ///
    /// Only called on an explicit operator action.
    pub fn clear_all(&mut self) {
        info!("All fault counters cleared");
        self.counters = [FaultCounter::default(); FaultKind::COUNT];
    }

    pub fn get(&self, kind: FaultKind) -> FaultCounter {
        self.counters[kind.index()]
    }

    /// True if any kind has been recorded since the last full clear.
    pub fn any_seen(&self) -> bool {
        self.counters.iter().any(|c| c.max_count_seen > 0)
    }

    /// Point in time copy of every counter, for telemetry and persistence.
    pub fn to_records(&self) -> Vec<FaultRecord> {
        FaultKind::ALL
            .iter()
            .map(|&kind| {
                let c = self.get(kind);
                FaultRecord {
                    kind,
                    count_since_reset: c.count_since_reset,
                    max_count_seen: c.max_count_seen,
                }
            })
            .collect()
    }

    /// Restore the counters from persisted records.
    ///
    /// Kinds missing from `records` are left at zero. A record whose peak is
    /// below its count is raised to keep the counter invariant.
    pub fn from_records(records: &[FaultRecord]) -> Self {
        let mut registry = Self::new();

        for r in records {
            registry.counters[r.kind.index()] = FaultCounter {
                count_since_reset: r.count_since_reset,
                max_count_seen: r.max_count_seen.max(r.count_since_reset),
            };
        }

        registry
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_raises_peak() {
        let mut reg = FaultRegistry::new();

        reg.record(FaultKind::PerimeterTimeout);
        reg.record(FaultKind::PerimeterTimeout);

        assert_eq!(
            reg.get(FaultKind::PerimeterTimeout),
            FaultCounter { count_since_reset: 2, max_count_seen: 2 }
        );
        assert_eq!(reg.get(FaultKind::Charger), FaultCounter::default());
    }

    #[test]
    fn test_peak_survives_periodic_reset() {
        let mut reg = FaultRegistry::new();
        let kind = FaultKind::MotorLeft;

        for _ in 0..3 {
            reg.record(kind);
        }
        reg.periodic_reset();
        reg.record(kind);

        assert_eq!(reg.get(kind).count_since_reset, 1);
        assert_eq!(reg.get(kind).max_count_seen, 3);
    }

    #[test]
    fn test_peak_is_non_decreasing() {
        let mut reg = FaultRegistry::new();
        let kind = FaultKind::BridgeTimeout;
        let mut last_peak = 0;

        // Arbitrary interleaving of records and resets
        for i in 0..200u32 {
            if i % 7 == 0 || i % 11 == 0 {
                reg.periodic_reset();
            } else {
                reg.record(kind);
            }

            let c = reg.get(kind);
            assert!(c.max_count_seen >= last_peak);
            assert!(c.max_count_seen >= c.count_since_reset);
            last_peak = c.max_count_seen;
        }

        reg.clear_all();
        assert_eq!(reg.get(kind), FaultCounter::default());
        assert!(!reg.any_seen());
    }

    #[test]
    fn test_records() {
        let mut reg = FaultRegistry::new();
        reg.record(FaultKind::Charger);
        reg.record(FaultKind::Charger);
        reg.periodic_reset();
        reg.record(FaultKind::ImuComm);

        let records = reg.to_records();
        assert_eq!(records.len(), FaultKind::COUNT);

        let restored = FaultRegistry::from_records(&records);
        assert_eq!(restored, reg);

        // Broken invariant in stored data is repaired
        let fixed = FaultRegistry::from_records(&[FaultRecord {
            kind: FaultKind::Battery,
            count_since_reset: 4,
            max_count_seen: 1,
        }]);
        assert_eq!(fixed.get(FaultKind::Battery).max_count_seen, 4);
    }
}
