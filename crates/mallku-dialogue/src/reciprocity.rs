//! Per-participant giving/receiving ledger backing `add_message` step
//! (iii), grounded on `original_source/src/mallku/reciprocity/tracker.py`
//! and `models.py`. Private to the Dialogue Orchestrator; not a top-level
//! component in its own right.

use mallku_core::ids::Id;
use std::collections::{HashMap, VecDeque};

/// Bounded append-only history entry, mirroring the §4.A ring-buffer
/// pattern used for events.
#[derive(Debug, Clone)]
struct LedgerEntry {
    participant: Id,
    delta: f64,
    balance_after: f64,
}

const HISTORY_CAPACITY: usize = 1_000;

pub(crate) struct ReciprocityLedger {
    balances: HashMap<Id, f64>,
    history: VecDeque<LedgerEntry>,
}

impl ReciprocityLedger {
    pub(crate) fn new() -> Self {
        Self { balances: HashMap::new(), history: VecDeque::new() }
    }

    pub(crate) fn balance(&self, participant: Id) -> f64 {
        *self.balances.get(&participant).unwrap_or(&0.0)
    }

    /// Adjusts `participant`'s balance by `delta` (positive for giving,
    /// negative for receiving) and returns `(previous, current)`.
    pub(crate) fn adjust(&mut self, participant: Id, delta: f64) -> (f64, f64) {
        let previous = self.balance(participant);
        let current = previous + delta;
        self.balances.insert(participant, current);

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(LedgerEntry { participant, delta, balance_after: current });

        (previous, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_tracks_running_balance_per_participant() {
        let mut ledger = ReciprocityLedger::new();
        let a = Id::new();
        let (prev, cur) = ledger.adjust(a, 0.5);
        assert_eq!(prev, 0.0);
        assert_eq!(cur, 0.5);
        let (prev2, cur2) = ledger.adjust(a, -0.2);
        assert_eq!(prev2, 0.5);
        assert!((cur2 - 0.3).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded() {
        let mut ledger = ReciprocityLedger::new();
        let a = Id::new();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            ledger.adjust(a, 0.01);
        }
        assert_eq!(ledger.history.len(), HISTORY_CAPACITY);
    }
}
