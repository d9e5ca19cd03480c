//! Batch progress counters for logs and job views.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::models::UnitStatus;

/// Unit counts of one batch, by status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub ok: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_units(units: &[UnitStatus]) -> Self {
        let mut summary = Self {
            total: units.len(),
            ..Self::default()
        };
        for unit in units {
            match unit {
                UnitStatus::Pending => summary.pending += 1,
                UnitStatus::Running => summary.running += 1,
                UnitStatus::Ok => summary.ok += 1,
                UnitStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_complete(&self) -> bool {
        self.ok + self.failed == self.total
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} pending={} running={} ok={} failed={}",
            self.total, self.pending, self.running, self.ok, self.failed
        )
    }
}
