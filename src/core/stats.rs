//! Route statistics snapshots
//!
//! Counters are mutated only by the execution engine; callers read immutable
//! snapshots. Fields are signed so deltas between two snapshots can go
//! negative. Per-stage pending counters are reliable for completed
//! transitions only; the finish path always normalizes `pending.total`.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Counters for traversals that resolved or rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedCounts {
    pub success: i64,
    pub errors: i64,
    pub total: i64,
}

/// Counters for traversals currently in flight, broken down by the stage
/// each one is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub stages: BTreeMap<String, i64>,
    pub total: i64,
}

/// Immutable statistics snapshot for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatistics {
    pub finished: FinishedCounts,
    pub pending: PendingCounts,
    /// Traversals admitted to the queue but not yet started.
    pub on_hold: i64,
    /// Unix epoch milliseconds at capture time.
    pub timestamp_ms: i64,
}

impl RouteStatistics {
    pub(crate) fn now() -> Self {
        Self {
            finished: FinishedCounts::default(),
            pending: PendingCounts::default(),
            on_hold: 0,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Clone of `self` stamped with the current time and queue length.
    pub(crate) fn stamped(&self, on_hold: i64) -> Self {
        let mut snapshot = self.clone();
        snapshot.on_hold = on_hold;
        snapshot.timestamp_ms = Utc::now().timestamp_millis();
        snapshot
    }

    /// Field-wise difference `self - baseline`. Stage names present in this
    /// snapshot appear in the result; stages never leave a route, so the
    /// baseline's key set is always a subset.
    pub fn delta(&self, baseline: &RouteStatistics) -> RouteStatistics {
        let stages = self
            .pending
            .stages
            .iter()
            .map(|(stage, count)| {
                let before = baseline.pending.stages.get(stage).copied().unwrap_or(0);
                (stage.clone(), count - before)
            })
            .collect();

        RouteStatistics {
            finished: FinishedCounts {
                success: self.finished.success - baseline.finished.success,
                errors: self.finished.errors - baseline.finished.errors,
                total: self.finished.total - baseline.finished.total,
            },
            pending: PendingCounts {
                stages,
                total: self.pending.total - baseline.pending.total,
            },
            on_hold: self.on_hold - baseline.on_hold,
            timestamp_ms: self.timestamp_ms - baseline.timestamp_ms,
        }
    }
}
