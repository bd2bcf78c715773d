//! Lane cycle record: one barrier transaction from trigger to outcome

use crate::domain::types::{LaneId, Uid};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// What started the cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "uid", rename_all = "snake_case")]
pub enum CycleTrigger {
    Card(Uid),
    /// Ticketless exit: vehicle detected without a card
    Checkout,
    /// Backend opened the lane without a pending request
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    Rejected,
    TimedOut,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Completed => "completed",
            CycleOutcome::Rejected => "rejected",
            CycleOutcome::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneCycle {
    pub id: String,
    pub lane: LaneId,
    pub trigger: CycleTrigger,
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CycleOutcome>,
}

impl LaneCycle {
    pub fn begin(lane: LaneId, trigger: CycleTrigger) -> Self {
        Self {
            id: new_uuid_v7(),
            lane,
            trigger,
            started_at: epoch_ms(),
            opened_at: None,
            passed_at: None,
            ended_at: None,
            outcome: None,
        }
    }

    pub fn mark_opened(&mut self) {
        self.opened_at = Some(epoch_ms());
    }

    pub fn mark_passed(&mut self) {
        self.passed_at = Some(epoch_ms());
    }

    pub fn finish(mut self, outcome: CycleOutcome) -> Self {
        self.ended_at = Some(epoch_ms());
        self.outcome = Some(outcome);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
