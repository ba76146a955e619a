use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::object::ObjectStatus;

/// Aggregate status of an enrichment job: `complete` iff every object
/// record has reached a terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Processing,
    Complete,
}

/// Point-in-time view of a job, as returned by the status endpoint. No
/// history is kept; two reads with no intervening writes are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub objects: Vec<ObjectStatus>,
    pub completed_count: usize,
    pub total_count: usize,
    pub status: OverallStatus,
}

/// Response after submitting a photo for enrichment. Returned before any
/// object task has run; `objects` are the placeholder records in `waiting`
/// so the client can render the review queue immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub objects: Vec<ObjectStatus>,
}
