use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::job::{JobSnapshot, OverallStatus};
use crate::models::object::ObjectStatus;

/// Keyed store of per-job enrichment progress.
///
/// Each object slot is written by exactly one enrichment task and read by
/// arbitrarily many status requests. The trait exists so the in-memory map
/// can be swapped for a shared backing store in a multi-instance
/// deployment without touching the task logic.
pub trait StatusStore: Send + Sync {
    /// Register a new job with its placeholder object records.
    fn create(&self, job_id: Uuid, objects: Vec<ObjectStatus>);

    /// Apply `update` to one object slot. All fields written by the
    /// closure become visible together; writes to a slot whose status is
    /// already terminal, or that would move the status backwards, are
    /// discarded.
    fn update_object(
        &self,
        job_id: Uuid,
        position: usize,
        update: &mut dyn FnMut(&mut ObjectStatus),
    );

    /// Consistent point-in-time view of a job, or `None` when the id is
    /// unknown or already evicted.
    fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot>;

    /// Number of jobs currently held (completed-but-unevicted included).
    fn active_jobs(&self) -> usize;

    fn evict(&self, job_id: Uuid);

    /// Drop jobs that completed at least `retention` ago. Returns the
    /// number of jobs evicted. Jobs still processing are never evicted.
    fn evict_expired(&self, retention: Duration) -> usize;
}

struct JobEntry {
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    objects: Vec<ObjectStatus>,
}

impl JobEntry {
    fn is_complete(&self) -> bool {
        self.objects.iter().all(|o| o.status.is_terminal())
    }
}

/// Process-local [`StatusStore`] backed by a `HashMap` under an `RwLock`.
#[derive(Default)]
pub struct MemoryStatusStore {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn create(&self, job_id: Uuid, objects: Vec<ObjectStatus>) {
        let mut jobs = self.jobs.write().expect("status store lock poisoned");
        jobs.insert(
            job_id,
            JobEntry {
                created_at: Utc::now(),
                completed_at: None,
                objects,
            },
        );
        metrics::gauge!("enrichment_jobs_active").set(jobs.len() as f64);
    }

    fn update_object(
        &self,
        job_id: Uuid,
        position: usize,
        update: &mut dyn FnMut(&mut ObjectStatus),
    ) {
        let mut jobs = self.jobs.write().expect("status store lock poisoned");
        let Some(entry) = jobs.get_mut(&job_id) else {
            debug!(%job_id, "update for unknown job ignored");
            return;
        };
        let Some(slot) = entry.objects.get_mut(position) else {
            warn!(%job_id, position, "update for out-of-range object position ignored");
            return;
        };

        if slot.status.is_terminal() {
            warn!(%job_id, position, status = %slot.status, "write to terminal object slot ignored");
            return;
        }

        let previous = slot.clone();
        update(slot);

        if slot.status.rank() < previous.status.rank() {
            warn!(
                %job_id,
                position,
                from = %previous.status,
                to = %slot.status,
                "backwards status transition discarded"
            );
            *slot = previous;
            return;
        }

        if entry.completed_at.is_none() && entry.is_complete() {
            entry.completed_at = Some(Utc::now());
        }
    }

    fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().expect("status store lock poisoned");
        let entry = jobs.get(&job_id)?;

        let completed_count = entry
            .objects
            .iter()
            .filter(|o| o.status.is_terminal())
            .count();
        let total_count = entry.objects.len();

        Some(JobSnapshot {
            job_id,
            objects: entry.objects.clone(),
            completed_count,
            total_count,
            status: if completed_count == total_count {
                OverallStatus::Complete
            } else {
                OverallStatus::Processing
            },
        })
    }

    fn active_jobs(&self) -> usize {
        self.jobs.read().expect("status store lock poisoned").len()
    }

    fn evict(&self, job_id: Uuid) {
        let mut jobs = self.jobs.write().expect("status store lock poisoned");
        jobs.remove(&job_id);
        metrics::gauge!("enrichment_jobs_active").set(jobs.len() as f64);
    }

    fn evict_expired(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write().expect("status store lock poisoned");
        let before = jobs.len();
        jobs.retain(|job_id, entry| {
            let expired = entry
                .completed_at
                .map(|done| now.signed_duration_since(done) >= retention)
                .unwrap_or(false);
            if expired {
                debug!(%job_id, age_secs = (now - entry.created_at).num_seconds(), "evicting completed job");
            }
            !expired
        });
        let evicted = before - jobs.len();
        metrics::gauge!("enrichment_jobs_active").set(jobs.len() as f64);
        evicted
    }
}
