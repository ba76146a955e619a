use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::job::JobSnapshot;
use crate::models::object::ObjectStatus;

/// One entry in the review queue. `ready` means the backend reached a
/// terminal stage for this object. Success, no-detection, and error all
/// count, so a bad object never blocks the user's review flow.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub status: Arc<ObjectStatus>,
    pub ready: bool,
}

/// Folds successive status snapshots into a stable, in-order review queue.
///
/// Positions are fixed at job start and double as identity, so two
/// candidates sharing a display name are independently completable.
/// Because each object task has its own network latency, completion order
/// is unconstrained, so `advance` scans forward first and then wraps
/// around to earlier positions that became ready late.
pub struct ReviewQueue {
    items: Vec<QueueItem>,
    /// Positions the user has already acted on. Grows monotonically;
    /// distinct from the backend's notion of "complete".
    completed: BTreeSet<usize>,
    current: usize,
}

impl ReviewQueue {
    /// Build the queue from the placeholder records returned at job
    /// creation. Queue length never changes afterwards.
    pub fn new(objects: &[ObjectStatus]) -> Self {
        let items = objects
            .iter()
            .map(|object| QueueItem {
                ready: object.status.is_terminal(),
                status: Arc::new(object.clone()),
            })
            .collect();
        Self {
            items,
            completed: BTreeSet::new(),
            current: 0,
        }
    }

    /// Fold a snapshot into the queue. An entry is only replaced when it
    /// materially differs (status or name changed); otherwise the existing
    /// allocation is kept, so holders of the `Arc` can detect change by
    /// pointer identity and skip re-rendering.
    pub fn merge(&mut self, snapshot: &JobSnapshot) {
        for incoming in &snapshot.objects {
            let Some(item) = self.items.get_mut(incoming.position) else {
                continue;
            };
            let changed = item.status.status != incoming.status || item.status.name != incoming.name;
            if changed {
                item.status = Arc::new(incoming.clone());
            }
            item.ready = item.status.status.is_terminal();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.items.get(self.current)
    }

    /// True when the item under the cursor is ready and not yet dispatched.
    pub fn current_ready(&self) -> bool {
        self.presentable(self.current)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Mark the current item as dispatched and move the cursor to the next
    /// reviewable item: first the positions after the cursor, then (for
    /// items that became ready late) the positions before it. Returns the
    /// new cursor position, or `None` when nothing further is ready (the
    /// caller should stop presenting; background polling may continue).
    pub fn advance(&mut self) -> Option<usize> {
        self.completed.insert(self.current);

        let next = (self.current + 1..self.items.len())
            .find(|&position| self.presentable(position))
            .or_else(|| (0..self.current).find(|&position| self.presentable(position)));

        if let Some(position) = next {
            self.current = position;
        }
        next
    }

    /// Whether any position other than the cursor is ready for review.
    /// Drives the skip affordance while the current item is still pending.
    pub fn has_more_ready(&self) -> bool {
        (0..self.items.len()).any(|position| position != self.current && self.presentable(position))
    }

    fn presentable(&self, position: usize) -> bool {
        self.items
            .get(position)
            .map(|item| item.ready && !self.completed.contains(&position))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::OverallStatus;
    use crate::models::object::{CandidateObject, ObjectStage};
    use uuid::Uuid;

    fn placeholders(names: &[&str]) -> Vec<ObjectStatus> {
        names
            .iter()
            .enumerate()
            .map(|(position, name)| {
                ObjectStatus::from_candidate(
                    position,
                    &CandidateObject {
                        name: name.to_string(),
                        category: "Household".to_string(),
                        description: String::new(),
                        estimated_cost_usd: 25.0,
                    },
                )
            })
            .collect()
    }

    fn snapshot_with(objects: Vec<ObjectStatus>) -> JobSnapshot {
        let completed_count = objects.iter().filter(|o| o.status.is_terminal()).count();
        let total_count = objects.len();
        JobSnapshot {
            job_id: Uuid::new_v4(),
            status: if completed_count == total_count {
                OverallStatus::Complete
            } else {
                OverallStatus::Processing
            },
            completed_count,
            total_count,
            objects,
        }
    }

    fn set_stage(objects: &mut [ObjectStatus], position: usize, stage: ObjectStage) {
        objects[position].status = stage;
    }

    #[test]
    fn test_new_queue_has_no_ready_items() {
        let queue = ReviewQueue::new(&placeholders(&["Mug", "Lamp", "Chair"]));
        assert_eq!(queue.len(), 3);
        assert!(!queue.current_ready());
        assert!(!queue.has_more_ready());
    }

    #[test]
    fn test_merge_marks_terminal_items_ready() {
        let mut objects = placeholders(&["Mug", "Lamp", "Chair"]);
        let mut queue = ReviewQueue::new(&objects);

        set_stage(&mut objects, 1, ObjectStage::NoDetection);
        queue.merge(&snapshot_with(objects));

        assert!(!queue.current_ready()); // position 0 still waiting
        assert!(queue.has_more_ready()); // position 1 is reviewable
    }

    #[test]
    fn test_merge_keeps_unchanged_allocations() {
        let mut objects = placeholders(&["Mug", "Lamp"]);
        let mut queue = ReviewQueue::new(&objects);

        let before = Arc::clone(&queue.items()[0].status);
        set_stage(&mut objects, 1, ObjectStage::Detecting);
        queue.merge(&snapshot_with(objects.clone()));

        // Position 0 did not change materially: same allocation.
        assert!(Arc::ptr_eq(&before, &queue.items()[0].status));
        // Position 1 did change: new allocation.
        assert_eq!(queue.items()[1].status.status, ObjectStage::Detecting);
    }

    #[test]
    fn test_out_of_order_skip_ahead_and_wrap_back() {
        let mut objects = placeholders(&["Mug", "Lamp", "Chair"]);
        let mut queue = ReviewQueue::new(&objects);

        // Position 2 finishes first.
        set_stage(&mut objects, 2, ObjectStage::Complete);
        queue.merge(&snapshot_with(objects.clone()));

        // The user dispatches position 0; the only ready item is 2.
        assert_eq!(queue.advance(), Some(2));
        assert_eq!(queue.current_index(), 2);

        // Position 1 becomes ready late.
        set_stage(&mut objects, 1, ObjectStage::Complete);
        queue.merge(&snapshot_with(objects.clone()));

        // Advancing from 2 must wrap back to 1, not terminate.
        assert_eq!(queue.advance(), Some(1));
        assert_eq!(queue.current_index(), 1);

        // Everything dispatched: no next item.
        assert_eq!(queue.advance(), None);
    }

    #[test]
    fn test_completed_grows_monotonically_and_never_represents() {
        let mut objects = placeholders(&["Mug", "Lamp", "Chair"]);
        for position in 0..3 {
            set_stage(&mut objects, position, ObjectStage::Complete);
        }
        let mut queue = ReviewQueue::new(&objects);
        queue.merge(&snapshot_with(objects.clone()));

        let mut visited = vec![queue.current_index()];
        while let Some(next) = queue.advance() {
            assert!(
                !visited.contains(&next),
                "position {next} presented twice"
            );
            visited.push(next);
        }

        assert_eq!(visited.len(), 3);
        assert_eq!(queue.completed_count(), 3);
    }

    #[test]
    fn test_failed_and_no_detection_items_are_still_reviewable() {
        let mut objects = placeholders(&["Mug", "Lamp", "Chair"]);
        set_stage(&mut objects, 0, ObjectStage::Complete);
        set_stage(&mut objects, 1, ObjectStage::NoDetection);
        set_stage(&mut objects, 2, ObjectStage::Error);

        let mut queue = ReviewQueue::new(&objects);
        queue.merge(&snapshot_with(objects));

        assert!(queue.current_ready());
        assert_eq!(queue.advance(), Some(1));
        assert_eq!(queue.advance(), Some(2));
        assert_eq!(queue.advance(), None);
    }

    #[test]
    fn test_has_more_ready_excludes_cursor_and_dispatched() {
        let mut objects = placeholders(&["Mug", "Lamp"]);
        set_stage(&mut objects, 0, ObjectStage::Complete);
        let mut queue = ReviewQueue::new(&objects);
        queue.merge(&snapshot_with(objects.clone()));

        // Only the cursor itself is ready.
        assert!(!queue.has_more_ready());

        set_stage(&mut objects, 1, ObjectStage::Complete);
        queue.merge(&snapshot_with(objects));
        assert!(queue.has_more_ready());

        queue.advance();
        assert!(!queue.has_more_ready());
    }

    #[test]
    fn test_duplicate_names_are_independent() {
        let mut objects = placeholders(&["Chair", "Chair"]);
        set_stage(&mut objects, 0, ObjectStage::Complete);
        set_stage(&mut objects, 1, ObjectStage::Complete);

        let mut queue = ReviewQueue::new(&objects);
        queue.merge(&snapshot_with(objects));

        assert_eq!(queue.advance(), Some(1));
        assert_eq!(queue.advance(), None);
        assert_eq!(queue.completed_count(), 2);
    }
}
