use std::time::Instant;

use serde_json::json;

use crate::internal::common::Set;
use crate::internal::common::data_structures::new_set;
use crate::internal::common::ids::{AllocationId, WorkerId};
use crate::internal::pool::gateway::WorkerLocation;

#[derive(Debug)]
pub struct WorkerRegistration {
    pub(crate) worker_id: WorkerId,
    // Learned from the first offer of the worker
    pub(crate) location: Option<WorkerLocation>,
    pub(crate) slots: Set<AllocationId>,
    pub(crate) registered_at: Instant,
}

impl WorkerRegistration {
    pub fn new(worker_id: WorkerId, now: Instant) -> Self {
        WorkerRegistration {
            worker_id,
            location: None,
            slots: new_set(),
            registered_at: now,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub(crate) fn update_location(&mut self, location: &WorkerLocation) {
        if self.location.as_ref() != Some(location) {
            log::debug!("Worker {} is reachable at {}", self.worker_id, location);
            self.location = Some(location.clone());
        }
    }

    pub(crate) fn dump(&self, now: Instant) -> serde_json::Value {
        let mut slots: Vec<_> = self.slots.iter().map(|id| id.as_num()).collect();
        slots.sort_unstable();
        json!({
            "id": self.worker_id,
            "location": self.location,
            "registered_secs_ago": now.saturating_duration_since(self.registered_at).as_secs(),
            "slots": slots,
        })
    }
}
