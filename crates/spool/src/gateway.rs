use std::sync::{Arc, Mutex};

use slotpool::pool::WorkerGateway;
use slotpool::{AllocationId, WorkerId};

/// Stands in for a worker connection; it logs every freed slot and remembers it
/// for the final report.
#[derive(Debug)]
pub struct LoggingGateway {
    worker_id: WorkerId,
    address: String,
    freed: Mutex<Vec<FreedSlot>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FreedSlot {
    pub worker_id: WorkerId,
    pub allocation_id: AllocationId,
    pub cause: String,
}

impl LoggingGateway {
    pub fn new(worker_id: WorkerId, address: &str) -> Arc<Self> {
        Arc::new(LoggingGateway {
            worker_id,
            address: address.to_string(),
            freed: Default::default(),
        })
    }

    pub fn freed(&self) -> Vec<FreedSlot> {
        self.freed
            .lock()
            .map(|freed| freed.clone())
            .unwrap_or_default()
    }
}

impl WorkerGateway for LoggingGateway {
    fn address(&self) -> &str {
        &self.address
    }

    fn free_slot(&self, allocation_id: AllocationId, cause: &str) {
        log::info!(
            "Worker {} ({}) gets slot {allocation_id} back: {cause}",
            self.worker_id,
            self.address
        );
        if let Ok(mut freed) = self.freed.lock() {
            freed.push(FreedSlot {
                worker_id: self.worker_id,
                allocation_id,
                cause: cause.to_string(),
            });
        }
    }
}
