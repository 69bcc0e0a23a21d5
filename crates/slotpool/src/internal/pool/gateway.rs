use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::internal::common::ids::{AllocationId, WorkerId};

/// Outbound channel to a worker process.
///
/// The pool only needs to hand slots back; everything else (task deployment, heartbeats)
/// happens outside of it.
pub trait WorkerGateway: fmt::Debug + Send + Sync {
    fn address(&self) -> &str;

    /// Tells the worker that the pool no longer holds the slot.
    fn free_slot(&self, allocation_id: AllocationId, cause: &str);
}

pub type WorkerGatewayRef = Arc<dyn WorkerGateway>;

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkerLocation {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub address: String,
}

impl WorkerLocation {
    pub fn new(worker_id: WorkerId, hostname: &str, address: &str) -> Self {
        WorkerLocation {
            worker_id,
            hostname: hostname.to_string(),
            address: address.to_string(),
        }
    }
}

impl fmt::Display for WorkerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.worker_id, self.hostname, self.address)
    }
}
