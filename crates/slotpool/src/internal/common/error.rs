use thiserror::Error;

use crate::internal::common::ids::{AllocationId, SlotRequestId, WorkerId};

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker {0} is already registered")]
    DuplicateRegistration(WorkerId),
    #[error("Worker {0} is not registered")]
    UnknownWorker(WorkerId),
    #[error("Slot request {0} is already known to the pool")]
    DuplicateRequest(SlotRequestId),
    #[error("No resource available: {0}")]
    NoResourceAvailable(String),
    #[error("Resource lost: {0}")]
    ResourceLost(String),
    #[error("Resource arithmetic would produce a negative result: {0}")]
    NegativeResult(String),
    #[error("Stale offer of allocation {allocation_id} from worker {worker_id}")]
    StaleOffer {
        allocation_id: AllocationId,
        worker_id: WorkerId,
    },
    #[error("Slot pool is closed")]
    PoolClosed,
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
    #[error("Delegation token error: {0}")]
    TokenError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<String> for PoolError {
    fn from(e: String) -> Self {
        Self::GenericError(e)
    }
}

impl From<&str> for PoolError {
    fn from(e: &str) -> Self {
        Self::GenericError(e.to_string())
    }
}

/// Terminal failure of a single slot request, delivered through its result handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SlotRequestError {
    #[error("No resource available: {0}")]
    NoResourceAvailable(String),
    #[error("Resource lost: {0}")]
    ResourceLost(String),
    #[error("Slot request cancelled: {0}")]
    Cancelled(String),
    #[error("Slot pool is closed")]
    PoolClosed,
}

impl SlotRequestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SlotRequestError::Cancelled(_))
    }
}

impl From<SlotRequestError> for PoolError {
    fn from(e: SlotRequestError) -> Self {
        match e {
            SlotRequestError::NoResourceAvailable(msg) => PoolError::NoResourceAvailable(msg),
            SlotRequestError::ResourceLost(msg) => PoolError::ResourceLost(msg),
            SlotRequestError::Cancelled(msg) => {
                PoolError::GenericError(format!("Slot request cancelled: {msg}"))
            }
            SlotRequestError::PoolClosed => PoolError::PoolClosed,
        }
    }
}
