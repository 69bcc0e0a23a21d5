use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;

use crate::internal::common::error::SlotRequestError;
use crate::internal::common::ids::{AllocationId, SlotRequestId, WorkerId};
use crate::internal::common::resources::ResourceProfile;
use crate::internal::pool::gateway::{WorkerGatewayRef, WorkerLocation};

/// A worker's proposal of one concrete slot.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SlotOffer {
    pub allocation_id: AllocationId,
    pub slot_index: u32,
    pub profile: ResourceProfile,
}

impl SlotOffer {
    pub fn new(allocation_id: AllocationId, slot_index: u32, profile: ResourceProfile) -> Self {
        SlotOffer {
            allocation_id,
            slot_index,
            profile,
        }
    }
}

pub(crate) enum SlotState {
    Free {
        // Position in the idle index; smaller means idle for longer
        order: u64,
        since: Instant,
    },
    Allocated {
        request_id: SlotRequestId,
        release_notifier: Option<oneshot::Sender<SlotRequestError>>,
    },
}

/// An accepted offer, owned by the pool until the worker goes away or the slot
/// is handed back.
pub(crate) struct AllocatedSlot {
    pub allocation_id: AllocationId,
    pub location: WorkerLocation,
    pub slot_index: u32,
    pub profile: ResourceProfile,
    pub gateway: WorkerGatewayRef,
    pub state: SlotState,
}

impl AllocatedSlot {
    #[inline]
    pub fn worker_id(&self) -> WorkerId {
        self.location.worker_id
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self.state, SlotState::Free { .. })
    }

    pub fn bound_request(&self) -> Option<SlotRequestId> {
        match &self.state {
            SlotState::Free { .. } => None,
            SlotState::Allocated { request_id, .. } => Some(*request_id),
        }
    }

    pub fn dump(&self) -> serde_json::Value {
        json!({
            "allocation_id": self.allocation_id,
            "worker_id": self.worker_id(),
            "slot_index": self.slot_index,
            "profile": self.profile.to_string(),
            "request_id": self.bound_request(),
        })
    }
}

/// Result of a fulfilled slot request.
pub struct PhysicalSlot {
    allocation_id: AllocationId,
    request_id: SlotRequestId,
    location: WorkerLocation,
    slot_index: u32,
    profile: ResourceProfile,
    gateway: WorkerGatewayRef,
    release_listener: ReleaseListener,
}

impl PhysicalSlot {
    pub(crate) fn new(
        slot: &AllocatedSlot,
        request_id: SlotRequestId,
        release_listener: ReleaseListener,
    ) -> Self {
        PhysicalSlot {
            allocation_id: slot.allocation_id,
            request_id,
            location: slot.location.clone(),
            slot_index: slot.slot_index,
            profile: slot.profile.clone(),
            gateway: slot.gateway.clone(),
            release_listener,
        }
    }

    pub fn allocation_id(&self) -> AllocationId {
        self.allocation_id
    }

    pub fn request_id(&self) -> SlotRequestId {
        self.request_id
    }

    pub fn worker_id(&self) -> WorkerId {
        self.location.worker_id
    }

    pub fn location(&self) -> &WorkerLocation {
        &self.location
    }

    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }

    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    pub fn gateway(&self) -> &WorkerGatewayRef {
        &self.gateway
    }

    pub fn release_listener(&mut self) -> &mut ReleaseListener {
        &mut self.release_listener
    }
}

impl fmt::Debug for PhysicalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalSlot")
            .field("allocation_id", &self.allocation_id)
            .field("request_id", &self.request_id)
            .field("worker", &self.location.worker_id)
            .field("slot_index", &self.slot_index)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Tells the holder of a slot that the pool lost it (e.g. the worker was released).
///
/// If the holder releases the slot itself, the listener never fires.
pub struct ReleaseListener {
    receiver: oneshot::Receiver<SlotRequestError>,
    outcome: Option<SlotRequestError>,
    finished: bool,
}

impl ReleaseListener {
    pub(crate) fn new() -> (oneshot::Sender<SlotRequestError>, ReleaseListener) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            ReleaseListener {
                receiver,
                outcome: None,
                finished: false,
            },
        )
    }

    /// Non-blocking check; returns the loss cause once the slot was lost.
    pub fn try_lost(&mut self) -> Option<SlotRequestError> {
        if !self.finished {
            match self.receiver.try_recv() {
                Ok(error) => {
                    self.outcome = Some(error);
                    self.finished = true;
                }
                Err(oneshot::error::TryRecvError::Closed) => self.finished = true,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.outcome.clone()
    }

    /// Waits until the slot is lost, or returns `None` when it was released normally.
    pub async fn lost(&mut self) -> Option<SlotRequestError> {
        if !self.finished {
            self.outcome = (&mut self.receiver).await.ok();
            self.finished = true;
        }
        self.outcome.clone()
    }
}
