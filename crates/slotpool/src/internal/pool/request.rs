use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::oneshot;

use crate::internal::common::error::SlotRequestError;
use crate::internal::common::ids::SlotRequestId;
use crate::internal::common::resources::ResourceProfile;
use crate::internal::pool::slot::PhysicalSlot;

pub type SlotRequestResult = Result<PhysicalSlot, SlotRequestError>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RequestKind {
    /// Fails with `NoResourceAvailable` when its timeout expires.
    Interactive,
    /// Only fails when no registered slot could serve it for a long time.
    Batch,
}

impl RequestKind {
    #[inline]
    pub fn tolerates_scarcity(&self) -> bool {
        matches!(self, RequestKind::Batch)
    }
}

/// Who created the request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RequestOrigin {
    Caller,
    /// Synthesized from a declarative resource requirement; never times out.
    Requirement,
}

pub(crate) struct RequestRecord {
    pub request_id: SlotRequestId,
    pub profile: ResourceProfile,
    pub kind: RequestKind,
    pub origin: RequestOrigin,
    // Submission order, used for FIFO matching
    pub order: u64,
    pub created: Instant,
    // Only interactive requests of callers have one
    pub deadline: Option<Instant>,
    pub unfulfillable_since: Option<Instant>,
    pub promise: SlotPromise,
}

impl RequestRecord {
    #[inline]
    pub fn expires(&self) -> bool {
        self.kind == RequestKind::Interactive && self.origin == RequestOrigin::Caller
    }

    /// The timeout the request was submitted with.
    pub fn timeout(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(self.created))
    }

    pub fn dump(&self, now: Instant) -> serde_json::Value {
        json!({
            "request_id": self.request_id,
            "profile": self.profile.to_string(),
            "kind": format!("{:?}", self.kind),
            "origin": format!("{:?}", self.origin),
            "waiting_ms": now.saturating_duration_since(self.created).as_millis() as u64,
            "timeout_ms": self.timeout().map(|t| t.as_millis() as u64),
        })
    }
}

/// Source of pool-generated request ids, shared by all handles of one pool.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    next: Arc<AtomicU64>,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        RequestIdGenerator {
            next: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl RequestIdGenerator {
    pub fn next_id(&self) -> SlotRequestId {
        SlotRequestId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Writing side of a slot request; resolved exactly once.
pub struct SlotPromise {
    sender: oneshot::Sender<SlotRequestResult>,
}

impl SlotPromise {
    pub fn new(request_id: SlotRequestId) -> (SlotPromise, SlotFuture) {
        let (sender, receiver) = oneshot::channel();
        (
            SlotPromise { sender },
            SlotFuture {
                request_id,
                receiver,
                finished: false,
            },
        )
    }

    /// The requester dropped its future; nobody would receive a slot.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }

    /// Returns false if the slot could not be delivered.
    pub fn fulfil(self, slot: PhysicalSlot) -> bool {
        self.sender.send(Ok(slot)).is_ok()
    }

    pub fn fail(self, error: SlotRequestError) {
        // Requester may be gone already, nothing to do then
        let _ = self.sender.send(Err(error));
    }
}

/// Result handle of a slot request.
///
/// Terminates as fulfilled (`Ok`), failed (`Err` other than `Cancelled`) or
/// cancelled (`Err(SlotRequestError::Cancelled)`). If the pool disappears without
/// resolving the request, it resolves with `PoolClosed`.
pub struct SlotFuture {
    request_id: SlotRequestId,
    receiver: oneshot::Receiver<SlotRequestResult>,
    finished: bool,
}

impl SlotFuture {
    pub fn request_id(&self) -> SlotRequestId {
        self.request_id
    }

    /// Non-blocking poll; `None` while the request is still pending.
    /// Must not be called again after it returned `Some`.
    pub fn try_result(&mut self) -> Option<SlotRequestResult> {
        assert!(!self.finished, "Slot request result was already taken");
        match self.receiver.try_recv() {
            Ok(result) => {
                self.finished = true;
                Some(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.finished = true;
                Some(Err(SlotRequestError::PoolClosed))
            }
        }
    }
}

impl Future for SlotFuture {
    type Output = SlotRequestResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll(cx).map(|result| {
            this.finished = true;
            result.unwrap_or(Err(SlotRequestError::PoolClosed))
        })
    }
}
