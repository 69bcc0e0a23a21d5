use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde_json::json;
use tokio::sync::oneshot;

use crate::internal::common::error::SlotRequestError;
use crate::internal::common::ids::{AllocationId, SlotRequestId, WorkerId};
use crate::internal::common::resources::{ResourceCounter, ResourceProfile};
use crate::internal::common::Map;
use crate::internal::pool::configuration::OfferMode;
use crate::internal::pool::request::RequestRecord;
use crate::internal::pool::slot::{AllocatedSlot, SlotState};
use crate::internal::pool::worker::WorkerRegistration;

/// In-memory registry of workers, their slots and outstanding slot requests.
///
/// The pool is only ever touched from the coordination loop, so it needs no locking.
/// All methods here are bookkeeping primitives; the protocol itself lives in `reactor`.
#[derive(Default)]
pub struct SlotPool {
    workers: Map<WorkerId, WorkerRegistration>,
    slots: Map<AllocationId, AllocatedSlot>,

    // Idle slots ordered by the time they became idle
    free_slots: BTreeMap<u64, AllocationId>,
    free_resources: ResourceCounter,

    // Unfulfilled requests ordered by submission
    requests: Map<SlotRequestId, RequestRecord>,
    pending: BTreeMap<u64, SlotRequestId>,
    // Deadlines of pending interactive requests, keyed by (deadline, order)
    deadlines: BTreeSet<(Instant, u64)>,

    // Fulfilled requests
    allocations: Map<SlotRequestId, AllocationId>,

    order_counter: u64,
    offer_mode: OfferMode,
    closed: bool,
}

fn bookkeeping_corrupted(error: crate::Error) -> ! {
    panic!("Slot pool bookkeeping corrupted: {error}")
}

impl SlotPool {
    pub fn new(offer_mode: OfferMode) -> Self {
        SlotPool {
            offer_mode,
            ..Default::default()
        }
    }

    #[inline]
    pub fn offer_mode(&self) -> OfferMode {
        self.offer_mode
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn set_closed(&mut self) {
        self.closed = true;
    }

    pub(crate) fn next_order(&mut self) -> u64 {
        self.order_counter += 1;
        self.order_counter
    }

    /* Workers */

    pub(crate) fn add_worker(&mut self, worker: WorkerRegistration) {
        let worker_id = worker.worker_id();
        assert!(self.workers.insert(worker_id, worker).is_none());
    }

    pub(crate) fn remove_worker(&mut self, worker_id: WorkerId) -> Option<WorkerRegistration> {
        self.workers.remove(&worker_id)
    }

    #[inline]
    pub fn is_registered(&self, worker_id: WorkerId) -> bool {
        self.workers.contains_key(&worker_id)
    }

    pub(crate) fn get_worker_mut(
        &mut self,
        worker_id: WorkerId,
    ) -> Option<&mut WorkerRegistration> {
        self.workers.get_mut(&worker_id)
    }

    pub fn registered_workers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.workers.keys().copied()
    }

    /* Slots */

    #[inline]
    pub(crate) fn get_slot(&self, allocation_id: AllocationId) -> Option<&AllocatedSlot> {
        self.slots.get(&allocation_id)
    }

    pub(crate) fn all_slots(&self) -> impl Iterator<Item = &AllocatedSlot> {
        self.slots.values()
    }

    /// Stores a newly accepted offer as an idle slot.
    pub(crate) fn add_slot(
        &mut self,
        mut slot: AllocatedSlot,
        now: Instant,
    ) -> crate::Result<()> {
        let allocation_id = slot.allocation_id;
        let worker = self
            .workers
            .get_mut(&slot.worker_id())
            .ok_or(crate::Error::UnknownWorker(slot.worker_id()))?;
        worker.slots.insert(allocation_id);

        self.order_counter += 1;
        let order = self.order_counter;
        slot.state = SlotState::Free { order, since: now };
        self.free_slots.insert(order, allocation_id);
        self.free_resources.add(slot.profile.clone(), 1);
        assert!(self.slots.insert(allocation_id, slot).is_none());
        Ok(())
    }

    /// Moves an allocated slot back into the idle index.
    pub(crate) fn free_slot(&mut self, allocation_id: AllocationId, now: Instant) {
        self.order_counter += 1;
        let order = self.order_counter;
        let Some(slot) = self.slots.get_mut(&allocation_id) else {
            return;
        };
        match &slot.state {
            SlotState::Free { .. } => return,
            SlotState::Allocated { request_id, .. } => {
                self.allocations.remove(request_id);
            }
        }
        slot.state = SlotState::Free { order, since: now };
        self.free_slots.insert(order, allocation_id);
        self.free_resources.add(slot.profile.clone(), 1);
    }

    /// Binds an idle slot to a request and returns it.
    pub(crate) fn bind_slot(
        &mut self,
        allocation_id: AllocationId,
        request_id: SlotRequestId,
        release_notifier: oneshot::Sender<SlotRequestError>,
    ) -> &AllocatedSlot {
        let Some(slot) = self.slots.get_mut(&allocation_id) else {
            panic!("Binding unknown slot {allocation_id}");
        };
        let SlotState::Free { order, .. } = &slot.state else {
            panic!("Binding slot {allocation_id} that is already allocated");
        };
        self.free_slots.remove(order);
        if let Err(e) = self.free_resources.subtract(&slot.profile, 1) {
            bookkeeping_corrupted(e);
        }
        slot.state = SlotState::Allocated {
            request_id,
            release_notifier: Some(release_notifier),
        };
        self.allocations.insert(request_id, allocation_id);
        slot
    }

    /// Forgets the slot completely, whatever its state.
    pub(crate) fn remove_slot(&mut self, allocation_id: AllocationId) -> Option<AllocatedSlot> {
        let slot = self.slots.remove(&allocation_id)?;
        match &slot.state {
            SlotState::Free { order, .. } => {
                self.free_slots.remove(order);
                if let Err(e) = self.free_resources.subtract(&slot.profile, 1) {
                    bookkeeping_corrupted(e);
                }
            }
            SlotState::Allocated { request_id, .. } => {
                self.allocations.remove(request_id);
            }
        }
        if let Some(worker) = self.workers.get_mut(&slot.worker_id()) {
            worker.slots.remove(&allocation_id);
        }
        Some(slot)
    }

    /// Idle slots, the one idle for the longest time first.
    pub(crate) fn free_slots(&self) -> impl Iterator<Item = &AllocatedSlot> {
        self.free_slots.values().map(|id| &self.slots[id])
    }

    #[inline]
    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    pub fn free_resources(&self) -> &ResourceCounter {
        &self.free_resources
    }

    pub fn allocated_slots(&self) -> impl Iterator<Item = (SlotRequestId, AllocationId)> + '_ {
        self.allocations.iter().map(|(r, a)| (*r, *a))
    }

    pub fn allocation_of(&self, request_id: SlotRequestId) -> Option<AllocationId> {
        self.allocations.get(&request_id).copied()
    }

    /* Requests */

    #[inline]
    pub fn is_request_known(&self, request_id: SlotRequestId) -> bool {
        self.requests.contains_key(&request_id) || self.allocations.contains_key(&request_id)
    }

    #[inline]
    pub fn is_request_pending(&self, request_id: SlotRequestId) -> bool {
        self.requests.contains_key(&request_id)
    }

    pub(crate) fn add_request(&mut self, mut record: RequestRecord) {
        assert!(!self.is_request_known(record.request_id));
        record.order = self.next_order();
        if !record.expires() {
            record.deadline = None;
        }
        if let Some(deadline) = record.deadline {
            self.deadlines.insert((deadline, record.order));
        }
        self.pending.insert(record.order, record.request_id);
        self.requests.insert(record.request_id, record);
    }

    pub(crate) fn take_request(&mut self, request_id: SlotRequestId) -> Option<RequestRecord> {
        let record = self.requests.remove(&request_id)?;
        self.pending.remove(&record.order);
        if let Some(deadline) = record.deadline {
            self.deadlines.remove(&(deadline, record.order));
        }
        Some(record)
    }

    /// The earliest deadline of a pending request.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Pending requests whose deadline is not later than `now`.
    pub(crate) fn expired_requests(&self, now: Instant) -> Vec<SlotRequestId> {
        self.deadlines
            .iter()
            .take_while(|(deadline, _)| *deadline <= now)
            .map(|(_, order)| self.pending[order])
            .collect()
    }

    pub(crate) fn get_request_mut(
        &mut self,
        request_id: SlotRequestId,
    ) -> Option<&mut RequestRecord> {
        self.requests.get_mut(&request_id)
    }

    /// Pending requests in submission order.
    pub(crate) fn pending_records(&self) -> impl Iterator<Item = &RequestRecord> {
        self.pending.values().map(|id| &self.requests[id])
    }

    pub fn pending_requests(&self) -> impl Iterator<Item = SlotRequestId> + '_ {
        self.pending.values().copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_profile(&self, request_id: SlotRequestId) -> Option<&ResourceProfile> {
        self.requests.get(&request_id).map(|r| &r.profile)
    }

    pub(crate) fn dump(&self, now: Instant) -> serde_json::Value {
        let mut workers: Vec<_> = self.workers.values().collect();
        workers.sort_unstable_by_key(|w| w.worker_id());
        let mut slots: Vec<_> = self.slots.values().collect();
        slots.sort_unstable_by_key(|s| s.allocation_id);
        json!({
            "offer_mode": self.offer_mode,
            "closed": self.closed,
            "workers": workers.iter().map(|w| w.dump(now)).collect::<Vec<_>>(),
            "slots": slots.iter().map(|s| s.dump()).collect::<Vec<_>>(),
            "free_resources": format!("{:?}", self.free_resources),
            "pending_requests": self.pending_records().map(|r| r.dump(now)).collect::<Vec<_>>(),
        })
    }

    #[cfg(test)]
    pub(crate) fn sanity_check(&self) {
        let mut free = ResourceCounter::empty();
        let mut free_ids: crate::internal::common::Set<AllocationId> = Default::default();
        for slot in self.slots.values() {
            let worker = &self.workers[&slot.worker_id()];
            assert!(worker.slots.contains(&slot.allocation_id));
            match &slot.state {
                SlotState::Free { order, .. } => {
                    assert_eq!(self.free_slots[order], slot.allocation_id);
                    free.add(slot.profile.clone(), 1);
                    free_ids.insert(slot.allocation_id);
                }
                SlotState::Allocated { request_id, .. } => {
                    assert_eq!(self.allocations[request_id], slot.allocation_id);
                    assert!(!self.requests.contains_key(request_id));
                }
            }
        }
        assert_eq!(free_ids.len(), self.free_slots.len());
        assert_eq!(free, self.free_resources);
        assert_eq!(self.allocations.len() + free_ids.len(), self.slots.len());
        for worker in self.workers.values() {
            for id in &worker.slots {
                assert_eq!(self.slots[id].worker_id(), worker.worker_id());
            }
        }
        assert_eq!(self.pending.len(), self.requests.len());
        for (order, id) in &self.pending {
            assert_eq!(self.requests[id].order, *order);
        }
        let with_deadline = self.requests.values().filter(|r| r.deadline.is_some());
        assert_eq!(with_deadline.count(), self.deadlines.len());
        for (deadline, order) in &self.deadlines {
            let record = &self.requests[&self.pending[order]];
            assert!(record.expires());
            assert_eq!(record.deadline, Some(*deadline));
        }
    }
}
