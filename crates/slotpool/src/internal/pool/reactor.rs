use std::time::{Duration, Instant};

use crate::events::EventProcessor;
use crate::internal::common::error::{PoolError, SlotRequestError};
use crate::internal::common::ids::{AllocationId, SlotRequestId, WorkerId};
use crate::internal::common::resources::ResourceCounter;
use crate::internal::pool::configuration::OfferMode;
use crate::internal::pool::core::SlotPool;
use crate::internal::pool::gateway::{WorkerGatewayRef, WorkerLocation};
use crate::internal::pool::matching::find_matches;
use crate::internal::pool::request::{RequestOrigin, RequestRecord};
use crate::internal::pool::slot::{
    AllocatedSlot, PhysicalSlot, ReleaseListener, SlotOffer, SlotState,
};
use crate::internal::pool::worker::WorkerRegistration;

/// Returns false if the worker was already registered.
pub(crate) fn on_register_worker(
    pool: &mut SlotPool,
    events: &mut dyn EventProcessor,
    worker_id: WorkerId,
    now: Instant,
) -> bool {
    if pool.is_registered(worker_id) {
        log::debug!("{}, ignoring", PoolError::DuplicateRegistration(worker_id));
        return false;
    }
    log::debug!("Registering worker {worker_id}");
    pool.add_worker(WorkerRegistration::new(worker_id, now));
    events.on_worker_registered(worker_id);
    true
}

/// Returns false if the worker was not registered.
pub(crate) fn on_release_worker(
    pool: &mut SlotPool,
    events: &mut dyn EventProcessor,
    worker_id: WorkerId,
    cause: &str,
) -> bool {
    let Some(worker) = pool.remove_worker(worker_id) else {
        log::debug!("{}, nothing to release", PoolError::UnknownWorker(worker_id));
        return false;
    };
    log::debug!("Releasing worker {worker_id}: {cause}");

    let mut slot_ids: Vec<AllocationId> = worker.slots.into_iter().collect();
    slot_ids.sort_unstable();

    let mut lost_requests = Vec::new();
    for allocation_id in slot_ids {
        let Some(slot) = pool.remove_slot(allocation_id) else {
            continue;
        };
        match slot.state {
            SlotState::Free { .. } => {
                log::debug!("Discarding idle slot {allocation_id} of worker {worker_id}");
            }
            SlotState::Allocated {
                request_id,
                release_notifier,
            } => {
                log::debug!(
                    "Slot {allocation_id} of request {request_id} lost with worker {worker_id}"
                );
                if let Some(notifier) = release_notifier {
                    let _ = notifier.send(SlotRequestError::ResourceLost(cause.to_string()));
                }
                lost_requests.push(request_id);
            }
        }
    }
    events.on_worker_released(worker_id, &lost_requests, cause);
    true
}

/// Processes offers of one worker and returns the accepted ones.
pub(crate) fn on_offer_slots(
    pool: &mut SlotPool,
    location: &WorkerLocation,
    gateway: &WorkerGatewayRef,
    offers: Vec<SlotOffer>,
    now: Instant,
) -> Vec<SlotOffer> {
    let worker_id = location.worker_id;
    if pool.is_closed() {
        log::debug!("Rejecting {} offers of worker {worker_id}, pool is closed", offers.len());
        return Vec::new();
    }
    let Some(worker) = pool.get_worker_mut(worker_id) else {
        log::debug!(
            "Rejecting {} offers, {}",
            offers.len(),
            PoolError::UnknownWorker(worker_id)
        );
        return Vec::new();
    };
    worker.update_location(location);

    let mut accepted = Vec::with_capacity(offers.len());
    let mut new_slots = Vec::new();
    for offer in offers {
        if let Some(existing) = pool.get_slot(offer.allocation_id) {
            if existing.worker_id() == worker_id && existing.slot_index == offer.slot_index {
                log::debug!("Slot {} offered again, already accepted", offer.allocation_id);
                accepted.push(offer);
            } else {
                log::warn!(
                    "{}, ignoring",
                    PoolError::StaleOffer {
                        allocation_id: offer.allocation_id,
                        worker_id,
                    }
                );
            }
            continue;
        }
        let slot = AllocatedSlot {
            allocation_id: offer.allocation_id,
            location: location.clone(),
            slot_index: offer.slot_index,
            profile: offer.profile.clone(),
            gateway: gateway.clone(),
            state: SlotState::Free { order: 0, since: now },
        };
        if let Err(e) = pool.add_slot(slot, now) {
            log::warn!("Cannot accept slot {}: {e}", offer.allocation_id);
            continue;
        }
        log::debug!(
            "Accepted slot {} ({}) from worker {worker_id}",
            offer.allocation_id,
            offer.profile
        );
        new_slots.push(offer.allocation_id);
        accepted.push(offer);
    }

    run_matching(pool, now);

    if pool.offer_mode() == OfferMode::Strict {
        for allocation_id in new_slots {
            if pool.get_slot(allocation_id).is_some_and(|s| s.is_free()) {
                log::debug!("Rejecting slot {allocation_id}, no pending request wants it");
                pool.remove_slot(allocation_id);
                accepted.retain(|offer| offer.allocation_id != allocation_id);
            }
        }
    }
    accepted
}

/// Adds a request and tries to fulfil it right away.
pub(crate) fn on_request_slot(
    pool: &mut SlotPool,
    record: RequestRecord,
    now: Instant,
) -> crate::Result<()> {
    let request_id = record.request_id;
    if pool.is_closed() {
        record.promise.fail(SlotRequestError::PoolClosed);
        return Err(PoolError::PoolClosed);
    }
    if pool.is_request_known(request_id) {
        record.promise.fail(SlotRequestError::Cancelled(format!(
            "request id {request_id} is already in use"
        )));
        return Err(PoolError::DuplicateRequest(request_id));
    }
    log::debug!(
        "New {:?} slot request {request_id} for {}",
        record.kind,
        record.profile
    );
    pool.add_request(record);
    run_matching(pool, now);
    Ok(())
}

/// Cancels a pending request or gives the slot of a fulfilled one back to the pool.
///
/// Returns false if the request is not known.
pub(crate) fn on_release_slot(
    pool: &mut SlotPool,
    request_id: SlotRequestId,
    cause: &str,
    now: Instant,
) -> bool {
    if let Some(record) = pool.take_request(request_id) {
        log::debug!("Cancelling pending request {request_id}: {cause}");
        record
            .promise
            .fail(SlotRequestError::Cancelled(cause.to_string()));
        return true;
    }
    if let Some(allocation_id) = pool.allocation_of(request_id) {
        log::debug!("Request {request_id} releases slot {allocation_id}: {cause}");
        pool.free_slot(allocation_id, now);
        run_matching(pool, now);
        return true;
    }
    log::debug!("Releasing unknown request {request_id}, ignoring");
    false
}

/// Fails interactive requests whose deadline has passed and returns them.
/// A slot that shows up later stays idle.
pub(crate) fn on_request_timeouts(pool: &mut SlotPool, now: Instant) -> Vec<SlotRequestId> {
    let expired = pool.expired_requests(now);
    for request_id in &expired {
        let Some(record) = pool.take_request(*request_id) else {
            continue;
        };
        log::debug!("Slot request {request_id} timed out");
        let timeout = record.timeout().unwrap_or_default();
        record.promise.fail(SlotRequestError::NoResourceAvailable(format!(
            "could not acquire a slot for {} within {timeout:?}",
            record.profile
        )));
    }
    expired
}

/// Fails batch requests that no registered slot could serve for longer than `timeout`.
pub(crate) fn on_check_batch_timeouts(
    pool: &mut SlotPool,
    now: Instant,
    timeout: Duration,
) -> Vec<SlotRequestId> {
    let candidates: Vec<_> = pool
        .pending_records()
        .filter(|r| r.kind.tolerates_scarcity() && r.origin == RequestOrigin::Caller)
        .map(|r| {
            let satisfiable = pool.all_slots().any(|s| s.profile.is_matching(&r.profile));
            (r.request_id, satisfiable)
        })
        .collect();

    let mut expired = Vec::new();
    for (request_id, satisfiable) in candidates {
        let Some(record) = pool.get_request_mut(request_id) else {
            continue;
        };
        if satisfiable {
            record.unfulfillable_since = None;
            continue;
        }
        let since = *record.unfulfillable_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= timeout {
            expired.push(request_id);
        }
    }

    for request_id in &expired {
        if let Some(record) = pool.take_request(*request_id) {
            log::debug!("Batch request {request_id} cannot be fulfilled, failing it");
            record.promise.fail(SlotRequestError::NoResourceAvailable(format!(
                "no registered slot can serve {} for {timeout:?}",
                record.profile
            )));
        }
    }
    expired
}

/// Gives idle slots older than `timeout` back to their workers.
pub(crate) fn on_release_idle_slots(
    pool: &mut SlotPool,
    now: Instant,
    timeout: Duration,
) -> Vec<AllocationId> {
    let expired: Vec<AllocationId> = pool
        .free_slots()
        .filter(|slot| match slot.state {
            SlotState::Free { since, .. } => now.saturating_duration_since(since) >= timeout,
            SlotState::Allocated { .. } => false,
        })
        .map(|slot| slot.allocation_id)
        .collect();
    for allocation_id in &expired {
        if let Some(slot) = pool.remove_slot(*allocation_id) {
            log::debug!("Releasing idle slot {allocation_id} of worker {}", slot.worker_id());
            slot.gateway.free_slot(*allocation_id, "idle slot timeout");
        }
    }
    expired
}

/// The resource manager could not provide the declared resources.
pub(crate) fn on_not_enough_resources(
    pool: &mut SlotPool,
    events: &mut dyn EventProcessor,
    acquired: &ResourceCounter,
) -> Vec<SlotRequestId> {
    let failed: Vec<SlotRequestId> = pool
        .pending_records()
        .filter(|r| r.origin == RequestOrigin::Caller)
        .filter(|r| {
            !(r.kind.tolerates_scarcity()
                && acquired.resources().any(|p| p.is_matching(&r.profile)))
        })
        .map(|r| r.request_id)
        .collect();
    for request_id in &failed {
        if let Some(record) = pool.take_request(*request_id) {
            log::debug!("Failing request {request_id}, not enough resources");
            record.promise.fail(SlotRequestError::NoResourceAvailable(
                "could not acquire the minimum required resources".to_string(),
            ));
        }
    }
    events.on_not_enough_resources(acquired, &failed);
    failed
}

/// Fails everything pending and hands all slots back to their workers.
pub(crate) fn on_close(pool: &mut SlotPool) {
    if pool.is_closed() {
        return;
    }
    log::debug!("Closing slot pool");
    let pending: Vec<_> = pool.pending_requests().collect();
    for request_id in pending {
        if let Some(record) = pool.take_request(request_id) {
            record.promise.fail(SlotRequestError::PoolClosed);
        }
    }
    let mut slot_ids: Vec<_> = pool.all_slots().map(|s| s.allocation_id).collect();
    slot_ids.sort_unstable();
    for allocation_id in slot_ids {
        if let Some(slot) = pool.remove_slot(allocation_id) {
            if let SlotState::Allocated {
                release_notifier: Some(notifier),
                ..
            } = slot.state
            {
                let _ = notifier.send(SlotRequestError::PoolClosed);
            }
            slot.gateway.free_slot(allocation_id, "slot pool closed");
        }
    }
    let workers: Vec<_> = pool.registered_workers().collect();
    for worker_id in workers {
        pool.remove_worker(worker_id);
    }
    pool.set_closed();
}

/// Binds idle slots to pending requests until nothing more can be matched.
pub(crate) fn run_matching(pool: &mut SlotPool, now: Instant) {
    drop_abandoned_requests(pool);
    loop {
        let matches = find_matches(pool);
        if matches.is_empty() {
            return;
        }
        let mut undelivered = false;
        for (request_id, allocation_id) in matches {
            let Some(record) = pool.take_request(request_id) else {
                continue;
            };
            let (notifier, listener) = ReleaseListener::new();
            let slot = pool.bind_slot(allocation_id, request_id, notifier);
            let physical_slot = PhysicalSlot::new(slot, request_id, listener);
            log::debug!("Slot {allocation_id} allocated to request {request_id}");
            if !record.promise.fulfil(physical_slot) {
                log::debug!("Request {request_id} abandoned, slot {allocation_id} is idle again");
                pool.free_slot(allocation_id, now);
                undelivered = true;
            }
        }
        if !undelivered {
            return;
        }
    }
}

fn drop_abandoned_requests(pool: &mut SlotPool) {
    let abandoned: Vec<_> = pool
        .pending_records()
        .filter(|r| r.promise.is_abandoned())
        .map(|r| r.request_id)
        .collect();
    for request_id in abandoned {
        log::debug!("Dropping abandoned request {request_id}");
        pool.take_request(request_id);
    }
}
