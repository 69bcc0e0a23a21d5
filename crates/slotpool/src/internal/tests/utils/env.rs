use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::events::EventProcessor;
use crate::internal::common::Map;
use crate::internal::common::resources::{ResourceCounter, ResourceProfile};
use crate::internal::pool::configuration::{DEFAULT_REQUEST_TIMEOUT, OfferMode};
use crate::internal::pool::core::SlotPool;
use crate::internal::pool::gateway::{WorkerGateway, WorkerGatewayRef, WorkerLocation};
use crate::internal::pool::reactor::{
    on_check_batch_timeouts, on_close, on_not_enough_resources, on_offer_slots,
    on_register_worker, on_release_idle_slots, on_release_slot, on_release_worker,
    on_request_slot, on_request_timeouts,
};
use crate::internal::pool::request::{
    RequestIdGenerator, RequestKind, RequestOrigin, RequestRecord, SlotFuture, SlotPromise,
};
use crate::internal::pool::slot::{PhysicalSlot, SlotOffer};
use crate::internal::service::bridge::{DeclarativeBridge, RequirementChange};
use crate::{AllocationId, SlotRequestError, SlotRequestId, WorkerId};

#[derive(Debug)]
pub struct TestGateway {
    address: String,
    freed: Mutex<Vec<(AllocationId, String)>>,
}

impl TestGateway {
    pub fn new(address: &str) -> Arc<TestGateway> {
        Arc::new(TestGateway {
            address: address.to_string(),
            freed: Mutex::new(Vec::new()),
        })
    }

    pub fn take_freed(&self) -> Vec<AllocationId> {
        let mut freed: Vec<_> = std::mem::take(&mut *self.freed.lock().unwrap())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        freed.sort_unstable();
        freed
    }
}

impl WorkerGateway for TestGateway {
    fn address(&self) -> &str {
        &self.address
    }

    fn free_slot(&self, allocation_id: AllocationId, cause: &str) {
        self.freed
            .lock()
            .unwrap()
            .push((allocation_id, cause.to_string()));
    }
}

#[derive(Default)]
pub struct EventLog {
    pub registered: Vec<WorkerId>,
    pub released: Vec<(WorkerId, Vec<SlotRequestId>, String)>,
    pub not_enough_resources: Vec<(ResourceCounter, Vec<SlotRequestId>)>,
    pub declared: Vec<ResourceCounter>,
}

/// Records pool events; clones share the same log.
#[derive(Default, Clone)]
pub struct TestEvents {
    log: Arc<Mutex<EventLog>>,
}

impl TestEvents {
    pub fn take_registered(&self, len: usize) -> Vec<WorkerId> {
        let registered = std::mem::take(&mut self.log.lock().unwrap().registered);
        assert_eq!(registered.len(), len);
        registered
    }

    pub fn take_released(&self, len: usize) -> Vec<(WorkerId, Vec<SlotRequestId>, String)> {
        let released = std::mem::take(&mut self.log.lock().unwrap().released);
        assert_eq!(released.len(), len);
        released
    }

    pub fn take_not_enough_resources(
        &self,
        len: usize,
    ) -> Vec<(ResourceCounter, Vec<SlotRequestId>)> {
        let events = std::mem::take(&mut self.log.lock().unwrap().not_enough_resources);
        assert_eq!(events.len(), len);
        events
    }

    pub fn take_declared(&self, len: usize) -> Vec<ResourceCounter> {
        let declared = std::mem::take(&mut self.log.lock().unwrap().declared);
        assert_eq!(declared.len(), len);
        declared
    }

    pub fn emptiness_check(&self) {
        let log = self.log.lock().unwrap();
        assert!(log.registered.is_empty());
        assert!(log.released.is_empty());
        assert!(log.not_enough_resources.is_empty());
        assert!(log.declared.is_empty());
    }
}

impl EventProcessor for TestEvents {
    fn on_worker_registered(&mut self, worker_id: WorkerId) {
        self.log.lock().unwrap().registered.push(worker_id);
    }

    fn on_worker_released(
        &mut self,
        worker_id: WorkerId,
        lost_requests: &[SlotRequestId],
        cause: &str,
    ) {
        self.log.lock().unwrap().released.push((
            worker_id,
            lost_requests.to_vec(),
            cause.to_string(),
        ));
    }

    fn on_not_enough_resources(
        &mut self,
        acquired: &ResourceCounter,
        failed_requests: &[SlotRequestId],
    ) {
        self.log
            .lock()
            .unwrap()
            .not_enough_resources
            .push((acquired.clone(), failed_requests.to_vec()));
    }

    fn on_resource_requirements_declared(&mut self, requirements: &ResourceCounter) {
        self.log
            .lock()
            .unwrap()
            .declared
            .push(requirements.clone());
    }
}

/// Drives the pool directly through the reactor, with a manually advanced clock.
pub struct TestEnv {
    pool: SlotPool,
    bridge: DeclarativeBridge,
    pub events: TestEvents,
    gateways: Map<WorkerId, Arc<TestGateway>>,
    pub now: Instant,
    pub id_generator: RequestIdGenerator,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> TestEnv {
        Self::with_mode(OfferMode::Idle)
    }

    pub fn with_mode(offer_mode: OfferMode) -> TestEnv {
        TestEnv {
            pool: SlotPool::new(offer_mode),
            bridge: DeclarativeBridge::default(),
            events: TestEvents::default(),
            gateways: Default::default(),
            now: Instant::now(),
            id_generator: RequestIdGenerator::default(),
        }
    }

    pub fn pool(&mut self) -> &mut SlotPool {
        &mut self.pool
    }

    pub fn bridge(&self) -> &DeclarativeBridge {
        &self.bridge
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }

    pub fn location<W: Into<WorkerId>>(worker_id: W) -> WorkerLocation {
        let worker_id = worker_id.into();
        WorkerLocation::new(
            worker_id,
            &format!("host{worker_id}"),
            &format!("10.0.0.{worker_id}:6122"),
        )
    }

    pub fn gateway<W: Into<WorkerId>>(&mut self, worker_id: W) -> Arc<TestGateway> {
        let worker_id = worker_id.into();
        self.gateways
            .entry(worker_id)
            .or_insert_with(|| TestGateway::new(&format!("10.0.0.{worker_id}:6122")))
            .clone()
    }

    pub fn register<W: Into<WorkerId>>(&mut self, worker_id: W) -> bool {
        on_register_worker(&mut self.pool, &mut self.events, worker_id.into(), self.now)
    }

    pub fn release_worker<W: Into<WorkerId>>(&mut self, worker_id: W, cause: &str) -> bool {
        on_release_worker(&mut self.pool, &mut self.events, worker_id.into(), cause)
    }

    pub fn offer<W: Into<WorkerId>>(
        &mut self,
        worker_id: W,
        offers: Vec<SlotOffer>,
    ) -> Vec<SlotOffer> {
        let worker_id = worker_id.into();
        let gateway: WorkerGatewayRef = self.gateway(worker_id);
        on_offer_slots(
            &mut self.pool,
            &Self::location(worker_id),
            &gateway,
            offers,
            self.now,
        )
    }

    fn submit(
        &mut self,
        request_id: u64,
        profile: ResourceProfile,
        kind: RequestKind,
        timeout: Option<Duration>,
    ) -> SlotFuture {
        let request_id = SlotRequestId::new(request_id);
        let (promise, future) = SlotPromise::new(request_id);
        let record = RequestRecord {
            request_id,
            profile,
            kind,
            origin: RequestOrigin::Caller,
            order: 0,
            created: self.now,
            deadline: timeout.map(|timeout| self.now + timeout),
            unfulfillable_since: None,
            promise,
        };
        let _ = on_request_slot(&mut self.pool, record, self.now);
        future
    }

    pub fn request(&mut self, request_id: u64, profile: ResourceProfile) -> SlotFuture {
        self.request_with_timeout(request_id, profile, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn request_with_timeout(
        &mut self,
        request_id: u64,
        profile: ResourceProfile,
        timeout: Duration,
    ) -> SlotFuture {
        self.submit(request_id, profile, RequestKind::Interactive, Some(timeout))
    }

    pub fn batch_request(&mut self, request_id: u64, profile: ResourceProfile) -> SlotFuture {
        self.submit(request_id, profile, RequestKind::Batch, None)
    }

    pub fn release_slot(&mut self, request_id: u64) -> bool {
        on_release_slot(
            &mut self.pool,
            SlotRequestId::new(request_id),
            "released by test",
            self.now,
        )
    }

    pub fn expire_requests(&mut self) -> Vec<SlotRequestId> {
        on_request_timeouts(&mut self.pool, self.now)
    }

    pub fn check_batch_timeouts(&mut self, timeout: Duration) -> Vec<SlotRequestId> {
        on_check_batch_timeouts(&mut self.pool, self.now, timeout)
    }

    pub fn release_idle_slots(&mut self, timeout: Duration) -> Vec<AllocationId> {
        on_release_idle_slots(&mut self.pool, self.now, timeout)
    }

    pub fn not_enough_resources(&mut self, acquired: &ResourceCounter) -> Vec<SlotRequestId> {
        on_not_enough_resources(&mut self.pool, &mut self.events, acquired)
    }

    pub fn close(&mut self) {
        on_close(&mut self.pool);
    }

    pub fn dump(&self) -> serde_json::Value {
        self.pool.dump(self.now)
    }

    pub fn set_requirements(&mut self, requirements: ResourceCounter) -> RequirementChange {
        self.bridge.set_requirements(
            &mut self.pool,
            &mut self.events,
            &self.id_generator,
            requirements,
            self.now,
        )
    }

    pub fn reconcile(&mut self) -> RequirementChange {
        self.bridge
            .reconcile(&mut self.pool, &self.id_generator, self.now)
    }

    pub fn set_in_use(&mut self, request_id: SlotRequestId, in_use: bool) -> bool {
        self.bridge.set_in_use(request_id, in_use)
    }

    pub fn check(&self) {
        self.pool.sanity_check();
    }
}

pub fn expect_pending(future: &mut SlotFuture) {
    assert!(future.try_result().is_none(), "request is not pending");
}

pub fn expect_slot(future: &mut SlotFuture) -> PhysicalSlot {
    match future.try_result() {
        Some(Ok(slot)) => slot,
        Some(Err(e)) => panic!("Expected slot, got error {e}"),
        None => panic!("Expected slot, request is still pending"),
    }
}

pub fn expect_error(future: &mut SlotFuture) -> SlotRequestError {
    match future.try_result() {
        Some(Err(e)) => e,
        Some(Ok(slot)) => panic!("Expected error, got slot {slot:?}"),
        None => panic!("Expected error, request is still pending"),
    }
}
