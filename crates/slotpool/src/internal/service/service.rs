use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::MissedTickBehavior;

use crate::events::EventProcessor;
use crate::internal::common::error::PoolError;
use crate::internal::common::ids::{SlotRequestId, WorkerId};
use crate::internal::common::resources::{ResourceCounter, ResourceProfile};
use crate::internal::pool::configuration::PoolConfiguration;
use crate::internal::pool::core::SlotPool;
use crate::internal::pool::gateway::{WorkerGatewayRef, WorkerLocation};
use crate::internal::pool::reactor::{
    on_check_batch_timeouts, on_close, on_not_enough_resources, on_offer_slots,
    on_register_worker, on_release_idle_slots, on_release_slot, on_release_worker,
    on_request_slot, on_request_timeouts,
};
use crate::internal::pool::request::{
    RequestIdGenerator, RequestKind, RequestOrigin, RequestRecord, SlotFuture, SlotPromise,
};
use crate::internal::pool::slot::SlotOffer;
use crate::internal::security::tokens::AuthenticationStatus;
use crate::internal::service::bridge::{DeclarativeBridge, RequirementChange};
use crate::internal::service::mainthread::MainThreadExecutor;

/// Everything owned by the coordination loop.
pub struct PoolState {
    pool: SlotPool,
    bridge: DeclarativeBridge,
    events: Box<dyn EventProcessor>,
    config: PoolConfiguration,
    auth: AuthenticationStatus,
    id_generator: RequestIdGenerator,
}

impl PoolState {
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub fn bridge(&self) -> &DeclarativeBridge {
        &self.bridge
    }

    fn housekeeping(&mut self, now: Instant) {
        on_check_batch_timeouts(&mut self.pool, now, self.config.batch_slot_timeout);
        if let Some(timeout) = self.config.idle_slot_timeout {
            on_release_idle_slots(&mut self.pool, now, timeout);
        }
        self.bridge.reconcile(&mut self.pool, &self.id_generator, now);
    }

    fn dump(&self, now: Instant) -> serde_json::Value {
        json!({
            "pool": self.pool.dump(now),
            "requirements": format!("{:?}", self.bridge.requirements()),
            "acquired": format!("{:?}", self.bridge.acquired()),
            "authentication_valid": self.auth.is_valid(),
        })
    }
}

// Follows tokio's clock so that paused time in tests applies to the pool as well
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Handle of a running slot pool. Every call is executed on the coordination loop.
#[derive(Clone)]
pub struct SlotPoolService {
    executor: MainThreadExecutor<PoolState>,
    id_generator: RequestIdGenerator,
    request_timeout: Duration,
}

impl SlotPoolService {
    /// Creates the pool. The returned future is the coordination loop and has to be
    /// spawned (or awaited) by the caller; it ends when the pool is closed or every
    /// handle is dropped.
    pub fn start(
        config: PoolConfiguration,
        events: Box<dyn EventProcessor>,
        auth: AuthenticationStatus,
    ) -> crate::Result<(SlotPoolService, impl Future<Output = ()> + Send)> {
        config.validate()?;
        let (executor, mut main_loop) = MainThreadExecutor::new();
        let id_generator = RequestIdGenerator::default();
        let check_interval = config.check_interval;
        let service = SlotPoolService {
            executor,
            id_generator: id_generator.clone(),
            request_timeout: config.request_timeout,
        };
        let mut state = PoolState {
            pool: SlotPool::new(config.offer_mode),
            bridge: DeclarativeBridge::default(),
            events,
            config,
            auth,
            id_generator,
        };

        let future = async move {
            log::info!("Slot pool started ({:?} offer mode)", state.config.offer_mode);
            let mut tick = tokio::time::interval(check_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let next_deadline = state.pool.next_deadline();
                tokio::select! {
                    job = main_loop.next_job() => match job {
                        Some(job) => job(&mut state),
                        None => {
                            log::debug!("All slot pool handles dropped");
                            on_close(&mut state.pool);
                        }
                    },
                    _ = tick.tick() => state.housekeeping(now()),
                    _ = sleep_until_deadline(next_deadline) => {
                        on_request_timeouts(&mut state.pool, now());
                    }
                }
                if state.pool.is_closed() {
                    break;
                }
            }
            main_loop.close();
            log::info!("Slot pool stopped");
        };
        Ok((service, future))
    }

    pub fn new_request_id(&self) -> SlotRequestId {
        self.id_generator.next_id()
    }

    /// Returns false if the worker was registered already.
    pub async fn register_task_manager(&self, worker_id: WorkerId) -> crate::Result<bool> {
        self.executor
            .call(move |s| {
                if !s.auth.is_valid() {
                    log::warn!("Registering worker {worker_id} while authentication is not valid");
                }
                on_register_worker(&mut s.pool, s.events.as_mut(), worker_id, now())
            })
            .await
    }

    /// Returns false if the worker was not registered.
    pub async fn release_task_manager(
        &self,
        worker_id: WorkerId,
        cause: &str,
    ) -> crate::Result<bool> {
        let cause = cause.to_string();
        self.executor
            .call(move |s| {
                let released = on_release_worker(&mut s.pool, s.events.as_mut(), worker_id, &cause);
                if released {
                    s.bridge.reconcile(&mut s.pool, &s.id_generator, now());
                }
                released
            })
            .await
    }

    /// Returns the accepted offers.
    pub async fn offer_slots(
        &self,
        location: WorkerLocation,
        gateway: WorkerGatewayRef,
        offers: Vec<SlotOffer>,
    ) -> crate::Result<Vec<SlotOffer>> {
        self.executor
            .call(move |s| on_offer_slots(&mut s.pool, &location, &gateway, offers, now()))
            .await
    }

    /// Interactive request; fails with `NoResourceAvailable` after `timeout`
    /// (or the configured request timeout).
    pub fn request_new_allocated_slot(
        &self,
        request_id: SlotRequestId,
        profile: ResourceProfile,
        timeout: Option<Duration>,
    ) -> SlotFuture {
        let timeout = timeout.unwrap_or(self.request_timeout);
        self.submit_request(request_id, profile, RequestKind::Interactive, Some(timeout))
    }

    /// Batch request; waits as long as some registered slot could serve it.
    pub fn request_new_allocated_batch_slot(
        &self,
        request_id: SlotRequestId,
        profile: ResourceProfile,
    ) -> SlotFuture {
        self.submit_request(request_id, profile, RequestKind::Batch, None)
    }

    fn submit_request(
        &self,
        request_id: SlotRequestId,
        profile: ResourceProfile,
        kind: RequestKind,
        timeout: Option<Duration>,
    ) -> SlotFuture {
        let (promise, future) = SlotPromise::new(request_id);
        let created = now();
        let record = RequestRecord {
            request_id,
            profile,
            kind,
            origin: RequestOrigin::Caller,
            order: 0,
            created,
            deadline: timeout.map(|timeout| created + timeout),
            unfulfillable_since: None,
            promise,
        };
        // If the loop is gone, the record is dropped and the future resolves with PoolClosed
        let _ = self.executor.execute(move |s| {
            if let Err(e) = on_request_slot(&mut s.pool, record, now()) {
                log::debug!("Slot request {request_id} rejected: {e}");
            }
        });
        future
    }

    /// Cancels a pending request or returns the slot of a fulfilled one to the pool.
    pub async fn release_slot(
        &self,
        request_id: SlotRequestId,
        cause: &str,
    ) -> crate::Result<bool> {
        let cause = cause.to_string();
        self.executor
            .call(move |s| on_release_slot(&mut s.pool, request_id, &cause, now()))
            .await
    }

    pub async fn set_resource_requirements(
        &self,
        requirements: ResourceCounter,
    ) -> crate::Result<RequirementChange> {
        self.executor
            .call(move |s| {
                s.bridge.set_requirements(
                    &mut s.pool,
                    s.events.as_mut(),
                    &s.id_generator,
                    requirements,
                    now(),
                )
            })
            .await
    }

    /// Protects (or unprotects) a requirement unit from being released by a decrease.
    pub async fn set_requirement_slot_in_use(
        &self,
        request_id: SlotRequestId,
        in_use: bool,
    ) -> crate::Result<bool> {
        self.executor
            .call(move |s| s.bridge.set_in_use(request_id, in_use))
            .await
    }

    /// Returns the requests failed because of the shortage.
    pub async fn notify_not_enough_resources_available(
        &self,
        acquired: ResourceCounter,
    ) -> crate::Result<Vec<SlotRequestId>> {
        self.executor
            .call(move |s| on_not_enough_resources(&mut s.pool, s.events.as_mut(), &acquired))
            .await
    }

    /// Runs `f` on the coordination loop with read access to the state.
    pub async fn with_state<F, R>(&self, f: F) -> crate::Result<R>
    where
        F: FnOnce(&PoolState) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.executor.call(move |s| f(s)).await
    }

    pub async fn free_resources(&self) -> crate::Result<ResourceCounter> {
        self.with_state(|s| s.pool.free_resources().clone()).await
    }

    pub async fn dump(&self) -> crate::Result<serde_json::Value> {
        self.with_state(|s| s.dump(now())).await
    }

    /// Fails every pending request, frees all slots and stops the loop.
    /// Closing a closed pool is a no-op.
    pub async fn close(&self) -> crate::Result<()> {
        match self.executor.call(|s| on_close(&mut s.pool)).await {
            Ok(()) | Err(PoolError::PoolClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }
}
