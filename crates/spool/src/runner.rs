use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use slotpool::events::LogEventProcessor;
use slotpool::pool::{PhysicalSlot, SlotFuture, WorkerGateway, WorkerLocation};
use slotpool::security::AuthenticationStatus;
use slotpool::service::SlotPoolService;
use slotpool::{AllocationId, SlotRequestError, SlotRequestId, WorkerId};

use crate::common::error::SpoolError;
use crate::gateway::{FreedSlot, LoggingGateway};
use crate::scenario::{EventDef, Scenario, to_counter};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RequestOutcome {
    Pending,
    Fulfilled {
        allocation_id: AllocationId,
        worker_id: WorkerId,
    },
    Released {
        allocation_id: AllocationId,
    },
    Lost {
        allocation_id: AllocationId,
        cause: String,
    },
    Failed {
        cause: String,
    },
    Cancelled {
        cause: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub requests: BTreeMap<SlotRequestId, RequestOutcome>,
    pub freed: Vec<FreedSlot>,
    pub pool: serde_json::Value,
}

/// Follows the result handles of the requests the scenario submitted.
#[derive(Default)]
struct RequestTracker {
    waiting: BTreeMap<SlotRequestId, SlotFuture>,
    held: BTreeMap<SlotRequestId, PhysicalSlot>,
    outcomes: BTreeMap<SlotRequestId, RequestOutcome>,
}

impl RequestTracker {
    fn submit(&mut self, future: SlotFuture) {
        let request_id = future.request_id();
        if self.waiting.contains_key(&request_id) || self.held.contains_key(&request_id) {
            // The pool rejects it, the original request stays as it is
            log::warn!("Request {request_id} was submitted again");
            return;
        }
        self.outcomes.insert(request_id, RequestOutcome::Pending);
        self.waiting.insert(request_id, future);
    }

    fn released(&mut self, request_id: SlotRequestId) {
        if let Some(slot) = self.held.remove(&request_id) {
            self.outcomes.insert(
                request_id,
                RequestOutcome::Released {
                    allocation_id: slot.allocation_id(),
                },
            );
        }
    }

    fn poll(&mut self) {
        let mut resolved = Vec::new();
        for (request_id, future) in self.waiting.iter_mut() {
            if let Some(result) = future.try_result() {
                resolved.push((*request_id, result));
            }
        }
        for (request_id, result) in resolved {
            self.waiting.remove(&request_id);
            let outcome = match result {
                Ok(slot) => {
                    let outcome = RequestOutcome::Fulfilled {
                        allocation_id: slot.allocation_id(),
                        worker_id: slot.worker_id(),
                    };
                    self.held.insert(request_id, slot);
                    outcome
                }
                Err(error @ SlotRequestError::Cancelled(_)) => RequestOutcome::Cancelled {
                    cause: error.to_string(),
                },
                Err(error) => RequestOutcome::Failed {
                    cause: error.to_string(),
                },
            };
            log::info!("Request {request_id}: {outcome:?}");
            self.outcomes.insert(request_id, outcome);
        }

        let mut lost = Vec::new();
        for (request_id, slot) in self.held.iter_mut() {
            if let Some(error) = slot.release_listener().try_lost() {
                lost.push((*request_id, slot.allocation_id(), error));
            }
        }
        for (request_id, allocation_id, error) in lost {
            self.held.remove(&request_id);
            log::info!("Request {request_id} lost slot {allocation_id}: {error}");
            self.outcomes.insert(
                request_id,
                RequestOutcome::Lost {
                    allocation_id,
                    cause: error.to_string(),
                },
            );
        }
    }
}

struct ScenarioContext {
    service: SlotPoolService,
    tracker: RequestTracker,
    gateways: BTreeMap<WorkerId, Arc<LoggingGateway>>,
}

impl ScenarioContext {
    fn gateway(&mut self, worker_id: WorkerId) -> Arc<LoggingGateway> {
        self.gateways
            .entry(worker_id)
            .or_insert_with(|| LoggingGateway::new(worker_id, &format!("worker-{worker_id}")))
            .clone()
    }

    /// Waits until the pool has processed everything submitted so far.
    async fn sync(&mut self) -> crate::Result<()> {
        self.service.with_state(|_| ()).await?;
        self.tracker.poll();
        Ok(())
    }

    async fn apply(&mut self, event: &EventDef) -> crate::Result<()> {
        match event {
            EventDef::Register { worker } => {
                let worker_id = WorkerId::new(*worker);
                if !self.service.register_task_manager(worker_id).await? {
                    log::warn!("Worker {worker_id} is registered already");
                }
            }
            EventDef::Offer {
                worker,
                hostname,
                slots,
            } => {
                let worker_id = WorkerId::new(*worker);
                let gateway = self.gateway(worker_id);
                let hostname = hostname.clone().unwrap_or_else(|| format!("host{worker}"));
                let location = WorkerLocation::new(worker_id, &hostname, gateway.address());
                let offers = slots.iter().map(|slot| slot.to_offer()).collect();
                let accepted = self.service.offer_slots(location, gateway, offers).await?;
                log::info!(
                    "Worker {worker_id}: {} of {} offered slots accepted",
                    accepted.len(),
                    slots.len()
                );
            }
            EventDef::Request {
                id,
                profile,
                timeout,
            } => {
                let future = self.service.request_new_allocated_slot(
                    SlotRequestId::new(*id),
                    profile.to_profile(),
                    *timeout,
                );
                self.tracker.submit(future);
            }
            EventDef::BatchRequest { id, profile } => {
                let future = self.service.request_new_allocated_batch_slot(
                    SlotRequestId::new(*id),
                    profile.to_profile(),
                );
                self.tracker.submit(future);
            }
            EventDef::ReleaseSlot { id, cause } => {
                let request_id = SlotRequestId::new(*id);
                if self.service.release_slot(request_id, cause).await? {
                    self.tracker.released(request_id);
                } else {
                    log::warn!("Request {request_id} is not known to the pool");
                }
            }
            EventDef::Requirements { resources } => {
                let change = self
                    .service
                    .set_resource_requirements(to_counter(resources))
                    .await?;
                log::info!(
                    "Requirements changed: {} units created, {} released",
                    change.created.len(),
                    change.released.len()
                );
            }
            EventDef::NotEnoughResources { acquired } => {
                let failed = self
                    .service
                    .notify_not_enough_resources_available(to_counter(acquired))
                    .await?;
                log::info!("{} requests failed for lack of resources", failed.len());
            }
            EventDef::ReleaseWorker { worker, cause } => {
                let worker_id = WorkerId::new(*worker);
                if !self.service.release_task_manager(worker_id, cause).await? {
                    log::warn!("Worker {worker_id} is not registered");
                }
            }
            EventDef::Sleep { duration } => {
                tokio::time::sleep(*duration).await;
            }
        }
        self.sync().await
    }
}

/// Replays the scenario against a fresh pool and reports the state right before the
/// pool is closed.
pub async fn run_scenario(scenario: &Scenario) -> crate::Result<ScenarioReport> {
    let config = scenario.pool.to_configuration()?;
    let (service, pool_loop) = SlotPoolService::start(
        config,
        Box::new(LogEventProcessor),
        AuthenticationStatus::default(),
    )?;
    let loop_handle = tokio::spawn(pool_loop);

    let mut ctx = ScenarioContext {
        service,
        tracker: RequestTracker::default(),
        gateways: Default::default(),
    };
    for event in &scenario.events {
        log::debug!("Applying {event:?}");
        ctx.apply(event).await?;
    }

    let pool = ctx.service.dump().await?;
    let freed = ctx
        .gateways
        .values()
        .flat_map(|gateway| gateway.freed())
        .collect();
    let report = ScenarioReport {
        requests: std::mem::take(&mut ctx.tracker.outcomes),
        freed,
        pool,
    };

    ctx.service.close().await?;
    loop_handle
        .await
        .map_err(|e| SpoolError::ScenarioError(format!("Slot pool loop failed: {e}")))?;
    Ok(report)
}
