use std::future::Future;
use std::sync::Arc;

use slotpool::events::LogEventProcessor;
use slotpool::pool::{PoolConfiguration, SlotOffer, WorkerGateway, WorkerGatewayRef, WorkerLocation};
use slotpool::resources::ResourceProfile;
use slotpool::security::AuthenticationStatus;
use slotpool::service::SlotPoolService;
use slotpool::{AllocationId, WorkerId};
use tokio::runtime::Runtime;

#[derive(Debug)]
pub struct NullGateway;

impl WorkerGateway for NullGateway {
    fn address(&self) -> &str {
        ""
    }

    fn free_slot(&self, _allocation_id: AllocationId, _cause: &str) {}
}

pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

pub fn cpus(n: u32) -> ResourceProfile {
    ResourceProfile::builder().cpu_cores(n).build()
}

pub fn create_offers(first_id: u64, count: usize, profile: &ResourceProfile) -> Vec<SlotOffer> {
    (0..count)
        .map(|i| SlotOffer::new(AllocationId::new(first_id + i as u64), i as u32, profile.clone()))
        .collect()
}

pub fn location(worker_id: u32) -> WorkerLocation {
    WorkerLocation::new(WorkerId::new(worker_id), "localhost", "127.0.0.1:6122")
}

pub fn gateway() -> WorkerGatewayRef {
    Arc::new(NullGateway)
}

/// Starts a pool on `rt` with one registered worker.
pub fn start_pool(rt: &Runtime) -> SlotPoolService {
    rt.block_on(async {
        let (service, future) = SlotPoolService::start(
            PoolConfiguration::default(),
            Box::new(LogEventProcessor),
            AuthenticationStatus::default(),
        )
        .unwrap();
        tokio::spawn(future);
        service.register_task_manager(WorkerId::new(1)).await.unwrap();
        service
    })
}

pub fn wait_all<F: Future>(rt: &Runtime, futures: Vec<F>) {
    rt.block_on(async {
        futures::future::join_all(futures).await;
    });
}
