use crate::internal::common::resources::ResourceCounter;
use crate::{SlotRequestId, WorkerId};

/// Outbound notifications of the pool, towards the resource manager and the scheduler.
///
/// Called from the coordination loop; implementations must not block.
pub trait EventProcessor: Send {
    fn on_worker_registered(&mut self, worker_id: WorkerId);

    /// `lost_requests` are the fulfilled requests whose slots lived on the worker.
    fn on_worker_released(
        &mut self,
        worker_id: WorkerId,
        lost_requests: &[SlotRequestId],
        cause: &str,
    );

    /// The resource manager could not provide what was declared.
    /// `failed_requests` were failed because of that.
    fn on_not_enough_resources(
        &mut self,
        acquired: &ResourceCounter,
        failed_requests: &[SlotRequestId],
    );

    fn on_resource_requirements_declared(&mut self, requirements: &ResourceCounter);
}

/// Writes every event into the log.
#[derive(Default)]
pub struct LogEventProcessor;

impl EventProcessor for LogEventProcessor {
    fn on_worker_registered(&mut self, worker_id: WorkerId) {
        log::info!("Worker {worker_id} registered");
    }

    fn on_worker_released(
        &mut self,
        worker_id: WorkerId,
        lost_requests: &[SlotRequestId],
        cause: &str,
    ) {
        log::info!(
            "Worker {worker_id} released ({cause}), lost requests: {}",
            crate::format_comma_delimited(lost_requests.iter())
        );
    }

    fn on_not_enough_resources(
        &mut self,
        acquired: &ResourceCounter,
        failed_requests: &[SlotRequestId],
    ) {
        log::warn!(
            "Not enough resources, acquired {acquired:?}, failed requests: {}",
            crate::format_comma_delimited(failed_requests.iter())
        );
    }

    fn on_resource_requirements_declared(&mut self, requirements: &ResourceCounter) {
        log::debug!("Resource requirements declared: {requirements:?}");
    }
}
