use crate::error::DeliverError;
use crate::factory::WorkerFactory;

/// Per-worker outcome of a `task_many` dispatch. One faulty `deliver` call
/// never aborts the rest of the batch.
pub enum DispatchOutcome<W> {
    Delivered(W),
    Failed(DeliverError),
}

/// Pairs dispensed workers with messages position-wise and invokes `deliver`
/// once per pair. `workers` and `messages` are always the same length here:
/// they come from a `get_pids(messages.len())` call that either returned
/// exactly that many workers or none at all.
pub(crate) fn deliver_batch<F: WorkerFactory>(
    factory: &F,
    workers: Vec<F::Worker>,
    messages: Vec<F::Message>,
) -> Vec<DispatchOutcome<F::Worker>> {
    workers
        .into_iter()
        .zip(messages)
        .map(|(worker, message)| match factory.deliver(worker, message) {
            Ok(w) => DispatchOutcome::Delivered(w),
            Err(e) => DispatchOutcome::Failed(DeliverError::new(e)),
        })
        .collect()
}
