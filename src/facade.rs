use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::config::FountConfig;
use crate::core::{spawn_core, CoreHandle, CoreRequest};
use crate::dispatch::DispatchOutcome;
use crate::error::FountError;
use crate::factory::WorkerFactory;
use crate::status::Status;

/// Default time the facade waits for the core's reply before surfacing
/// [`FountError::Timeout`]. The core itself is unaffected by a facade-side
/// timeout and keeps running.
const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Process-wide registry of named founts, keyed by name. Each entry is
/// type-erased via `Any` since founts over different `WorkerFactory`s must
/// share one map; [`Fount::named`] downcasts back to the caller's concrete
/// `F` and fails closed if the name was registered under a different worker
/// type.
static REGISTRY: Lazy<DashMap<String, Arc<dyn Any + Send + Sync>>> = Lazy::new(DashMap::new);

/// A pre-allocated worker reservoir.
///
/// Construction spawns `depth` background slab allocators and one dedicated
/// core thread; everything else is a synchronous round-trip request against
/// that thread.
pub struct Fount<F: WorkerFactory> {
    handle: CoreHandle<F>,
}

impl<F: WorkerFactory> Fount<F> {
    /// Builds an unnamed reservoir with the given factory and sizing.
    pub fn new(factory: F, slab_size: usize, depth: usize) -> Result<Self, FountError> {
        let config = FountConfig::new(slab_size, depth)?;
        let handle = spawn_core(Arc::new(factory), config);
        Ok(Self { handle })
    }

    /// Builds a reservoir and registers it under `name` in the process-wide
    /// registry, so later callers can reach it via [`Fount::named`] without
    /// holding their own handle.
    ///
    /// Fails with [`FountError::NameTaken`] if `name` is already registered,
    /// regardless of worker type.
    pub fn new_named(
        name: impl Into<String>,
        factory: F,
        slab_size: usize,
        depth: usize,
    ) -> Result<Arc<Self>, FountError> {
        let name = name.into();
        let fount = Arc::new(Self::new(factory, slab_size, depth)?);
        match REGISTRY.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(FountError::NameTaken(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(fount.clone() as Arc<dyn Any + Send + Sync>);
                Ok(fount)
            }
        }
    }

    /// Looks up a previously-registered named reservoir by its expected
    /// worker-factory type. Returns [`FountError::NameNotFound`] if no such
    /// name exists, or if it is registered under a different `F`.
    pub fn named(name: &str) -> Result<Arc<Self>, FountError> {
        REGISTRY
            .get(name)
            .and_then(|entry| entry.value().clone().downcast::<Self>().ok())
            .ok_or_else(|| FountError::NameNotFound(name.to_string()))
    }

    /// Removes `name` from the process-wide registry. The reservoir itself
    /// keeps running for anyone still holding an `Arc` to it; it is only
    /// unreachable by name afterward.
    pub fn unregister(name: &str) {
        REGISTRY.remove(name);
    }

    /// Requests exactly `n` workers.
    ///
    /// Returns an empty `Vec` both when `n == 0` and when the reservoir
    /// cannot currently satisfy the request — these are value-level
    /// outcomes, not errors. [`FountError`] is reserved for the core having
    /// terminated or the reply timing out.
    pub fn get_many(&self, n: usize) -> Result<Vec<F::Worker>, FountError> {
        let (reply_tx, reply_rx) = bounded(0);
        self.handle.send(CoreRequest::GetPids { n, reply: reply_tx })?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| FountError::Timeout(REPLY_TIMEOUT))
    }

    /// Facade operation `get-one`: convenience for the common `n == 1` case.
    pub fn get_one(&self) -> Result<Option<F::Worker>, FountError> {
        Ok(self.get_many(1)?.into_iter().next())
    }

    /// Dispenses exactly `messages.len()` workers and hands each one its
    /// paired message via `WorkerFactory::deliver`. An empty result means
    /// the reservoir could not satisfy the request; a non-empty result
    /// always has the same length as `messages`, with per-slot
    /// [`DispatchOutcome`] reporting delivery failures individually.
    pub fn task_pids(
        &self,
        messages: Vec<F::Message>,
    ) -> Result<Vec<DispatchOutcome<F::Worker>>, FountError> {
        let (reply_tx, reply_rx) = bounded(0);
        self.handle
            .send(CoreRequest::TaskPids { messages, reply: reply_tx })?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| FountError::Timeout(REPLY_TIMEOUT))
    }

    /// Convenience for handing a single message to a single worker.
    pub fn task_one(&self, message: F::Message) -> Result<Option<DispatchOutcome<F::Worker>>, FountError> {
        Ok(self.task_pids(vec![message])?.into_iter().next())
    }

    /// Point-in-time snapshot of reservoir occupancy.
    pub fn status(&self) -> Result<Status, FountError> {
        let (reply_tx, reply_rx) = bounded(0);
        self.handle.send(CoreRequest::Status { reply: reply_tx })?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| FountError::Timeout(REPLY_TIMEOUT))
    }

    /// Average microseconds a background allocator spends per slab, over
    /// everything currently resident.
    pub fn spawn_rate_per_slab(&self) -> Result<f64, FountError> {
        let (reply_tx, reply_rx) = bounded(0);
        self.handle.send(CoreRequest::RatePerSlab { reply: reply_tx })?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| FountError::Timeout(REPLY_TIMEOUT))
    }

    /// Average microseconds spent per individual worker, over everything
    /// currently resident.
    pub fn spawn_rate_per_process(&self) -> Result<f64, FountError> {
        let (reply_tx, reply_rx) = bounded(0);
        self.handle
            .send(CoreRequest::RatePerProcess { reply: reply_tx })?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| FountError::Timeout(REPLY_TIMEOUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{CoreRef, MockWorkerFactory};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFactory {
        next_id: AtomicU32,
    }

    impl WorkerFactory for CountingFactory {
        type Worker = u32;
        type Message = u32;

        fn spawn_one(&self, _core: &CoreRef) -> Result<Self::Worker, String> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        fn deliver(&self, worker: Self::Worker, _message: Self::Message) -> Result<Self::Worker, String> {
            Ok(worker)
        }
    }

    fn factory() -> CountingFactory {
        CountingFactory { next_id: AtomicU32::new(0) }
    }

    #[test]
    fn construction_rejects_invalid_sizing() {
        assert!(matches!(
            Fount::new(factory(), 0, 5),
            Err(FountError::InvalidSlabSize)
        ));
        assert!(matches!(
            Fount::new(factory(), 10, 1),
            Err(FountError::InvalidDepth(1))
        ));
    }

    #[test]
    fn get_one_eventually_returns_a_worker() {
        let fount = Fount::new(factory(), 4, 2).expect("valid config");
        // Background allocators need a moment; retry within a bound instead
        // of sleeping a fixed duration.
        let mut worker = None;
        for _ in 0..200 {
            if let Some(w) = fount.get_one().expect("core alive") {
                worker = Some(w);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(worker.is_some());
    }

    #[test]
    fn named_registration_round_trips() {
        let fount = Fount::new_named("facade-test-pool", factory(), 4, 2).expect("register");
        let found = Fount::<CountingFactory>::named("facade-test-pool").expect("lookup");
        assert!(Arc::ptr_eq(&fount, &found));
        Fount::<CountingFactory>::unregister("facade-test-pool");
        assert!(matches!(
            Fount::<CountingFactory>::named("facade-test-pool"),
            Err(FountError::NameNotFound(_))
        ));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let _first = Fount::new_named("facade-dup-test", factory(), 4, 2).expect("register");
        let second = Fount::new_named("facade-dup-test", factory(), 4, 2);
        assert!(matches!(second, Err(FountError::NameTaken(_))));
        Fount::<CountingFactory>::unregister("facade-dup-test");
    }

    #[test]
    fn factory_spawn_failure_terminates_core() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut mock = MockWorkerFactory::new();
        mock.expect_spawn_one()
            .returning(|_core| Err("factory is broken".to_string()));
        mock.expect_deliver().returning(|w, _m| Ok(w));

        let fount = Fount::new(mock, 2, 2).expect("valid config");
        let mut terminated = false;
        for _ in 0..200 {
            if matches!(fount.get_one(), Err(FountError::CoreTerminated)) {
                terminated = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(terminated, "core should terminate after a factory failure");
    }

    #[test]
    fn deliver_failure_is_localized_to_one_worker() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut mock = MockWorkerFactory::new();
        let next_id = AtomicU32::new(0);
        mock.expect_spawn_one()
            .returning(move |_core| Ok(next_id.fetch_add(1, Ordering::SeqCst)));
        mock.expect_deliver().returning(|worker, message| {
            if message == 999 {
                Err(format!("worker {worker} rejected message {message}"))
            } else {
                Ok(worker)
            }
        });

        let fount = Fount::new(mock, 2, 2).expect("valid config");
        let mut ready = false;
        for _ in 0..200 {
            if let Ok(status) = fount.status() {
                if status.pid_count >= 2 {
                    ready = true;
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ready, "reservoir never became ready");

        let outcomes = fount.task_pids(vec![1, 999]).expect("core alive");
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], DispatchOutcome::Delivered(_)));
        assert!(matches!(outcomes[1], DispatchOutcome::Failed(_)));
    }
}
