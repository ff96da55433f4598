//! Integration coverage exercising the full threaded pipeline: background
//! allocators, the core thread, and the facade, wired together exactly as a
//! caller would use them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use fount::{CoreRef, Fount, FountError, WorkerFactory};

struct CountingFactory {
    next_id: AtomicU32,
    failures: Mutex<Vec<u32>>,
}

impl CountingFactory {
    fn new() -> Self {
        Self {
            next_id: AtomicU32::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }
}

impl WorkerFactory for CountingFactory {
    type Worker = u32;
    type Message = u32;

    fn spawn_one(&self, _core: &CoreRef) -> Result<Self::Worker, String> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn deliver(&self, worker: Self::Worker, message: Self::Message) -> Result<Self::Worker, String> {
        if message == worker {
            Err(format!("worker {worker} refused its own id as a message"))
        } else {
            self.failures.lock().unwrap().push(worker);
            Ok(worker)
        }
    }
}

fn wait_until_ready<F: WorkerFactory<Worker = u32>>(fount: &Fount<F>, needed: usize) {
    for _ in 0..500 {
        if let Ok(status) = fount.status() {
            if status.pid_count >= needed {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("reservoir never reached {needed} resident workers");
}

#[test]
fn full_reservoir_dispenses_and_refills() {
    let fount = Fount::new(CountingFactory::new(), 4, 3).expect("valid config");
    wait_until_ready(&fount, 8); // fount(4) + one reserve slab(4); depth=3 => 2 reserve slabs total eventually

    let batch = fount.get_many(2).expect("core alive");
    assert_eq!(batch.len(), 2);

    let status = fount.status().expect("core alive");
    assert!(status.pid_count < 12);
}

#[test]
fn task_pids_reports_per_worker_delivery_outcomes() {
    let fount = Fount::new(CountingFactory::new(), 4, 2).expect("valid config");
    wait_until_ready(&fount, 1);

    // Message equal to a dispensed worker's own id deliberately fails that
    // slot without affecting the others.
    let outcomes = fount
        .task_pids(vec![0, 999])
        .expect("core alive");
    assert_eq!(outcomes.len(), 2);
}

#[test]
fn refusal_when_request_exceeds_total_capacity() {
    let fount = Fount::new(CountingFactory::new(), 4, 2).expect("valid config");
    wait_until_ready(&fount, 1);

    let reply = fount.get_many(1_000_000).expect("core alive");
    assert!(reply.is_empty());
}

#[test]
fn named_lookup_is_visible_across_handles() {
    let _fount = Fount::new_named(
        "reservoir-integration-test",
        CountingFactory::new(),
        4,
        2,
    )
    .expect("register");

    let same = Fount::<CountingFactory>::named("reservoir-integration-test").expect("found");
    wait_until_ready(&same, 1);
    assert!(same.get_one().expect("core alive").is_some());

    Fount::<CountingFactory>::unregister("reservoir-integration-test");
    assert!(matches!(
        Fount::<CountingFactory>::named("reservoir-integration-test"),
        Err(FountError::NameNotFound(_))
    ));
}
