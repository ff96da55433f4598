use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::factory::{CoreRef, WorkerFactory};
use crate::slab::Slab;

/// Posted from a slab allocator thread back to the reservoir core's inbox.
/// Allocators are independent tasks and must post their result via the
/// core's event channel, never by direct mutation.
pub enum SlabEvent<W> {
    /// Exactly one slab, fully populated.
    Delivered(Slab<W>),
    /// `spawn_one` returned anything other than a live worker. This is a
    /// programmer error in the factory, not a runtime condition — the core
    /// fails fast on receipt of this event.
    Failed(String),
}

/// Spawns one short-lived background thread that calls `spawn_one`
/// sequentially `slab_size` times, measures the total elapsed time, and
/// posts exactly one [`SlabEvent`].
///
/// Runs concurrently with the core and with every other allocator; never
/// blocks a request path.
pub fn spawn_allocator<F: WorkerFactory>(
    factory: Arc<F>,
    core: CoreRef,
    slab_size: usize,
    out: Sender<SlabEvent<F::Worker>>,
) {
    std::thread::Builder::new()
        .name("fount-allocator".to_string())
        .spawn(move || {
            log::debug!("fount: allocator starting (slab_size={})", slab_size);
            let start = Instant::now();
            let mut workers = Vec::with_capacity(slab_size);

            for _ in 0..slab_size {
                match factory.spawn_one(&core) {
                    Ok(worker) => workers.push(worker),
                    Err(msg) => {
                        log::error!("fount: worker factory spawn_one failed: {msg}");
                        let _ = out.send(SlabEvent::Failed(msg));
                        return;
                    }
                }
            }

            let elapsed_us = start.elapsed().as_micros() as u64;
            log::debug!(
                "fount: allocator finished slab of {} workers in {}us",
                slab_size,
                elapsed_us
            );
            let _ = out.send(SlabEvent::Delivered(Slab::new(workers, elapsed_us)));
        })
        .expect("failed to spawn fount allocator thread");
}
