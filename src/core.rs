use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use crate::allocator::{spawn_allocator, SlabEvent};
use crate::config::FountConfig;
use crate::dispatch::{deliver_batch, DispatchOutcome};
use crate::error::FountError;
use crate::factory::{core_ref, new_anchor, CoreAnchor, WorkerFactory};
use crate::slab::Slab;
use crate::state::State;
use crate::status::{spawn_rate_per_process, spawn_rate_per_slab, Status};

/// One synchronous request delivered to the reservoir core's inbox.
pub(crate) enum CoreRequest<F: WorkerFactory> {
    GetPids {
        n: usize,
        reply: Sender<Vec<F::Worker>>,
    },
    TaskPids {
        messages: Vec<F::Message>,
        reply: Sender<Vec<DispatchOutcome<F::Worker>>>,
    },
    Status {
        reply: Sender<Status>,
    },
    RatePerSlab {
        reply: Sender<f64>,
    },
    RatePerProcess {
        reply: Sender<f64>,
    },
}

/// The reservoir's mutable state: the partial top (fount) plus the stack of
/// full slabs below it. Lives exclusively on the core's dedicated thread —
/// never shared, never locked.
struct CoreState<W> {
    fount: VecDeque<W>,
    fount_elapsed_us: u64,
    /// Stack of full slabs; the last element is the top.
    reservoir: Vec<Slab<W>>,
    slab_size: usize,
    depth: usize,
}

impl<W> CoreState<W> {
    #[inline]
    fn fount_count(&self) -> usize {
        self.fount.len()
    }

    #[inline]
    fn num_slabs(&self) -> usize {
        self.reservoir.len()
    }

    #[inline]
    fn total(&self) -> usize {
        self.num_slabs() * self.slab_size + self.fount_count()
    }

    #[inline]
    fn pid_count(&self) -> usize {
        self.fount_count() + self.num_slabs() * self.slab_size
    }

    fn state(&self) -> State {
        State::derive(self.fount_count(), self.num_slabs(), self.depth, self.slab_size)
    }

    fn slab_elapsed_sum_us(&self) -> u64 {
        self.reservoir.iter().map(|s| s.elapsed_us).sum()
    }

    /// Absorb one arriving slab. Returns `false` if the core was already
    /// FULL — an overfull invariant breach the caller must treat as fatal.
    fn absorb_slab(&mut self, slab: Slab<W>) -> bool {
        if matches!(self.state(), State::Full) {
            return false;
        }
        if self.fount.is_empty() {
            self.fount_elapsed_us = slab.elapsed_us;
            self.fount = slab.workers.into();
        } else {
            self.reservoir.push(slab);
        }
        true
    }

    /// The `get-pids` dispense algorithm, in full. Returns the dispensed
    /// workers and the number of replacement allocators the caller must
    /// spawn.
    fn dispense(&mut self, n: usize) -> (Vec<W>, usize) {
        let total = self.total();

        if n == 0 {
            return (Vec::new(), 0);
        }
        if n > total {
            // Refused: backpressure. No replacement, no state change — a
            // sustained refusal regime does not itself accelerate refill.
            return (Vec::new(), 0);
        }
        if n == total {
            let mut reply: Vec<W> = self.fount.drain(..).collect();
            let replacements = self.reservoir.len() + 1;
            while let Some(slab) = self.reservoir.pop() {
                reply.extend(slab.workers);
            }
            self.fount_elapsed_us = 0;
            return (reply, replacements);
        }
        if n < self.fount_count() {
            let reply: Vec<W> = self.fount.drain(..n).collect();
            return (reply, 0);
        }
        if n == self.fount_count() {
            let reply: Vec<W> = self.fount.drain(..).collect();
            self.fount_elapsed_us = 0;
            return (reply, 1);
        }
        if n <= self.slab_size && self.num_slabs() > 0 {
            return self.dispense_within_one_slab(n);
        }

        self.dispense_across_slabs(n)
    }

    /// Handles `fount_count < n <= slab_size && num_slabs > 0`: the request
    /// fits within one popped slab.
    fn dispense_within_one_slab(&mut self, n: usize) -> (Vec<W>, usize) {
        let top = self.reservoir.pop().expect("num_slabs > 0");
        if n == self.slab_size {
            return (top.workers, 1);
        }
        let mut remainder: VecDeque<W> = top.workers.into();
        let reply: Vec<W> = remainder.drain(..n).collect();
        self.merge_into_fount(remainder, top.elapsed_us);
        (reply, 1)
    }

    /// Handles `n > slab_size && n < total`: the request spans the fount
    /// and one or more full slabs.
    fn dispense_across_slabs(&mut self, n: usize) -> (Vec<W>, usize) {
        let excess = n % self.slab_size;
        let slabs_needed = (n - excess) / self.slab_size;
        let mut replacements = slabs_needed;

        let mut reply: Vec<W>;
        if self.fount_count() == excess {
            reply = self.fount.drain(..).collect();
            self.fount_elapsed_us = 0;
        } else if self.fount_count() > excess {
            reply = self.fount.drain(..excess).collect();
        } else {
            // fount_count < excess: reach past the fount into the top slab.
            replacements += 1;
            let top = self
                .reservoir
                .pop()
                .expect("num_slabs > 0 when n > slab_size and n < total");
            let need_from_slab = excess - self.fount_count();
            reply = self.fount.drain(..).collect();
            self.fount_elapsed_us = 0;
            let mut top_workers: VecDeque<W> = top.workers.into();
            reply.extend(top_workers.drain(..need_from_slab));
            self.merge_into_fount(top_workers, top.elapsed_us);
        }

        for _ in 0..slabs_needed {
            let slab = self
                .reservoir
                .pop()
                .expect("slabs_needed must not exceed num_slabs");
            reply.extend(slab.workers);
        }

        (reply, replacements)
    }

    /// Merges a popped slab's residue with whatever remains in the fount,
    /// biasing toward extending whichever sequence is longer so the merge
    /// stays cheap regardless of current partial size.
    fn merge_into_fount(&mut self, remainder: VecDeque<W>, elapsed_us: u64) {
        let current = std::mem::take(&mut self.fount);
        self.fount = if remainder.len() > current.len() {
            let mut merged = remainder;
            for w in current.into_iter().rev() {
                merged.push_front(w);
            }
            merged
        } else {
            let mut merged = current;
            merged.extend(remainder);
            merged
        };
        self.fount_elapsed_us = elapsed_us;
    }
}

/// Handle to a running reservoir core. Sending a request or dropping the
/// handle are the only ways to reach it — the handle never touches
/// `CoreState` directly, since that state lives exclusively on the core
/// thread.
pub(crate) struct CoreHandle<F: WorkerFactory> {
    request_tx: Sender<CoreRequest<F>>,
    shutdown_tx: Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl<F: WorkerFactory> CoreHandle<F> {
    pub(crate) fn send(&self, request: CoreRequest<F>) -> Result<(), FountError> {
        self.request_tx
            .send(request)
            .map_err(|_| FountError::CoreTerminated)
    }
}

impl<F: WorkerFactory> Drop for CoreHandle<F> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Constructs a reservoir core: spawns `depth` initial allocators (the core
/// starts EMPTY) and a dedicated thread running the core's event loop.
pub(crate) fn spawn_core<F: WorkerFactory>(factory: Arc<F>, config: FountConfig) -> CoreHandle<F> {
    let (request_tx, request_rx) = unbounded::<CoreRequest<F>>();
    let (slab_tx, slab_rx) = unbounded::<SlabEvent<F::Worker>>();
    let (shutdown_tx, shutdown_rx) = unbounded::<()>();

    let anchor = new_anchor();
    for _ in 0..config.depth() {
        spawn_allocator(
            factory.clone(),
            core_ref(&anchor),
            config.slab_size(),
            slab_tx.clone(),
        );
    }

    let join_handle = thread::Builder::new()
        .name("fount-core".to_string())
        .spawn(move || {
            run_core_loop(factory, config, anchor, request_rx, slab_rx, shutdown_rx, slab_tx);
        })
        .expect("failed to spawn fount core thread");

    CoreHandle {
        request_tx,
        shutdown_tx,
        join_handle: Some(join_handle),
    }
}

fn build_status<F: WorkerFactory>(state: &CoreState<F::Worker>, config: &FountConfig) -> Status {
    Status {
        state: state.state(),
        fount_count: state.fount_count(),
        num_slabs: state.num_slabs(),
        slab_size: config.slab_size(),
        depth: config.depth(),
        max_pids: config.max_pids(),
        pid_count: state.pid_count(),
        factory_type: std::any::type_name::<F>(),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_core_loop<F: WorkerFactory>(
    factory: Arc<F>,
    config: FountConfig,
    anchor: Arc<CoreAnchor>,
    request_rx: Receiver<CoreRequest<F>>,
    slab_rx: Receiver<SlabEvent<F::Worker>>,
    shutdown_rx: Receiver<()>,
    slab_tx: Sender<SlabEvent<F::Worker>>,
) {
    let mut state = CoreState {
        fount: VecDeque::new(),
        fount_elapsed_us: 0,
        reservoir: Vec::new(),
        slab_size: config.slab_size(),
        depth: config.depth(),
    };

    let mut spawn_replacement = |n: usize| {
        for _ in 0..n {
            spawn_allocator(factory.clone(), core_ref(&anchor), config.slab_size(), slab_tx.clone());
        }
    };

    loop {
        select! {
            recv(shutdown_rx) -> _ => {
                log::info!("fount: core shutting down, pid_count={}", state.pid_count());
                return;
            }
            recv(slab_rx) -> event => {
                match event {
                    Ok(SlabEvent::Delivered(slab)) => {
                        if !state.absorb_slab(slab) {
                            log::error!("fount: overfull — slab arrived while FULL, invariant breach");
                            panic!("fount: overfull — reservoir core invariant breach");
                        }
                        log::info!(
                            "fount: slab absorbed — state={:?} pid_count={}",
                            state.state(),
                            state.pid_count()
                        );
                    }
                    Ok(SlabEvent::Failed(msg)) => {
                        log::error!("fount: core terminating — worker factory failure: {msg}");
                        panic!("fount: worker factory spawn_one failed: {msg}");
                    }
                    Err(_) => {
                        // No allocator sender remains besides our own clone;
                        // this channel cannot disconnect while the core holds
                        // `slab_tx`. Unreachable in practice.
                        log::warn!("fount: slab channel disconnected unexpectedly");
                    }
                }
            }
            recv(request_rx) -> request => {
                match request {
                    Ok(CoreRequest::GetPids { n, reply }) => {
                        let (workers, replacements) = state.dispense(n);
                        if replacements == 0 && workers.is_empty() && n > 0 {
                            log::debug!("fount: refused get_pids({n}) — insufficient inventory");
                        }
                        let _ = reply.send(workers);
                        spawn_replacement(replacements);
                    }
                    Ok(CoreRequest::TaskPids { messages, reply }) => {
                        let (workers, replacements) = state.dispense(messages.len());
                        if workers.is_empty() {
                            let _ = reply.send(Vec::new());
                        } else {
                            let outcomes = deliver_batch(factory.as_ref(), workers, messages);
                            let _ = reply.send(outcomes);
                        }
                        spawn_replacement(replacements);
                    }
                    Ok(CoreRequest::Status { reply }) => {
                        let _ = reply.send(build_status::<F>(&state, &config));
                    }
                    Ok(CoreRequest::RatePerSlab { reply }) => {
                        let rate = spawn_rate_per_slab(
                            state.slab_elapsed_sum_us(),
                            state.num_slabs(),
                            state.fount_count(),
                            state.fount_elapsed_us,
                        );
                        let _ = reply.send(rate);
                    }
                    Ok(CoreRequest::RatePerProcess { reply }) => {
                        let rate = spawn_rate_per_process(
                            state.slab_elapsed_sum_us(),
                            state.fount_count(),
                            state.fount_elapsed_us,
                            state.pid_count(),
                        );
                        let _ = reply.send(rate);
                    }
                    Err(_) => {
                        log::info!("fount: no facade handles remain, core exiting");
                        return;
                    }
                }
            }
        }
    }
}
