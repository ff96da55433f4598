use std::sync::{Arc, Weak};

/// Opaque back-reference handed to `WorkerFactory::spawn_one`.
///
/// The reservoir core does not retain a typed reference to any worker beyond
/// its identity — this handle exists solely so a factory whose worker type
/// needs to register its own supervisory link (e.g. to abort a task it owns
/// if the core goes away) has something to hold a weak reference to. The
/// core never upgrades or inspects it itself.
#[derive(Clone)]
pub struct CoreRef(pub(crate) Weak<CoreAnchor>);

impl CoreRef {
    /// True once the core this handle points at has been dropped.
    pub fn is_core_gone(&self) -> bool {
        self.0.strong_count() == 0
    }
}

/// Marker kept alive for exactly as long as a `ReservoirCore` is alive.
/// Its only job is to give `CoreRef` something to weak-reference.
pub struct CoreAnchor;

pub(crate) fn new_anchor() -> Arc<CoreAnchor> {
    Arc::new(CoreAnchor)
}

pub(crate) fn core_ref(anchor: &Arc<CoreAnchor>) -> CoreRef {
    CoreRef(Arc::downgrade(anchor))
}

/// The external worker-factory contract. Supplied by the caller; the core
/// only invokes it, never defines it.
///
/// Implementations MUST treat `spawn_one` returning `Err` as fatal: a
/// factory producing anything other than a live worker is a programmer
/// error, not a runtime condition to recover from, and will bring the
/// reservoir core down (see [`crate::core`]).
#[cfg_attr(test, mockall::automock(type Worker = u32; type Message = u32;))]
pub trait WorkerFactory: Send + Sync + 'static {
    /// A live, independently-scheduled unit of work, usable for exactly one
    /// job after dispense.
    type Worker: Send + 'static;

    /// The one-shot payload handed to a worker via `deliver`.
    type Message: Send + 'static;

    /// Produce one worker, linking its lifetime to the core referenced by
    /// `core` before returning. Called repeatedly, sequentially, by a
    /// background [`crate::allocator`] task — never on the core's own
    /// thread.
    fn spawn_one(&self, core: &CoreRef) -> Result<Self::Worker, String>;

    /// Hand `message` to `worker`, whose ownership has already flipped away
    /// from the core. On success the worker is returned unchanged; on
    /// failure the error is opaque and localized to this one worker — it
    /// must never abort the rest of a `task_many` batch.
    fn deliver(&self, worker: Self::Worker, message: Self::Message) -> Result<Self::Worker, String>;
}
