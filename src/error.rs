use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the public facade.
///
/// Refusal (N > total) and other ignored outcomes are value-level (an empty
/// `Vec`), not represented here — this enum only carries the cases that are
/// genuinely exceptional: bad construction arguments, a terminated core, and
/// facade-level timeouts.
#[derive(Debug, Error)]
pub enum FountError {
    /// `slab_size` must be at least 1.
    #[error("slab_size must be at least 1")]
    InvalidSlabSize,

    /// `depth` must be at least 2.
    #[error("depth must be at least 2 (got {0})")]
    InvalidDepth(usize),

    /// A named fount is already registered under this name.
    #[error("a fount is already registered under the name {0:?}")]
    NameTaken(String),

    /// No named fount is registered under this name.
    #[error("no fount is registered under the name {0:?}")]
    NameNotFound(String),

    /// The reservoir core thread has terminated (an invariant breach such as
    /// overfull, or a worker factory programmer error) and can no longer
    /// service requests.
    #[error("reservoir core has terminated")]
    CoreTerminated,

    /// The facade's default reply timeout elapsed before the core replied.
    /// The core is unaffected and will still service the request when it
    /// reaches it.
    #[error("fount request timed out after {0:?}")]
    Timeout(Duration),
}

/// Opaque per-worker delivery failure, substituted in place of a worker in a
/// `task_many` reply slot when `WorkerFactory::deliver` fails for that one
/// message. Intentionally string-based: the core does not interpret the
/// cause, only localizes it.
#[derive(Debug, Clone)]
pub struct DeliverError(pub String);

impl fmt::Display for DeliverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deliver failed: {}", self.0)
    }
}

impl std::error::Error for DeliverError {}

impl DeliverError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
