/// The reservoir's observable lifecycle label. Always a pure function of
/// `(fount_count, num_slabs, depth, slab_size)` — see [`State::derive`] —
/// but stored explicitly alongside the data so transitions are observable
/// without recomputing on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// `fount_count == 0 && num_slabs == 0`.
    Empty,
    /// Any content, not yet full.
    Low,
    /// `fount_count >= slab_size && num_slabs == depth - 1` (capacity reached).
    Full,
}

impl State {
    /// Pure derivation from the current counts — never tracked as
    /// independent mutable state.
    pub fn derive(fount_count: usize, num_slabs: usize, depth: usize, slab_size: usize) -> State {
        if fount_count == 0 && num_slabs == 0 {
            State::Empty
        } else if fount_count >= slab_size && num_slabs == depth - 1 {
            State::Full
        } else {
            State::Low
        }
    }
}
