/// An ordered, immutable-once-delivered group of exactly `slab_size` workers,
/// together with the elapsed microseconds its allocator spent producing it.
#[derive(Debug)]
pub struct Slab<W> {
    pub workers: Vec<W>,
    pub elapsed_us: u64,
}

impl<W> Slab<W> {
    pub fn new(workers: Vec<W>, elapsed_us: u64) -> Self {
        Self { workers, elapsed_us }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
