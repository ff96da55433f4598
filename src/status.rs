use crate::state::State;

/// Point-in-time snapshot returned by the `status` operation.
#[derive(Debug, Clone)]
pub struct Status {
    pub state: State,
    pub fount_count: usize,
    pub num_slabs: usize,
    pub slab_size: usize,
    pub depth: usize,
    /// `depth * slab_size`.
    pub max_pids: usize,
    /// `fount_count + num_slabs * slab_size`.
    pub pid_count: usize,
    /// Best-effort identifier of the configured `WorkerFactory` type, for
    /// observability only.
    pub factory_type: &'static str,
}

/// Average elapsed microseconds over all slabs currently resident, including
/// the fount's associated elapsed time iff the fount is non-empty.
///
/// Best-effort: no accuracy guarantee across reconfiguration (there is none)
/// or concurrent slab delivery.
pub fn spawn_rate_per_slab(
    slab_elapsed_sum_us: u64,
    num_slabs: usize,
    fount_count: usize,
    fount_elapsed_us: u64,
) -> f64 {
    let (numerator, denominator) = if fount_count > 0 {
        (slab_elapsed_sum_us + fount_elapsed_us, num_slabs + 1)
    } else {
        (slab_elapsed_sum_us, num_slabs)
    };
    round_hundredths(checked_average(numerator, denominator))
}

/// Total elapsed microseconds divided by total workers held.
pub fn spawn_rate_per_process(
    slab_elapsed_sum_us: u64,
    fount_count: usize,
    fount_elapsed_us: u64,
    pid_count: usize,
) -> f64 {
    let numerator = if fount_count > 0 {
        slab_elapsed_sum_us + fount_elapsed_us
    } else {
        slab_elapsed_sum_us
    };
    round_hundredths(checked_average(numerator, pid_count))
}

fn checked_average(numerator: u64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
