//! Contiguous block decomposition of the domain `[2, n]` across workers.
//!
//! Worker `i` of `p` owns the logical block starting at
//! `2 + floor(i * (n - 2) / p)` and ending one below the next worker's start;
//! the last worker always ends at `n`. Under [`Layout::OddOnly`] the bounds
//! are pulled inward to the nearest odd values and only those are stored.

use clap::ValueEnum;
use serde::Serialize;

use crate::error::SieveError;

/// How a worker's values map onto the bits of its local vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Only odd values are stored; 2 is accounted for by the reducer.
    #[default]
    #[value(name = "odd")]
    OddOnly,
    /// Every value of the block is stored.
    Full,
}

impl Layout {
    /// Distance between two consecutive stored values.
    pub fn step(self) -> u64 {
        match self {
            Layout::OddOnly => 2,
            Layout::Full => 1,
        }
    }

    /// The seed the first round marks with.
    pub fn first_seed(self) -> u64 {
        match self {
            Layout::OddOnly => 3,
            Layout::Full => 2,
        }
    }

    /// Primes the layout cannot represent and the reducer must add back.
    pub fn implicit_primes(self, n: u64) -> u64 {
        match self {
            Layout::OddOnly if n >= 2 => 1,
            _ => 0,
        }
    }
}

/// One worker's slice of the domain.
///
/// `lower_bound` and `upper_bound` are inclusive and already adjusted for the
/// layout. An empty slice has `local_length == 0` and `lower_bound > upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker_id: usize,
    pub worker_count: usize,
    pub domain_size: u64,
    pub layout: Layout,
    pub lower_bound: u64,
    pub upper_bound: u64,
    pub local_length: usize,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.local_length == 0
    }

    /// Local bit index of `value`, which must be a stored value of this slice.
    pub fn index_of(&self, value: u64) -> usize {
        debug_assert!(self.contains(value));
        ((value - self.lower_bound) / self.layout.step()) as usize
    }

    /// Value represented by local bit `index`.
    pub fn value_at(&self, index: usize) -> u64 {
        self.lower_bound + index as u64 * self.layout.step()
    }

    /// Whether `value` is stored in this slice.
    pub fn contains(&self, value: u64) -> bool {
        !self.is_empty()
            && value >= self.lower_bound
            && value <= self.upper_bound
            && (value - self.lower_bound) % self.layout.step() == 0
    }
}

/// Logical, unadjusted `[low, high]` block of worker `worker_id`.
///
/// Blocks are contiguous and cover `[2, domain_size]` exactly once. A block
/// may be empty (`low > high`) when there are more workers than values.
pub fn block_bounds(worker_id: usize, worker_count: usize, domain_size: u64) -> (u64, u64) {
    debug_assert!(worker_count > 0 && worker_id < worker_count);
    let low = block_low(worker_id, worker_count, domain_size);
    let high = if worker_id + 1 == worker_count {
        domain_size
    } else {
        block_low(worker_id + 1, worker_count, domain_size) - 1
    };
    (low, high)
}

fn block_low(worker_id: usize, worker_count: usize, domain_size: u64) -> u64 {
    let span = domain_size.saturating_sub(2) as u128;
    2 + (worker_id as u128 * span / worker_count as u128) as u64
}

/// Computes worker `worker_id`'s partition of `[2, domain_size]`.
pub fn partition(
    worker_id: usize,
    worker_count: usize,
    domain_size: u64,
    layout: Layout,
) -> Partition {
    let (low, high) = block_bounds(worker_id, worker_count, domain_size);

    let (lower_bound, upper_bound) = match layout {
        Layout::Full => (low, high),
        Layout::OddOnly => {
            let upper = if high % 2 == 0 {
                high.saturating_sub(1)
            } else {
                high
            };
            (low | 1, upper)
        }
    };

    let local_length = if lower_bound > upper_bound {
        0
    } else {
        ((upper_bound - lower_bound) / layout.step() + 1) as usize
    };

    Partition {
        worker_id,
        worker_count,
        domain_size,
        layout,
        lower_bound,
        upper_bound,
        local_length,
    }
}

/// Rejects worker counts for which the first block cannot hold every seed.
///
/// The designated worker finds every seed `<= sqrt(n)` in its own block, so
/// `n / workers > sqrt(n)` must hold before anything is partitioned.
pub fn check_worker_count(n: u64, workers: usize) -> Result<(), SieveError> {
    if workers == 0 || n / workers as u64 <= n.isqrt() {
        return Err(SieveError::Configuration { n, workers });
    }
    Ok(())
}
