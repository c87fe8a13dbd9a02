use crate::bitvector::BitVector;
use crate::partition::{Layout, Partition};

/// Smallest stored value of `partition` that `seed` must cross off.
///
/// Marking starts at `seed * seed`, or at the first multiple of `seed` at or
/// above the lower bound when the square lies below it. Under the odd layout
/// an even starting multiple is bumped to the next odd one.
pub fn first_multiple(partition: &Partition, seed: u64) -> Option<u64> {
    if partition.is_empty() {
        return None;
    }
    let square = seed.checked_mul(seed)?;
    let lower = partition.lower_bound;

    let mut first = if square >= lower {
        square
    } else {
        lower.div_ceil(seed).checked_mul(seed)?
    };
    if partition.layout == Layout::OddOnly && first % 2 == 0 {
        first = first.checked_add(seed)?;
    }

    (first <= partition.upper_bound).then_some(first)
}

/// Marks every multiple of `seed` inside the worker's own slice as composite.
///
/// Touches only `local`, which must be the vector of `partition`. Returns the
/// number of bits set.
pub fn mark(local: &mut BitVector, partition: &Partition, seed: u64) -> usize {
    debug_assert_eq!(local.len(), partition.local_length);
    let Some(first) = first_multiple(partition, seed) else {
        return 0;
    };
    // Stored multiples are `seed * step` apart, i.e. `seed` slots in either layout.
    local.set_stride(partition.index_of(first), seed as usize)
}
