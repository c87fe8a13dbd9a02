use rayon::prelude::*;
use serde::Serialize;

use crate::bitvector::BitVector;
use crate::partition::{Layout, Partition};
use crate::sieve::Model;

/// A worker's slice after the terminal round.
#[derive(Debug)]
pub struct Segment {
    pub partition: Partition,
    pub bits: BitVector,
    /// Unmarked entries, counted by the worker itself.
    pub survivors: u64,
}

impl Segment {
    /// Values left unmarked in this slice, ascending.
    pub fn primes(&self) -> impl Iterator<Item = u64> + '_ {
        self.bits
            .iter_clear()
            .map(|index| self.partition.value_at(index))
    }
}

/// Partial sum of survivor counts; merging is commutative and associative.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub survivors: u64,
    pub segments: usize,
}

impl Tally {
    fn add(&mut self, segment: &Segment) {
        self.survivors += segment.survivors;
        self.segments += 1;
    }

    pub fn merge(&mut self, other: &Tally) {
        self.survivors += other.survivors;
        self.segments += other.segments;
    }
}

/// Sums every worker's survivors.
pub fn tally(segments: &[Segment]) -> Tally {
    segments
        .par_iter()
        .fold(Tally::default, |mut local, segment| {
            local.add(segment);
            local
        })
        .reduce(Tally::default, |mut a, b| {
            a.merge(&b);
            a
        })
}

/// Global prime count: the survivors plus the primes the layout leaves out.
pub fn global_count(tally: &Tally, layout: Layout, n: u64) -> u64 {
    tally.survivors + layout.implicit_primes(n)
}

/// Final result of one run.
#[derive(Debug)]
pub struct SieveOutput {
    pub n: u64,
    pub workers: usize,
    pub layout: Layout,
    pub model: Model,
    /// Synchronized seed rounds executed.
    pub rounds: u64,
    pub count: u64,
    pub segments: Vec<Segment>,
}

impl SieveOutput {
    /// Every prime in `[2, n]`, ascending. Each call starts over.
    pub fn primes(&self) -> impl Iterator<Item = u64> + '_ {
        let implicit = (self.layout.implicit_primes(self.n) > 0).then_some(2);
        implicit
            .into_iter()
            .chain(self.segments.iter().flat_map(Segment::primes))
    }

    pub fn summary(&self) -> Summary {
        Summary {
            n: self.n,
            workers: self.workers,
            layout: self.layout,
            model: self.model,
            rounds: self.rounds,
            prime_count: self.count,
            storage_bytes: self.segments.iter().map(|s| s.bits.storage_bytes()).sum(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub n: u64,
    pub workers: usize,
    pub layout: Layout,
    pub model: Model,
    pub rounds: u64,
    pub prime_count: u64,
    pub storage_bytes: usize,
}
