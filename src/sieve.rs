use clap::ValueEnum;
use indicatif::ProgressBar;
use log::{debug, info};
use serde::Serialize;

use crate::error::SieveError;
use crate::partition::{self, Layout, Partition};
use crate::reduce::{self, SieveOutput};
use crate::rounds;

/// How workers are scheduled and how they agree on seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    /// A pool of threads sharing one seed cell behind a barrier.
    #[default]
    Threads,
    /// Workers that share nothing; the root broadcasts every seed.
    Messages,
}

/// A validated-at-run-time request for the primes in `[2, n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SieveRequest {
    pub n: u64,
    pub workers: usize,
    pub layout: Layout,
    pub model: Model,
}

impl SieveRequest {
    pub fn new(n: u64, workers: usize) -> Self {
        Self {
            n,
            workers,
            layout: Layout::default(),
            model: Model::default(),
        }
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Rejects bounds below 1 and worker counts too large for the bound.
    pub fn validate(&self) -> Result<(), SieveError> {
        if self.n < 1 {
            return Err(SieveError::InvalidInput { n: self.n });
        }
        if self.workers == 0 {
            return Err(SieveError::Configuration {
                n: self.n,
                workers: 0,
            });
        }
        if self.n >= 2 {
            partition::check_worker_count(self.n, self.workers)?;
        }
        Ok(())
    }

    pub fn partitions(&self) -> Vec<Partition> {
        (0..self.workers)
            .map(|id| partition::partition(id, self.workers, self.n, self.layout))
            .collect()
    }
}

/// Counts (and keeps) every prime in `[2, n]`.
///
/// Validation happens before anything is allocated. `progress` is advanced
/// once per seed round.
pub fn sieve(request: &SieveRequest, progress: &ProgressBar) -> Result<SieveOutput, SieveError> {
    request.validate()?;

    if request.n < 2 {
        return Ok(SieveOutput {
            n: request.n,
            workers: request.workers,
            layout: request.layout,
            model: request.model,
            rounds: 0,
            count: 0,
            segments: Vec::new(),
        });
    }

    let partitions = request.partitions();
    for p in &partitions {
        debug!(
            "partition {}: [{}, {}] -> {} bits",
            p.worker_id, p.lower_bound, p.upper_bound, p.local_length
        );
    }

    let outcomes = match request.model {
        Model::Threads => rounds::run_pooled(&partitions, progress)?,
        Model::Messages => rounds::run_messaging(&partitions, progress)?,
    };

    let rounds = outcomes
        .iter()
        .find(|o| o.segment.partition.worker_id == rounds::DESIGNATED)
        .map_or(0, |o| o.rounds);
    let segments: Vec<_> = outcomes.into_iter().map(|o| o.segment).collect();
    let tally = reduce::tally(&segments);
    let count = reduce::global_count(&tally, request.layout, request.n);
    info!(
        "n = {}, {} segments ({:?}, {:?}): {count} primes after {rounds} rounds",
        request.n, tally.segments, request.layout, request.model
    );

    Ok(SieveOutput {
        n: request.n,
        workers: request.workers,
        layout: request.layout,
        model: request.model,
        rounds,
        count,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain byte-per-value sieve used as the reference.
    fn reference_primes(n: u64) -> Vec<u64> {
        if n < 2 {
            return Vec::new();
        }
        let n = n as usize;
        let mut is_prime = vec![true; n + 1];
        is_prime[0] = false;
        is_prime[1] = false;
        let mut i = 2;
        while i * i <= n {
            if is_prime[i] {
                for j in (i * i..=n).step_by(i) {
                    is_prime[j] = false;
                }
            }
            i += 1;
        }
        (0..=n).filter(|&i| is_prime[i]).map(|i| i as u64).collect()
    }

    fn run(n: u64, workers: usize, layout: Layout, model: Model) -> SieveOutput {
        let request = SieveRequest::new(n, workers).layout(layout).model(model);
        sieve(&request, &ProgressBar::hidden()).unwrap()
    }

    const ALL: [(Layout, Model); 4] = [
        (Layout::OddOnly, Model::Threads),
        (Layout::OddOnly, Model::Messages),
        (Layout::Full, Model::Threads),
        (Layout::Full, Model::Messages),
    ];

    #[test]
    fn test_boundaries() {
        for (layout, model) in ALL {
            assert_eq!(run(1, 1, layout, model).count, 0);
            assert_eq!(run(1, 1, layout, model).primes().count(), 0);
            assert_eq!(run(2, 1, layout, model).primes().collect::<Vec<_>>(), vec![2]);
            assert_eq!(run(3, 1, layout, model).primes().collect::<Vec<_>>(), vec![2, 3]);
        }
    }

    #[test]
    fn test_thirty_and_hundred() {
        for (layout, model) in ALL {
            let out = run(30, 4, layout, model);
            assert_eq!(out.count, 10);
            assert_eq!(
                out.primes().collect::<Vec<_>>(),
                vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]
            );
            assert_eq!(run(100, 4, layout, model).count, 25);
        }
    }

    #[test]
    fn test_matches_reference_up_to_a_million() {
        let n = 1_000_000;
        let expected = reference_primes(n);
        assert_eq!(expected.len(), 78_498);
        for (layout, model) in ALL {
            let out = run(n, 8, layout, model);
            assert_eq!(out.count, expected.len() as u64);
            assert!(out.primes().eq(expected.iter().copied()));
        }
    }

    #[test]
    fn test_count_is_independent_of_worker_count() {
        for n in [97, 98, 99, 100, 101, 1_000, 4_099, 65_536] {
            let expected = reference_primes(n).len() as u64;
            let max_workers = (1..=16)
                .take_while(|&p| partition::check_worker_count(n, p).is_ok())
                .last()
                .unwrap_or(1);
            for workers in 1..=max_workers {
                for (layout, model) in ALL {
                    let out = run(n, workers, layout, model);
                    assert_eq!(
                        out.count, expected,
                        "n={n} workers={workers} {layout:?} {model:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_rounds_equal_seed_count() {
        // Odd seeds <= 100: 3, 5, 7.
        assert_eq!(run(10_000, 4, Layout::OddOnly, Model::Threads).rounds, 24);
        assert_eq!(run(10_000, 4, Layout::OddOnly, Model::Messages).rounds, 24);
        assert_eq!(run(10_000, 4, Layout::Full, Model::Threads).rounds, 25);
        assert_eq!(run(100, 4, Layout::OddOnly, Model::Threads).rounds, 3);
    }

    #[test]
    fn test_invalid_requests() {
        let progress = ProgressBar::hidden();
        assert!(matches!(
            sieve(&SieveRequest::new(0, 1), &progress),
            Err(SieveError::InvalidInput { n: 0 })
        ));
        assert!(matches!(
            sieve(&SieveRequest::new(30, 8), &progress),
            Err(SieveError::Configuration { n: 30, workers: 8 })
        ));
        assert!(matches!(
            sieve(&SieveRequest::new(30, 0), &progress),
            Err(SieveError::Configuration { .. })
        ));
        // No workers is a configuration error even when nothing needs sieving.
        assert!(matches!(
            sieve(&SieveRequest::new(1, 0), &progress),
            Err(SieveError::Configuration { n: 1, workers: 0 })
        ));
    }
}
