//! Lockstep seed rounds shared by every worker.
//!
//! Each worker walks `Seeding -> Marking -> Advancing -> ... -> Done`. All
//! workers mark with the same seed in the same round; only the designated
//! worker picks the next one, and only after everyone finished marking. Two
//! transports implement the exchange: a barrier plus single-writer cell for
//! pooled threads, and command/report channels for workers that share nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Barrier;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use indicatif::ProgressBar;
use log::{debug, trace};

use crate::bitvector::BitVector;
use crate::error::SieveError;
use crate::marker;
use crate::partition::Partition;
use crate::reduce::Segment;
use crate::seeds;

/// Worker that discovers and publishes seeds.
pub const DESIGNATED: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Seeding,
    Marking(u64),
    Advancing(u64),
    Done,
}

/// Where the designated worker takes its seeds from.
#[derive(Debug)]
pub enum SeedSource {
    /// Single pass: start at the layout's first seed, then scan the worker's
    /// own vector for the next unmarked value.
    Scan,
    /// A precomputed ascending sequence from the sequential seed sieve.
    Listed(std::vec::IntoIter<u64>),
}

impl SeedSource {
    fn first(&mut self, partition: &Partition) -> Option<u64> {
        match self {
            SeedSource::Scan => Some(partition.layout.first_seed()),
            SeedSource::Listed(seeds) => seeds.next(),
        }
    }

    fn after(&mut self, seed: u64, partition: &Partition, local: &BitVector) -> Option<u64> {
        match self {
            SeedSource::Scan => {
                if !partition.contains(seed) {
                    return None;
                }
                local
                    .next_clear_after(partition.index_of(seed))
                    .map(|index| partition.value_at(index))
            }
            SeedSource::Listed(seeds) => seeds.next(),
        }
    }
}

/// One worker's view of the per-round synchronization.
pub trait SeedExchange {
    /// Blocks until every worker reached this point, then returns the seed for
    /// the next round (`None` once sieving is over).
    ///
    /// `next` runs on the designated worker only, after all workers arrived.
    /// If any worker arrives unhealthy, every worker gets [`SieveError::Aborted`].
    fn exchange(
        &self,
        healthy: bool,
        next: &mut dyn FnMut() -> Option<u64>,
    ) -> Result<Option<u64>, SieveError>;
}

/// What a worker hands back after the terminal round.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub segment: Segment,
    pub rounds: u64,
}

/// Runs one worker through every round.
///
/// `source` is `Some` on the designated worker only.
pub fn run_worker<E: SeedExchange>(
    partition: Partition,
    exchange: E,
    mut source: Option<SeedSource>,
    progress: &ProgressBar,
) -> Result<WorkerOutcome, SieveError> {
    let n = partition.domain_size;
    let worker_id = partition.worker_id;
    debug!(
        "worker {worker_id}/{}: [{}, {}], {} bits",
        partition.worker_count, partition.lower_bound, partition.upper_bound, partition.local_length
    );

    let within_bound = move |seed: u64| seed.checked_mul(seed).is_some_and(|sq| sq <= n);

    let mut local = BitVector::default();
    let mut rounds = 0u64;
    let mut phase = Phase::Seeding;

    loop {
        phase = match phase {
            Phase::Seeding => {
                let allocated = BitVector::new(partition.local_length);
                let first = exchange.exchange(allocated.is_ok(), &mut || {
                    source
                        .as_mut()
                        .and_then(|s| s.first(&partition))
                        .filter(|&k| within_bound(k))
                });
                // A worker's own allocation failure outranks the abort it caused.
                local = allocated?;
                match first? {
                    Some(k) => Phase::Marking(k),
                    None => Phase::Done,
                }
            }
            Phase::Marking(seed) => {
                let marked = marker::mark(&mut local, &partition, seed);
                trace!("worker {worker_id}: seed {seed} marked {marked}");
                Phase::Advancing(seed)
            }
            Phase::Advancing(seed) => {
                rounds += 1;
                if source.is_some() {
                    progress.inc(1);
                    progress.set_message(format!("seed {seed}"));
                }
                let next = exchange.exchange(true, &mut || {
                    source
                        .as_mut()
                        .and_then(|s| s.after(seed, &partition, &local))
                        .filter(|&k| within_bound(k))
                })?;
                match next {
                    Some(k) => Phase::Marking(k),
                    None => Phase::Done,
                }
            }
            Phase::Done => break,
        };
    }

    let survivors = local.count_clear();
    debug!("worker {worker_id}: {survivors} survivors after {rounds} rounds");
    Ok(WorkerOutcome {
        segment: Segment {
            partition,
            bits: local,
            survivors,
        },
        rounds,
    })
}

/// Single-writer seed cell; `0` encodes "no further seed".
#[derive(Debug, Default)]
pub struct SeedCell(AtomicU64);

impl SeedCell {
    pub fn publish(&self, seed: Option<u64>) {
        self.0.store(seed.unwrap_or(0), Ordering::Release);
    }

    pub fn current(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            k => Some(k),
        }
    }
}

/// Shared-memory transport: a barrier orders every read of the seed cell
/// after the designated worker's write.
#[derive(Debug)]
pub struct SharedRounds {
    barrier: Barrier,
    seed: SeedCell,
    healthy: AtomicBool,
}

impl SharedRounds {
    pub fn new(workers: usize) -> Self {
        Self {
            barrier: Barrier::new(workers),
            seed: SeedCell::default(),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn endpoint(&self, worker_id: usize) -> SharedEndpoint<'_> {
        SharedEndpoint {
            rounds: self,
            worker_id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SharedEndpoint<'a> {
    rounds: &'a SharedRounds,
    worker_id: usize,
}

impl SeedExchange for SharedEndpoint<'_> {
    fn exchange(
        &self,
        healthy: bool,
        next: &mut dyn FnMut() -> Option<u64>,
    ) -> Result<Option<u64>, SieveError> {
        let rounds = self.rounds;
        if !healthy {
            rounds.healthy.store(false, Ordering::Release);
        }
        // Everyone finished the previous phase.
        rounds.barrier.wait();
        if !rounds.healthy.load(Ordering::Acquire) {
            return Err(SieveError::Aborted);
        }
        if self.worker_id == DESIGNATED {
            rounds.seed.publish(next());
        }
        // Everyone can observe the new seed.
        rounds.barrier.wait();
        Ok(rounds.seed.current())
    }
}

/// Root-to-peer message; the seed is the only payload that crosses workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Seed(u64),
    Stop,
    Abort,
}

/// Peer-to-root acknowledgement that a phase is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub healthy: bool,
}

/// Message-passing transport endpoint.
#[derive(Debug)]
pub enum ChannelEndpoint {
    Root {
        peers: Vec<(usize, Sender<Command>, Receiver<Report>)>,
    },
    Peer {
        commands: Receiver<Command>,
        reports: Sender<Report>,
    },
}

/// One endpoint per worker, indexed by worker id; the designated worker is the root.
pub fn channel_endpoints(workers: usize) -> Vec<ChannelEndpoint> {
    let mut peers = Vec::with_capacity(workers.saturating_sub(1));
    let mut endpoints = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        if worker_id == DESIGNATED {
            continue;
        }
        let (command_tx, command_rx) = crossbeam_channel::bounded(1);
        let (report_tx, report_rx) = crossbeam_channel::bounded(1);
        peers.push((worker_id, command_tx, report_rx));
        endpoints.push(ChannelEndpoint::Peer {
            commands: command_rx,
            reports: report_tx,
        });
    }
    endpoints.insert(DESIGNATED, ChannelEndpoint::Root { peers });
    endpoints
}

impl ChannelEndpoint {
    fn broadcast(
        peers: &[(usize, Sender<Command>, Receiver<Report>)],
        command: Command,
    ) -> Result<(), SieveError> {
        for (worker_id, commands, _) in peers {
            commands
                .send(command)
                .map_err(|_| SieveError::WorkerFailed {
                    worker_id: *worker_id,
                })?;
        }
        Ok(())
    }
}

impl SeedExchange for ChannelEndpoint {
    fn exchange(
        &self,
        healthy: bool,
        next: &mut dyn FnMut() -> Option<u64>,
    ) -> Result<Option<u64>, SieveError> {
        match self {
            ChannelEndpoint::Root { peers } => {
                let mut all_healthy = healthy;
                for (worker_id, _, reports) in peers {
                    let report = reports.recv().map_err(|_| SieveError::WorkerFailed {
                        worker_id: *worker_id,
                    })?;
                    all_healthy &= report.healthy;
                }
                if !all_healthy {
                    Self::broadcast(peers, Command::Abort)?;
                    return Err(SieveError::Aborted);
                }
                let seed = next();
                Self::broadcast(peers, seed.map_or(Command::Stop, Command::Seed))?;
                Ok(seed)
            }
            ChannelEndpoint::Peer { commands, reports } => {
                let root_gone = || SieveError::WorkerFailed {
                    worker_id: DESIGNATED,
                };
                reports.send(Report { healthy }).map_err(|_| root_gone())?;
                match commands.recv() {
                    Ok(Command::Seed(k)) => Ok(Some(k)),
                    Ok(Command::Stop) => Ok(None),
                    Ok(Command::Abort) => Err(SieveError::Aborted),
                    Err(_) => Err(root_gone()),
                }
            }
        }
    }
}

/// Runs every partition on a dedicated pool of exactly `partitions.len()`
/// threads, one worker per thread.
pub fn run_pooled(
    partitions: &[Partition],
    progress: &ProgressBar,
) -> Result<Vec<WorkerOutcome>, SieveError> {
    let workers = partitions.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("sieve-worker-{i}"))
        .build()?;
    let rounds = SharedRounds::new(workers);

    let results = pool.broadcast(|ctx| {
        let worker_id = ctx.index();
        let source = (worker_id == DESIGNATED).then_some(SeedSource::Scan);
        run_worker(partitions[worker_id], rounds.endpoint(worker_id), source, progress)
    });
    collect_outcomes(results)
}

/// Runs every partition on its own scoped thread; seeds are computed up front
/// and broadcast by the root worker.
pub fn run_messaging(
    partitions: &[Partition],
    progress: &ProgressBar,
) -> Result<Vec<WorkerOutcome>, SieveError> {
    let Some(first) = partitions.first() else {
        return Ok(Vec::new());
    };
    let n = first.domain_size;
    let layout = first.layout;

    // The one sequential step: seeds exist before any worker starts marking.
    let seeds: Vec<u64> = seeds::seeds_up_to(n.isqrt())?
        .into_iter()
        .filter(|&s| s >= layout.first_seed())
        .collect();
    progress.set_length(seeds.len() as u64);
    debug!("root will broadcast {} seeds", seeds.len());
    let mut seeds = Some(seeds);

    let results = thread::scope(|scope| -> Result<Vec<_>, SieveError> {
        let mut handles = Vec::with_capacity(partitions.len());
        let endpoints = channel_endpoints(partitions.len());
        for (endpoint, &partition) in endpoints.into_iter().zip(partitions) {
            let worker_id = partition.worker_id;
            let source = if worker_id == DESIGNATED {
                seeds.take().map(|s| SeedSource::Listed(s.into_iter()))
            } else {
                None
            };
            let handle = thread::Builder::new()
                .name(format!("sieve-worker-{worker_id}"))
                .spawn_scoped(scope, move || run_worker(partition, endpoint, source, progress))
                .map_err(|e| SieveError::ThreadPool(e.to_string()))?;
            handles.push((worker_id, handle));
        }
        Ok(handles
            .into_iter()
            .map(|(worker_id, handle)| {
                handle
                    .join()
                    .unwrap_or(Err(SieveError::WorkerFailed { worker_id }))
            })
            .collect())
    })?;
    collect_outcomes(results)
}

/// Keeps every outcome in worker order, or reports the most telling failure.
///
/// A worker's own error beats "a peer hung up", which beats "aborted".
fn collect_outcomes(
    results: Vec<Result<WorkerOutcome, SieveError>>,
) -> Result<Vec<WorkerOutcome>, SieveError> {
    let mut outcomes = Vec::with_capacity(results.len());
    let mut failure: Option<SieveError> = None;
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                let rank = |e: &SieveError| match e {
                    SieveError::Aborted => 0,
                    SieveError::WorkerFailed { .. } => 1,
                    _ => 2,
                };
                if failure.as_ref().is_none_or(|f| rank(&err) > rank(f)) {
                    failure = Some(err);
                }
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(outcomes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, Layout};

    fn partitions(n: u64, workers: usize, layout: Layout) -> Vec<Partition> {
        (0..workers).map(|i| partition(i, workers, n, layout)).collect()
    }

    fn survivors(outcomes: &[WorkerOutcome]) -> u64 {
        outcomes.iter().map(|o| o.segment.survivors).sum()
    }

    #[test]
    fn test_seed_cell() {
        let cell = SeedCell::default();
        assert_eq!(cell.current(), None);
        cell.publish(Some(7));
        assert_eq!(cell.current(), Some(7));
        cell.publish(None);
        assert_eq!(cell.current(), None);
    }

    #[test]
    fn test_channel_endpoints_put_root_first() {
        let endpoints = channel_endpoints(3);
        assert_eq!(endpoints.len(), 3);
        assert!(matches!(&endpoints[0], ChannelEndpoint::Root { peers } if peers.len() == 2));
        assert!(matches!(endpoints[1], ChannelEndpoint::Peer { .. }));
    }

    #[test]
    fn test_pooled_rounds_follow_seeds() {
        let parts = partitions(100, 4, Layout::OddOnly);
        let outcomes = run_pooled(&parts, &ProgressBar::hidden()).unwrap();
        assert_eq!(outcomes.len(), 4);
        // Seeds 3, 5 and 7, identical on every worker.
        assert!(outcomes.iter().all(|o| o.rounds == 3));
        assert_eq!(survivors(&outcomes), 24);
    }

    #[test]
    fn test_messaging_matches_pooled() {
        for layout in [Layout::OddOnly, Layout::Full] {
            let parts = partitions(10_000, 7, layout);
            let pooled = run_pooled(&parts, &ProgressBar::hidden()).unwrap();
            let messaging = run_messaging(&parts, &ProgressBar::hidden()).unwrap();
            assert_eq!(survivors(&pooled), survivors(&messaging));
            assert_eq!(pooled[0].rounds, messaging[0].rounds);
            for (a, b) in pooled.iter().zip(&messaging) {
                assert_eq!(a.segment.bits, b.segment.bits);
            }
        }
    }

    #[test]
    fn test_full_layout_starts_at_two() {
        let parts = partitions(100, 2, Layout::Full);
        let outcomes = run_pooled(&parts, &ProgressBar::hidden()).unwrap();
        assert!(outcomes.iter().all(|o| o.rounds == 4));
        assert_eq!(survivors(&outcomes), 25);
    }

    #[test]
    fn test_no_rounds_when_first_seed_is_too_large() {
        let parts = partitions(3, 1, Layout::OddOnly);
        let outcomes = run_messaging(&parts, &ProgressBar::hidden()).unwrap();
        assert_eq!(outcomes[0].rounds, 0);
        assert_eq!(outcomes[0].segment.survivors, 1);
    }

    #[test]
    fn test_unhealthy_worker_aborts_everyone() {
        let rounds = SharedRounds::new(2);
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|id| {
                    let endpoint = rounds.endpoint(id);
                    scope.spawn(move || endpoint.exchange(id != 1, &mut || Some(3)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|r| matches!(r, Err(SieveError::Aborted))));
    }

    #[test]
    fn test_unhealthy_peer_aborts_root() {
        let mut endpoints = channel_endpoints(2);
        let peer = endpoints.pop().unwrap();
        let root = endpoints.pop().unwrap();
        let peer_result = thread::scope(|scope| {
            let handle = scope.spawn(move || peer.exchange(false, &mut || None));
            let root_result = root.exchange(true, &mut || Some(3));
            assert!(matches!(root_result, Err(SieveError::Aborted)));
            handle.join().unwrap()
        });
        assert!(matches!(peer_result, Err(SieveError::Aborted)));
    }

    #[test]
    fn test_allocation_failure_surfaces_from_both_models() {
        let mut parts = partitions(10_000, 3, Layout::OddOnly);
        parts[2].local_length = usize::MAX;
        assert!(matches!(
            run_pooled(&parts, &ProgressBar::hidden()),
            Err(SieveError::Allocation { bits: usize::MAX })
        ));
        assert!(matches!(
            run_messaging(&parts, &ProgressBar::hidden()),
            Err(SieveError::Allocation { bits: usize::MAX })
        ));

        // Failing root: the peers are told to abort before any round.
        let mut parts = partitions(10_000, 3, Layout::Full);
        parts[0].local_length = usize::MAX;
        assert!(matches!(
            run_messaging(&parts, &ProgressBar::hidden()),
            Err(SieveError::Allocation { .. })
        ));
        assert!(matches!(
            run_pooled(&parts, &ProgressBar::hidden()),
            Err(SieveError::Allocation { .. })
        ));
    }

    #[test]
    fn test_collect_prefers_root_cause() {
        let results = vec![
            Err(SieveError::Aborted),
            Err(SieveError::Allocation { bits: 64 }),
            Err(SieveError::WorkerFailed { worker_id: 0 }),
        ];
        assert!(matches!(
            collect_outcomes(results),
            Err(SieveError::Allocation { bits: 64 })
        ));
    }
}
