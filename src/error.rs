use std::error::Error;
use std::fmt;

/// Recoverable failure of a single [`BitVector`](crate::bitvector::BitVector) access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitError {
    /// The index is not below the vector's logical length.
    OutOfRange { index: usize, len: usize },
    /// A bit can only be set to 0 or 1.
    InvalidValue(u8),
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitError::OutOfRange { index, len } => {
                write!(f, "bit index {index} is out of range for a vector of {len} bits")
            }
            BitError::InvalidValue(value) => {
                write!(f, "unsupported bit value {value} (expected 0 or 1)")
            }
        }
    }
}

impl Error for BitError {}

/// Errors surfaced by the sieve core.
///
/// Everything except `Bit` is fatal for the run: no partial count is
/// reported and nothing is retried.
#[derive(Debug)]
pub enum SieveError {
    /// The bound is below 1.
    InvalidInput { n: u64 },
    /// Too many workers for the bound: the first block would not hold every seed.
    Configuration { n: u64, workers: usize },
    /// Backing storage for a bit vector could not be reserved.
    Allocation { bits: usize },
    Bit(BitError),
    /// The worker pool could not be started.
    ThreadPool(String),
    /// A worker panicked or hung up mid-run.
    WorkerFailed { worker_id: usize },
    /// This worker stopped because a peer failed.
    Aborted,
}

impl fmt::Display for SieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SieveError::InvalidInput { n } => write!(
                f,
                "the number that was provided is too small, please provide an n > 0 (got {n})"
            ),
            SieveError::Configuration { workers: 0, .. } => {
                write!(f, "at least one worker is required")
            }
            SieveError::Configuration { n, workers } => write!(
                f,
                "there are too many workers: {workers} workers need n / workers > sqrt(n) (n = {n})"
            ),
            SieveError::Allocation { bits } => {
                write!(f, "could not allocate memory for {bits} bits")
            }
            SieveError::Bit(err) => err.fmt(f),
            SieveError::ThreadPool(msg) => write!(f, "could not start the worker pool: {msg}"),
            SieveError::WorkerFailed { worker_id } => {
                write!(f, "worker {worker_id} failed, the computation was aborted")
            }
            SieveError::Aborted => write!(f, "the computation was aborted by a failing worker"),
        }
    }
}

impl SieveError {
    /// Process exit status for this error: 2 when memory ran out, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            SieveError::Allocation { .. } => 2,
            _ => 1,
        }
    }
}

impl Error for SieveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SieveError::Bit(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BitError> for SieveError {
    fn from(err: BitError) -> Self {
        SieveError::Bit(err)
    }
}

impl From<rayon::ThreadPoolBuildError> for SieveError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        SieveError::ThreadPool(err.to_string())
    }
}
