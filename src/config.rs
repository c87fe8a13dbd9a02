use clap::Parser;

use crate::partition::Layout;
use crate::sieve::{Model, SieveRequest};

/// Counts the primes up to N with a block-partitioned, round-synchronized parallel sieve.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The inclusive upper bound N.
    pub n: u64,

    /// Number of workers. N / workers must exceed sqrt(N).
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Print every prime found, tab separated.
    #[arg(short, long)]
    pub print: bool,

    /// Which values each worker stores in its bit vector.
    #[arg(long, value_enum, default_value_t = Layout::OddOnly)]
    pub layout: Layout,

    /// How workers are scheduled and synchronized.
    #[arg(long, value_enum, default_value_t = Model::Threads)]
    pub model: Model,

    /// Directory for summary.json and partitions.csv.
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Draw a progress spinner over the seed rounds.
    #[arg(long)]
    pub progress: bool,
}

impl Config {
    pub fn request(&self) -> SieveRequest {
        SieveRequest::new(self.n, self.workers)
            .layout(self.layout)
            .model(self.model)
    }
}
