use crate::reduce::SieveOutput;
use csv::Writer;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub fn write_results(output: &SieveOutput, output_dir: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(output_dir)?;

    write_summary(output, output_dir)?;
    write_partitions(output, output_dir)?;

    Ok(())
}

fn write_summary(output: &SieveOutput, output_dir: &str) -> Result<(), Box<dyn Error>> {
    let path = Path::new(output_dir).join("summary.json");
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &output.summary())?;
    Ok(())
}

#[derive(Serialize)]
struct PartitionRecord {
    worker_id: usize,
    lower_bound: u64,
    upper_bound: u64,
    local_length: usize,
    storage_bytes: usize,
    survivors: u64,
}

fn write_partitions(output: &SieveOutput, output_dir: &str) -> Result<(), Box<dyn Error>> {
    let path = Path::new(output_dir).join("partitions.csv");
    let mut wtr = Writer::from_path(path)?;

    for segment in &output.segments {
        let p = &segment.partition;
        wtr.serialize(PartitionRecord {
            worker_id: p.worker_id,
            lower_bound: p.lower_bound,
            upper_bound: p.upper_bound,
            local_length: p.local_length,
            storage_bytes: segment.bits.storage_bytes(),
            survivors: segment.survivors,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes every prime tab separated, followed by a newline.
pub fn print_primes<W: Write>(output: &SieveOutput, out: W) -> io::Result<()> {
    let mut out = BufWriter::new(out);
    for prime in output.primes() {
        write!(out, "{prime}\t")?;
    }
    writeln!(out)?;
    out.flush()
}
