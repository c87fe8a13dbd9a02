mod bitvector;
mod config;
mod error;
mod marker;
mod output;
mod partition;
mod reduce;
mod rounds;
mod seeds;
mod sieve;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::parse();
    let request = config.request();

    // --- Config Validation ---
    if let Err(err) = request.validate() {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }

    println!("N: {}", request.n);
    println!("Workers: {}", request.workers);
    println!("Layout: {:?}, Model: {:?}", request.layout, request.model);

    let bar = if config.progress {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] round {pos} {msg}")?,
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let output = match sieve::sieve(&request, &bar) {
        Ok(output) => output,
        Err(err) => {
            bar.abandon();
            eprintln!("Error: {err}");
            std::process::exit(err.exit_code());
        }
    };
    bar.finish_with_message("Sieving complete.");

    if config.print {
        output::print_primes(&output, std::io::stdout().lock())?;
    }

    if let Some(output_dir) = &config.output_dir {
        println!("Writing results...");
        output::write_results(&output, output_dir)?;
        println!("Results written to {output_dir}");
    }

    println!("Found {} prime numbers.", output.count);

    Ok(())
}
