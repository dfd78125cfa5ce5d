use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

mod cli;
mod logger;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "ilsimvm", about = "Instruction List PLC scan-cycle engine")]
struct Args {
    /// Turn on verbose logging. Repeat to increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Sets the logging to write to a file.
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Selects the subcommand.
    #[command(subcommand)]
    action: Action,
}

#[derive(clap::Subcommand, Debug)]
enum Action {
    /// Loads an Instruction List program and runs scan cycles.
    Run {
        /// Path to the program text.
        file: PathBuf,

        /// Run N scan cycles then stop (default: continuous until Ctrl+C).
        #[arg(long)]
        scans: Option<u64>,

        /// Target scan period in milliseconds.
        #[arg(long, default_value_t = 100)]
        period_ms: u64,

        /// Sets an input before the first scan, for example `I0.0=1`. May be repeated.
        #[arg(long = "input", value_name = "ID=LEVEL", value_parser = cli::parse_input)]
        inputs: Vec<(String, bool)>,

        /// Write the inputs, outputs and memory entries to the specified file after execution.
        #[arg(long)]
        dump_vars: Option<PathBuf>,
    },
    /// Parses a program and reports the number of instructions.
    Check {
        /// Path to the program text.
        file: PathBuf,
    },
    /// Benchmarks a program by running it many times and reporting timing statistics.
    Benchmark {
        /// Path to the program text.
        file: PathBuf,

        /// Number of measured scan cycles (default: 10000).
        #[arg(long, default_value_t = 10000)]
        cycles: u64,

        /// Number of warmup scan cycles before measurement (default: 1000).
        #[arg(long, default_value_t = 1000)]
        warmup: u64,
    },
    /// Prints the version number of the engine.
    Version,
}

pub fn main() -> Result<(), String> {
    let args = Args::parse();

    logger::configure(args.verbose, args.log_file)?;

    match args.action {
        Action::Run {
            file,
            scans,
            period_ms,
            inputs,
            dump_vars,
        } => cli::run(
            &file,
            scans,
            Duration::from_millis(period_ms),
            &inputs,
            dump_vars.as_deref(),
        ),
        Action::Check { file } => cli::check(&file),
        Action::Benchmark {
            file,
            cycles,
            warmup,
        } => cli::benchmark(&file, cycles, warmup),
        Action::Version => {
            println!("ilsimvm version {VERSION}");
            Ok(())
        }
    }
}
