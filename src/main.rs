//! Vending Machine CLI
//!
//! Runs a CSV command script against a fresh machine and prints the final
//! catalog and till.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- script.csv > state.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `info` to see each row's outcome, `debug` for every
//!   inventory mutation

use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use vending_machine::{Result, ScriptRunner, VendError};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(VendError::MissingArgument);
    }

    let input_path = &args[1];
    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let mut runner = ScriptRunner::new();
    runner.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    runner.write_output(handle)?;

    Ok(())
}
