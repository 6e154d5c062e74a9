//! dupefiles - indexed duplicate file finder
//!
//! Entry point for the dupefiles CLI application.

use clap::Parser;
use dupefiles::{cli::Cli, error::ExitCode};

fn main() {
    let cli = Cli::parse();

    match dupefiles::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = ExitCode::for_error(&err);
            eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            std::process::exit(exit_code.as_i32());
        }
    }
}
