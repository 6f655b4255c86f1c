//! pitrestore CLI entry point
//!
//! This is a minimal entrypoint that:
//! 1. Dispatches to CLI commands (via cli::run)
//! 2. Reports a failure as a JSON error on stdout
//! 3. Exits with the failure's status code
//!
//! All logic is delegated to the CLI module.

use pitrestore::cli;

fn main() {
    if let Err(e) = cli::run() {
        let _ = cli::write_error(e.code_str(), e.message());
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
