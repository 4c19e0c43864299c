//! The tm2 indexer daemon.
//!
//! Reads a TOML configuration file, then backfills and follows a Tendermint2 chain into a SQLite
//! database until interrupted.

mod cli;
mod config;

fn main() {
    use clap::Parser;

    if let Err(err) = cli::Cli::parse().run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
