//! Command-line interface parsing for coinwatch
//!
//! This module handles parsing of CLI arguments using clap, including the
//! --search flag for one-shot coin lookup and --watch for a continuously
//! refreshing dashboard.

use clap::Parser;

/// coinwatch - Track cryptocurrency prices from the terminal
#[derive(Parser, Debug)]
#[command(name = "coinwatch")]
#[command(about = "Cryptocurrency prices with caching and offline fallbacks")]
#[command(version)]
pub struct Cli {
    /// Search for a coin by name or symbol instead of showing the watch list
    ///
    /// Examples:
    ///   coinwatch --search bitcoin
    ///   coinwatch --search doge
    ///
    /// Terms shorter than 2 characters are rejected.
    #[arg(long, value_name = "TERM")]
    pub search: Option<String>,

    /// Keep running and refresh the watch list automatically every 5 minutes
    #[arg(long)]
    pub watch: bool,
}

/// What the application should do this run, derived from CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Show the watch list once, or keep refreshing it
    Snapshot { watch: bool },
    /// Look up coins matching a term and exit
    Search { term: String },
}

impl Mode {
    /// Derives the run mode from parsed CLI arguments. --search wins over
    /// --watch when both are given.
    pub fn from_cli(cli: &Cli) -> Self {
        match &cli.search {
            Some(term) => Mode::Search { term: term.clone() },
            None => Mode::Snapshot { watch: cli.watch },
        }
    }
}
