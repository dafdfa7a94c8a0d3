use clap::{Parser, Subcommand};

use crate::cmd::*;

mod args;

/// The CLI interface for the prefetch application.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    /// The selected command.
    #[clap(subcommand)]
    pub command: PrefetchCommand,

    #[clap(flatten)]
    pub verbosity: args::Verbosity,
}

/// The top-level commands supported by prefetch.
#[derive(Debug, Subcommand)]
pub enum PrefetchCommand {
    Hash(hash::Hash),
    Scan(scan::Scan),
}

impl Command for PrefetchCommand {
    fn handle(self) -> eyre::Result<()> {
        match self {
            Self::Hash(hash) => hash.handle(),
            Self::Scan(scan) => scan.handle(),
        }
    }
}
