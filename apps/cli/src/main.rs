//! insertster CLI: place query sequences onto a reference phylogeny.
//!
//! Reads a Newick tree and aligner/search results, grafts each query next
//! to its best-supported node and writes the placements, the grown tree
//! and a run manifest.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
