mod artifacts;
mod assembler;
mod cache;
mod classify;
mod cli;
mod commands;
mod extra_info;
mod geometry;
mod gnames;
mod http;
mod imaging;
mod lines;
mod model;
mod ocr;
mod reclassify;
mod scan;
mod util;
mod verification;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::ProcessSpecies(args) => commands::process_species::run(args, cli.debug),
        Commands::ProcessText(args) => commands::process_text::run(args),
        Commands::VerifySpecies(args) => commands::verify_species::run(args),
        Commands::SpeciesExtra(args) => commands::species_extra::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::FindNames(args) => commands::find_names::run(args),
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
