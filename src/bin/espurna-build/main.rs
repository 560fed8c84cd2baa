//! espurna-build CLI - extra firmware build steps for ESPurna

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("espurna_build=debug")
    } else {
        EnvFilter::new("espurna_build=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(&cli.project, args, cli.verbose),
        Commands::Merge(args) => commands::merge::execute(&cli.project, args).map(|()| 0),
        Commands::Info(args) => commands::info::execute(&cli.project, args).map(|()| 0),
        Commands::Signature(args) => {
            commands::signature::execute(&cli.project, args).map(|()| 0)
        }
        Commands::Completions(args) => commands::completions::execute(args).map(|()| 0),
    }
}
