//! mrdb CLI
//!
//! Command-line interface for the catalogue-to-embedded-blob compiler.

mod cli_types;
mod commands;
mod error;
mod logger;

use std::fs;
use std::sync::Mutex;

use clap::Parser;
use log::LevelFilter;

use cli_types::{Cli, Commands};
use error::CliError;
use logger::CliLogger;

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LevelFilter::Warn
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let logfile = cli.logfile.map(|p| {
        let file = fs::File::create(&p).unwrap_or_else(|e| {
            eprintln!("Error: could not create logfile {}: {}", p.display(), e);
            std::process::exit(1);
        });
        Mutex::new(file)
    });
    CliLogger::install(level, logfile);

    let result = match cli.command {
        Commands::Build {
            dat_dir,
            output,
            sqlite_output,
            no_sqlite,
            bios_threshold,
        } => commands::build::run_build(dat_dir, output, sqlite_output, no_sqlite, bios_threshold),
        Commands::Inspect { blob } => commands::inspect::run_inspect(blob),
        Commands::Verify { blob } => commands::verify::run_verify(blob),
    };

    if let Err(err) = result {
        report_error(&err);
        std::process::exit(1);
    }
}

fn report_error(err: &CliError) {
    log::error!("{err}");
}
