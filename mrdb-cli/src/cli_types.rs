//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mrdb")]
#[command(about = "Compile arcade ROM DAT catalogues into an embeddable binary blob", long_about = None)]
pub(crate) struct Cli {
    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write log output to a file (ANSI codes stripped)
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the full pipeline and write the binary blob (and, unless
    /// `--no-sqlite` is passed, the supplemental SQLite export)
    Build {
        /// Directory containing the source `*.xml`/`*.dat` DAT documents
        #[arg(long)]
        dat_dir: PathBuf,

        /// Path to write the binary blob to
        #[arg(short, long, default_value = "mrdb.bin")]
        output: PathBuf,

        /// Path to write the SQLite export to; defaults to `output` with a
        /// `.sqlite3` extension
        #[arg(long)]
        sqlite_output: Option<PathBuf>,

        /// Skip the SQLite export; the blob is always produced
        #[arg(long)]
        no_sqlite: bool,

        /// A ROM referenced by more than this many machines is factored out
        /// into a synthetic shared-BIOS machine
        #[arg(long, default_value_t = 4000)]
        bios_threshold: usize,
    },

    /// Print header fields and per-section counts from an existing blob
    Inspect {
        /// Path to a previously built blob
        blob: PathBuf,
    },

    /// Re-check the quantified invariants against an existing blob
    Verify {
        /// Path to a previously built blob
        blob: PathBuf,
    },
}
