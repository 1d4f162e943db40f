use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use mrdb_core::ingest::IngestBounds;
use mrdb_core::{BuildConfig, Catalogue, DatSource, FilesystemDatSource};

use crate::error::CliError;

pub(crate) fn run_build(
    dat_dir: PathBuf,
    output: PathBuf,
    sqlite_output: Option<PathBuf>,
    no_sqlite: bool,
    bios_threshold: usize,
) -> Result<(), CliError> {
    let config = BuildConfig {
        bios_threshold,
        ..Default::default()
    };

    let source = FilesystemDatSource::new(&dat_dir);
    let documents = source.documents().map_err(mrdb_core::BuildError::Ingest)?;

    let progress = ProgressBar::new(documents.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("  ingesting [{bar:30.cyan}] {pos}/{len} {msg}")
            .expect("static pattern")
            .progress_chars("=> "),
    );

    let bounds = IngestBounds {
        min_rom_size: config.min_rom_size,
        max_rom_size: config.max_rom_size,
    };
    let mut catalogue = Catalogue::new();
    for doc in documents {
        progress.set_message(doc.name.clone());
        mrdb_core::ingest::ingest_document(doc.reader, bounds, |machine, roms| {
            catalogue.add_machine(machine, roms);
        })
        .map_err(mrdb_core::BuildError::Ingest)?;
        progress.inc(1);
    }
    progress.finish_and_clear();
    catalogue.resolve_parents();

    mrdb_core::postprocess::run(&mut catalogue, &config);
    let remapped = mrdb_core::remap::remap(&catalogue, &config)?;

    log::info!(
        "  {} machines: {}  roms: {}  manufacturers: {}",
        "\u{2022}".if_supports_color(Stdout, |t| t.dimmed()),
        remapped.machines.len(),
        remapped.roms.len(),
        remapped.manufacturers.len(),
    );

    let mut out = std::fs::File::create(&output)?;
    mrdb_core::blob::write_blob(&mut out, &remapped, &config)?;
    log::info!(
        "{} wrote blob to {}",
        "\u{2713}".if_supports_color(Stdout, |t| t.green()),
        output.display(),
    );

    if !no_sqlite {
        let sqlite_path = sqlite_output.unwrap_or_else(|| sqlite_path_for(&output));
        mrdb_core::sqlite_export::export(&sqlite_path, &remapped)?;
        log::info!(
            "{} wrote SQLite export to {}",
            "\u{2713}".if_supports_color(Stdout, |t| t.green()),
            sqlite_path.display(),
        );
    }

    Ok(())
}

fn sqlite_path_for(output: &Path) -> PathBuf {
    output.with_extension("sqlite3")
}
