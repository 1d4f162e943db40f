use std::path::PathBuf;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use mrdb_core::BlobReader;

use crate::error::CliError;

pub(crate) fn run_inspect(blob_path: PathBuf) -> Result<(), CliError> {
    let data = std::fs::read(&blob_path)?;
    let reader = BlobReader::new(&data)?;

    println!(
        "{} {}",
        "blob:".if_supports_color(Stdout, |t| t.bold()),
        blob_path.display(),
    );
    println!("  size_pow2 range : [{}, {}]", reader.min_size_pow2(), reader.max_size_pow2());
    println!("  roms            : {}", reader.roms_count());
    println!("  machines        : {}", reader.machines_count());
    println!("  machine_roms    : {}", reader.machine_roms_count());
    println!("  manufacturers   : {}", reader.manufacturers_count());
    println!("  rom_names       : {}", reader.rom_names_count());

    Ok(())
}
