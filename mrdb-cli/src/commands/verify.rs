use std::path::PathBuf;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use mrdb_core::BlobReader;

use crate::error::CliError;

/// Re-checks the §8 quantified invariants against an existing blob.
pub(crate) fn run_verify(blob_path: PathBuf) -> Result<(), CliError> {
    let data = std::fs::read(&blob_path)?;
    let reader = BlobReader::new(&data)?;

    check_rom_tables_sorted(&reader)?;
    check_machine_roms_sorted(&reader)?;
    check_references_in_range(&reader)?;

    println!(
        "{} blob passes all invariant checks",
        "\u{2713}".if_supports_color(Stdout, |t| t.green()),
    );
    Ok(())
}

fn check_rom_tables_sorted(reader: &BlobReader<'_>) -> Result<(), CliError> {
    for size_pow2 in reader.min_size_pow2()..=reader.max_size_pow2() {
        let (start, end) = reader.size_class_bounds(size_pow2)?;
        let mut prev: Option<[u8; 20]> = None;
        for i in start..end {
            let sha1 = reader.rom_sha1_at(i);
            if let Some(p) = prev {
                if sha1 <= p {
                    return Err(CliError::verify(format!(
                        "ROM table for size class {size_pow2} is not strictly ascending by SHA-1 at index {i}"
                    )));
                }
            }
            prev = Some(sha1);
        }
    }
    Ok(())
}

fn check_machine_roms_sorted(reader: &BlobReader<'_>) -> Result<(), CliError> {
    let mut prev: Option<(u32, u32)> = None;
    for i in 0..reader.machine_roms_count() {
        let (machine_id, rom_id, _name_id) = reader.machine_rom_at(i);
        let key = (rom_id, machine_id);
        if let Some(p) = prev {
            if key < p {
                return Err(CliError::verify(format!(
                    "MachineRoms table is not ascending by (rom_id, machine_id) at index {i}"
                )));
            }
        }
        if machine_id >= reader.machines_count() {
            return Err(CliError::verify(format!(
                "MachineRoms row {i} references machine {machine_id}, but only {} machines exist",
                reader.machines_count()
            )));
        }
        prev = Some(key);
    }
    Ok(())
}

fn check_references_in_range(reader: &BlobReader<'_>) -> Result<(), CliError> {
    for machine_id in 0..reader.machines_count() {
        if let Some(id) = reader.machine_cloneof_id(machine_id) {
            if id >= reader.machines_count() {
                return Err(CliError::verify(format!(
                    "machine {machine_id} has out-of-range cloneof_id {id}"
                )));
            }
        }
        if let Some(id) = reader.machine_romof_id(machine_id) {
            if id >= reader.machines_count() {
                return Err(CliError::verify(format!(
                    "machine {machine_id} has out-of-range romof_id {id}"
                )));
            }
        }
        if let Some(id) = reader.machine_manufacturer_id(machine_id) {
            if id as u32 >= reader.manufacturers_count() {
                return Err(CliError::verify(format!(
                    "machine {machine_id} has out-of-range manufacturer_id {id}"
                )));
            }
        }
    }
    Ok(())
}
