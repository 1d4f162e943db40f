//! The two post-ingest passes over a fully-loaded catalogue (§4.3):
//! shared-BIOS synthesis, then orphan cleanup. Always run in this order;
//! cleanup depends on the machine/MachineRom edits the BIOS pass makes.

use std::collections::HashMap;

use crate::config::BuildConfig;
use crate::model::{Machine, MachineRom};
use crate::Catalogue;

/// Runs both passes in spec order. Idempotent as a whole: running it twice
/// on an already-processed catalogue is a no-op the second time around.
pub fn run(catalogue: &mut Catalogue, config: &BuildConfig) {
    synthesize_shared_bios(catalogue, config);
    clean_orphans(catalogue);
}

/// A ROM referenced by strictly more than `config.bios_threshold` distinct
/// machines is a shared BIOS ROM. Factors every such ROM out into one
/// synthetic machine, removing the individual `MachineRom` links it replaces.
fn synthesize_shared_bios(catalogue: &mut Catalogue, config: &BuildConfig) {
    if catalogue
        .machine_id_by_name(&config.bios_machine_name)
        .is_some()
    {
        return;
    }

    let mut machines_per_rom: HashMap<u32, std::collections::HashSet<u32>> = HashMap::new();
    for mr in &catalogue.machine_roms {
        machines_per_rom.entry(mr.rom_id).or_default().insert(mr.machine_id);
    }

    let shared: Vec<u32> = machines_per_rom
        .into_iter()
        .filter(|(_, machines)| machines.len() > config.bios_threshold)
        .map(|(rom_id, _)| rom_id)
        .collect();

    if shared.is_empty() {
        return;
    }

    let manufacturer_id = catalogue.intern_manufacturer(&config.bios_manufacturer);
    let description = Some(compress(&config.bios_description));

    let bios_machine_id = catalogue.machines.len() as u32;
    catalogue.machines.push(Machine {
        id: bios_machine_id,
        name: config.bios_machine_name.clone(),
        cloneof_id: None,
        romof_id: None,
        description,
        year: Some(config.bios_year),
        manufacturer_id: Some(manufacturer_id),
    });

    let shared_set: std::collections::HashSet<u32> = shared.iter().copied().collect();
    catalogue
        .machine_roms
        .retain(|mr| !shared_set.contains(&mr.rom_id));

    for rom_id in shared {
        let name_id = catalogue.roms[rom_id as usize].canonical_name_id;
        catalogue.machine_roms.push(MachineRom {
            machine_id: bios_machine_id,
            rom_id,
            name_id,
        });
    }
}

fn compress(text: &str) -> Vec<u8> {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .expect("writing to an in-memory Vec cannot fail");
    encoder.finish().expect("flushing an in-memory Vec cannot fail")
}

/// Deletes machines with no surviving `MachineRom` rows, then RomNames and
/// Manufacturers no longer referenced, then nulls any dangling parent
/// reference. Each step consumes the results of the previous one (§4.3).
fn clean_orphans(catalogue: &mut Catalogue) {
    let live_machine_ids: std::collections::HashSet<u32> = catalogue
        .machine_roms
        .iter()
        .map(|mr| mr.machine_id)
        .collect();
    catalogue.machines.retain(|m| live_machine_ids.contains(&m.id));

    let mut referenced_rom_names: std::collections::HashSet<u32> = catalogue
        .roms
        .iter()
        .map(|r| r.canonical_name_id)
        .collect();
    referenced_rom_names.extend(catalogue.machine_roms.iter().map(|mr| mr.name_id));
    catalogue
        .rom_names
        .retain(|n| referenced_rom_names.contains(&n.id));

    let referenced_manufacturers: std::collections::HashSet<u32> = catalogue
        .machines
        .iter()
        .filter_map(|m| m.manufacturer_id)
        .collect();
    catalogue
        .manufacturers
        .retain(|m| referenced_manufacturers.contains(&m.id));

    let surviving_machine_ids: std::collections::HashSet<u32> =
        catalogue.machines.iter().map(|m| m.id).collect();
    for machine in &mut catalogue.machines {
        if let Some(id) = machine.cloneof_id {
            if !surviving_machine_ids.contains(&id) {
                machine.cloneof_id = None;
            }
        }
        if let Some(id) = machine.romof_id {
            if !surviving_machine_ids.contains(&id) {
                machine.romof_id = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{MachineRecord, RomRecord};

    fn machine(name: &str) -> MachineRecord {
        MachineRecord {
            name: name.to_string(),
            cloneof: None,
            romof: None,
            description: None,
            year: None,
            manufacturer: None,
        }
    }

    fn rom(name: &str, sha1_byte: u8) -> RomRecord {
        RomRecord {
            name: name.to_string(),
            size_pow2: 14,
            sha1: [sha1_byte; 20],
            crc: None,
        }
    }

    #[test]
    fn shared_bios_synthesis_replaces_individual_links() {
        let mut catalogue = Catalogue::new();
        let config = BuildConfig {
            bios_threshold: 2,
            ..Default::default()
        };

        for i in 0..4u8 {
            catalogue.add_machine(machine(&format!("m{i}")), vec![rom("bios.bin", 99)]);
        }
        run(&mut catalogue, &config);

        let bios_id = catalogue.machine_id_by_name(&config.bios_machine_name).unwrap();
        let bios_rom_id = catalogue.roms[0].id;
        let links: Vec<_> = catalogue
            .machine_roms
            .iter()
            .filter(|mr| mr.rom_id == bios_rom_id)
            .collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].machine_id, bios_id);
    }

    #[test]
    fn pass_is_idempotent() {
        let mut catalogue = Catalogue::new();
        let config = BuildConfig {
            bios_threshold: 1,
            ..Default::default()
        };
        for i in 0..3u8 {
            catalogue.add_machine(machine(&format!("m{i}")), vec![rom("bios.bin", 5)]);
        }
        run(&mut catalogue, &config);
        let after_first = catalogue.machines.len();
        run(&mut catalogue, &config);
        assert_eq!(catalogue.machines.len(), after_first);
    }

    #[test]
    fn orphan_cleanup_deletes_machine_with_no_roms() {
        let mut catalogue = Catalogue::new();
        // A machine record added with an empty ROM list directly (bypassing
        // the Ingestor's own empty-ROM-set filter) exercises the cleanup path.
        catalogue.add_machine(machine("has_rom"), vec![rom("x.bin", 1)]);
        let empty_id = catalogue.add_machine(machine("empty"), vec![]).unwrap();
        run(&mut catalogue, &BuildConfig::default());
        assert!(!catalogue.machines.iter().any(|m| m.id == empty_id));
    }

    #[test]
    fn dangling_cloneof_is_nulled() {
        let mut catalogue = Catalogue::new();
        let mut rec = machine("a");
        rec.cloneof = Some("ghost".to_string());
        catalogue.add_machine(rec, vec![rom("a.bin", 1)]);
        catalogue.resolve_parents();
        run(&mut catalogue, &BuildConfig::default());
        let a = catalogue.machine_id_by_name("a").unwrap();
        assert_eq!(catalogue.machines[a as usize].cloneof_id, None);
    }
}
