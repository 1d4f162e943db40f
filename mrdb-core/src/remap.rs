//! Produces the dense, packed id space the binary blob is built from (§4.4).
//! Input is a cleaned catalogue (post-`PostProcessor`); output is a new,
//! isomorphic catalogue with compact ids and the size-class index the
//! `BlobWriter` needs.

use std::collections::HashMap;

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::model::{Machine, MachineRom, Manufacturer, Rom, RomName, NULL_ID_16, NULL_ID_24};
use crate::Catalogue;

/// `(start_index, end_index)` record-index bounds per `size_pow2` class into
/// the flat ROMs table, covering exactly `[min_size_pow2, max_size_pow2]`.
/// `write_blob` converts these to the byte offsets the blob format stores.
#[derive(Debug, Clone)]
pub struct SizeIndex {
    pub min_size_pow2: u8,
    pub max_size_pow2: u8,
    /// Indexed by `size_pow2 - min_size_pow2`.
    pub classes: Vec<(u32, u32)>,
}

impl SizeIndex {
    pub fn class_for(&self, size_pow2: u8) -> Option<(u32, u32)> {
        if size_pow2 < self.min_size_pow2 || size_pow2 > self.max_size_pow2 {
            return None;
        }
        self.classes
            .get((size_pow2 - self.min_size_pow2) as usize)
            .copied()
    }
}

/// The catalogue after remapping: every entity reindexed to dense,
/// sequential ids, restricted to what is actually reachable.
#[derive(Debug)]
pub struct RemappedCatalogue {
    pub manufacturers: Vec<Manufacturer>,
    pub rom_names: Vec<RomName>,
    pub roms: Vec<Rom>,
    pub machines: Vec<Machine>,
    /// Sorted ascending by `(rom_id, machine_id)`.
    pub machine_roms: Vec<MachineRom>,
    pub size_index: SizeIndex,
}

/// Assigns 24-bit ROM ids (`size_pow2 << 16 | index`, index within the
/// size-sorted-by-SHA1 class), sequential ids for machines/manufacturers/
/// RomNames restricted to what is reachable, and builds the `SizeIndex`.
pub fn remap(catalogue: &Catalogue, config: &BuildConfig) -> Result<RemappedCatalogue, BuildError> {
    let min = config.min_size_pow2;
    let max = config.max_size_pow2;

    // Group ROMs by size class, discarding anything outside the Remapper's
    // band even if it survived ingest filtering (§4.4) — this band is
    // independent of the Ingestor's own byte-size bounds.
    let mut by_class: HashMap<u8, Vec<&Rom>> = HashMap::new();
    for rom in &catalogue.roms {
        if rom.size_pow2 >= min && rom.size_pow2 <= max {
            by_class.entry(rom.size_pow2).or_default().push(rom);
        }
    }

    let mut old_rom_id_to_new: HashMap<u32, u32> = HashMap::new();
    let mut new_roms: Vec<Rom> = Vec::new();
    let mut classes: Vec<(u32, u32)> = Vec::with_capacity((max - min + 1) as usize);

    for size_pow2 in min..=max {
        let mut class_roms = by_class.remove(&size_pow2).unwrap_or_default();
        class_roms.sort_by(|a, b| a.sha1.cmp(&b.sha1));

        let count = class_roms.len();
        if count > u16::MAX as usize {
            return Err(BuildError::SizeClassOverflow { size_pow2, count });
        }

        let start = new_roms.len() as u32;
        for (index, rom) in class_roms.into_iter().enumerate() {
            let new_id = ((size_pow2 as u32) << 16) | index as u32;
            old_rom_id_to_new.insert(rom.id, new_id);
            new_roms.push(Rom {
                id: new_id,
                sha1: rom.sha1,
                crc: rom.crc,
                size_pow2,
                canonical_name_id: rom.canonical_name_id,
            });
        }
        classes.push((start, new_roms.len() as u32));
    }

    // Machines referenced by at least one surviving MachineRom, in ascending
    // original-id order.
    let reachable_machine_roms: Vec<&MachineRom> = catalogue
        .machine_roms
        .iter()
        .filter(|mr| old_rom_id_to_new.contains_key(&mr.rom_id))
        .collect();
    let mut referenced_machine_ids: Vec<u32> = reachable_machine_roms
        .iter()
        .map(|mr| mr.machine_id)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    referenced_machine_ids.sort_unstable();

    let mut old_machine_id_to_new: HashMap<u32, u32> = HashMap::new();
    let mut new_machines: Vec<Machine> = Vec::with_capacity(referenced_machine_ids.len());
    for (new_id, &old_id) in referenced_machine_ids.iter().enumerate() {
        if new_id > NULL_ID_24 as usize {
            return Err(BuildError::invariant("too many machines for a 24-bit id"));
        }
        old_machine_id_to_new.insert(old_id, new_id as u32);
    }

    // Manufacturers actually referenced by a surviving machine.
    let mut referenced_manufacturer_ids: Vec<u32> = referenced_machine_ids
        .iter()
        .filter_map(|&old_id| catalogue.machines[old_id as usize].manufacturer_id)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    referenced_manufacturer_ids.sort_unstable();
    let mut old_manufacturer_id_to_new: HashMap<u32, u16> = HashMap::new();
    let mut new_manufacturers = Vec::with_capacity(referenced_manufacturer_ids.len());
    for (new_id, &old_id) in referenced_manufacturer_ids.iter().enumerate() {
        if new_id > NULL_ID_16 as usize {
            return Err(BuildError::invariant("too many manufacturers for a 16-bit id"));
        }
        old_manufacturer_id_to_new.insert(old_id, new_id as u16);
        new_manufacturers.push(Manufacturer {
            id: new_id as u32,
            name: catalogue.manufacturers[old_id as usize].name.clone(),
        });
    }

    // RomNames reachable from a surviving Rom's canonical name or a
    // surviving MachineRom's name.
    let mut referenced_rom_name_ids: std::collections::BTreeSet<u32> = std::collections::BTreeSet::new();
    for rom in &new_roms {
        referenced_rom_name_ids.insert(rom.canonical_name_id);
    }
    for mr in &reachable_machine_roms {
        referenced_rom_name_ids.insert(mr.name_id);
    }
    let referenced_rom_name_ids: Vec<u32> = referenced_rom_name_ids.into_iter().collect();
    let mut old_rom_name_id_to_new: HashMap<u32, u32> = HashMap::new();
    let mut new_rom_names = Vec::with_capacity(referenced_rom_name_ids.len());
    for (new_id, &old_id) in referenced_rom_name_ids.iter().enumerate() {
        if new_id > NULL_ID_24 as usize {
            return Err(BuildError::invariant("too many rom names for a 24-bit id"));
        }
        old_rom_name_id_to_new.insert(old_id, new_id as u32);
        new_rom_names.push(RomName {
            id: new_id as u32,
            name: catalogue.rom_names[old_id as usize].name.clone(),
        });
    }

    // Rewrite every ROM's canonical_name_id into the new RomName space.
    for rom in &mut new_roms {
        rom.canonical_name_id = old_rom_name_id_to_new
            .get(&rom.canonical_name_id)
            .copied()
            .unwrap_or(NULL_ID_24);
    }

    for &old_id in &referenced_machine_ids {
        let old_machine = &catalogue.machines[old_id as usize];
        let cloneof_id = old_machine
            .cloneof_id
            .and_then(|id| old_machine_id_to_new.get(&id))
            .copied();
        let romof_id = old_machine
            .romof_id
            .and_then(|id| old_machine_id_to_new.get(&id))
            .copied();
        let manufacturer_id = old_machine
            .manufacturer_id
            .and_then(|id| old_manufacturer_id_to_new.get(&id))
            .copied();

        new_machines.push(Machine {
            id: old_machine_id_to_new[&old_id],
            name: old_machine.name.clone(),
            cloneof_id,
            romof_id,
            description: old_machine.description.clone(),
            year: old_machine.year,
            manufacturer_id: manufacturer_id.map(|id| id as u32),
        });
    }

    let mut new_machine_roms: Vec<MachineRom> = reachable_machine_roms
        .iter()
        .map(|mr| MachineRom {
            machine_id: old_machine_id_to_new[&mr.machine_id],
            rom_id: old_rom_id_to_new[&mr.rom_id],
            name_id: old_rom_name_id_to_new
                .get(&mr.name_id)
                .copied()
                .unwrap_or(NULL_ID_24),
        })
        .collect();
    new_machine_roms.sort_by_key(|mr| (mr.rom_id, mr.machine_id));

    Ok(RemappedCatalogue {
        manufacturers: new_manufacturers,
        rom_names: new_rom_names,
        roms: new_roms,
        machines: new_machines,
        machine_roms: new_machine_roms,
        size_index: SizeIndex {
            min_size_pow2: min,
            max_size_pow2: max,
            classes,
        },
    })
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

    fn rom_at(name: &str, size_pow2: u8, sha1_byte: u8) -> RomRecord {
        RomRecord {
            name: name.to_string(),
            size_pow2,
            sha1: [sha1_byte; 20],
            crc: None,
        }
    }

    #[test]
    fn rom_ids_pack_size_class_and_sorted_index() {
        let mut catalogue = Catalogue::new();
        catalogue.add_machine(machine("m"), vec![rom_at("b.bin", 14, 2), rom_at("a.bin", 14, 1)]);
        let remapped = remap(&catalogue, &BuildConfig::default()).unwrap();

        let ids: Vec<u32> = remapped.roms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![(14u32 << 16) | 0, (14u32 << 16) | 1]);
        // Sorted by SHA-1 ascending: sha1_byte=1 (a.bin) sorts before 2 (b.bin).
        assert_eq!(remapped.roms[0].sha1, [1u8; 20]);
    }

    #[test]
    fn roms_outside_size_band_are_discarded() {
        let mut catalogue = Catalogue::new();
        catalogue.add_machine(machine("m"), vec![rom_at("in.bin", 14, 1), rom_at("out.bin", 5, 2)]);
        let config = BuildConfig::default();
        let remapped = remap(&catalogue, &config).unwrap();
        assert_eq!(remapped.roms.len(), 1);
    }

    #[test]
    fn machine_rom_table_is_sorted_by_rom_then_machine() {
        let mut catalogue = Catalogue::new();
        catalogue.add_machine(machine("z"), vec![rom_at("shared.bin", 14, 5)]);
        catalogue.add_machine(machine("a"), vec![rom_at("shared.bin", 14, 5)]);
        let remapped = remap(&catalogue, &BuildConfig::default()).unwrap();
        assert_eq!(remapped.machine_roms.len(), 2);
        assert!(remapped.machine_roms[0].rom_id <= remapped.machine_roms[1].rom_id);
        if remapped.machine_roms[0].rom_id == remapped.machine_roms[1].rom_id {
            assert!(remapped.machine_roms[0].machine_id < remapped.machine_roms[1].machine_id);
        }
    }

    #[test]
    fn size_class_overflow_is_a_build_error() {
        let mut catalogue = Catalogue::new();
        for i in 0..=(u16::MAX as u32) {
            let byte0 = (i >> 8) as u8;
            let byte1 = i as u8;
            let mut sha1 = [0u8; 20];
            sha1[0] = byte0;
            sha1[1] = byte1;
            let rom = RomRecord {
                name: format!("r{i}.bin"),
                size_pow2: 14,
                sha1,
                crc: None,
            };
            catalogue.add_machine(machine(&format!("m{i}")), vec![rom]);
        }
        let result = remap(&catalogue, &BuildConfig::default());
        assert!(matches!(result, Err(BuildError::SizeClassOverflow { .. })));
    }
}
