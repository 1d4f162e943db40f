//! The normalized in-memory store (§4.2) that accumulates Ingestor output
//! into the data model of §3: interned manufacturers and ROM filenames,
//! ROMs deduplicated by SHA-1, and machines with their raw `cloneof`/`romof`
//! names resolved to ids once every document has been ingested.

use std::collections::HashMap;

use crate::ingest::{MachineRecord, RomRecord};
use crate::model::{Machine, MachineRom, Manufacturer, Rom, RomName};

/// Accumulates catalogue state across every ingested document, in ingestion
/// order, before `resolve_parents` and the `PostProcessor` passes run.
#[derive(Debug, Default)]
pub struct Catalogue {
    pub manufacturers: Vec<Manufacturer>,
    pub rom_names: Vec<RomName>,
    pub roms: Vec<Rom>,
    pub machines: Vec<Machine>,
    pub machine_roms: Vec<MachineRom>,

    manufacturer_by_name: HashMap<String, u32>,
    rom_name_by_name: HashMap<String, u32>,
    rom_by_sha1: HashMap<[u8; 20], u32>,
    machine_by_name: HashMap<String, u32>,

    /// Raw `cloneof`/`romof` names, by machine id, pending resolution.
    pending_parents: HashMap<u32, (Option<String>, Option<String>)>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert of a manufacturer by name.
    pub fn intern_manufacturer(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.manufacturer_by_name.get(name) {
            return id;
        }
        let id = self.manufacturers.len() as u32;
        self.manufacturers.push(Manufacturer {
            id,
            name: name.to_string(),
        });
        self.manufacturer_by_name.insert(name.to_string(), id);
        id
    }

    /// Idempotent upsert of a ROM filename by name.
    pub fn intern_rom_name(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.rom_name_by_name.get(name) {
            return id;
        }
        let id = self.rom_names.len() as u32;
        self.rom_names.push(RomName {
            id,
            name: name.to_string(),
        });
        self.rom_name_by_name.insert(name.to_string(), id);
        id
    }

    /// Keyed by SHA-1: on a hit the existing record is returned unchanged —
    /// the first observed name/CRC wins and is never overwritten.
    pub fn intern_rom(&mut self, sha1: [u8; 20], crc: Option<[u8; 4]>, size_pow2: u8, first_name_id: u32) -> (u32, bool) {
        if let Some(&id) = self.rom_by_sha1.get(&sha1) {
            return (id, false);
        }
        let id = self.roms.len() as u32;
        self.roms.push(Rom {
            id,
            sha1,
            crc,
            size_pow2,
            canonical_name_id: first_name_id,
        });
        self.rom_by_sha1.insert(sha1, id);
        (id, true)
    }

    /// Inserts a machine and its ROM references. Returns `None` if a machine
    /// of this name was already present (first-ingest wins, §3 invariant 5).
    pub fn add_machine(&mut self, record: MachineRecord, roms: Vec<RomRecord>) -> Option<u32> {
        if self.machine_by_name.contains_key(&record.name) {
            return None;
        }

        let manufacturer_id = record
            .manufacturer
            .as_deref()
            .map(|name| self.intern_manufacturer(name));

        let machine_id = self.machines.len() as u32;
        self.machines.push(Machine {
            id: machine_id,
            name: record.name.clone(),
            cloneof_id: None,
            romof_id: None,
            description: record.description.as_deref().map(compress_description),
            year: record.year,
            manufacturer_id,
        });
        self.machine_by_name.insert(record.name.clone(), machine_id);
        self.pending_parents
            .insert(machine_id, (record.cloneof, record.romof));

        for rom in roms {
            let name_id = self.intern_rom_name(&rom.name);
            let (rom_id, _was_new) = self.intern_rom(rom.sha1, rom.crc, rom.size_pow2, name_id);
            self.machine_roms.push(MachineRom {
                machine_id,
                rom_id,
                name_id,
            });
        }

        Some(machine_id)
    }

    /// Replaces every raw `cloneof`/`romof` name with the corresponding
    /// machine id, or leaves it null if the name is unknown. Must be called
    /// once, after every document has been ingested.
    pub fn resolve_parents(&mut self) {
        for (machine_id, (cloneof, romof)) in self.pending_parents.drain() {
            let cloneof_id = cloneof.as_deref().and_then(|n| self.machine_by_name.get(n)).copied();
            let romof_id = romof.as_deref().and_then(|n| self.machine_by_name.get(n)).copied();
            let machine = &mut self.machines[machine_id as usize];
            machine.cloneof_id = cloneof_id;
            machine.romof_id = romof_id;
        }
    }

    pub fn machine_id_by_name(&self, name: &str) -> Option<u32> {
        self.machine_by_name.get(name).copied()
    }
}

/// Compresses a machine description with zlib-wrapped DEFLATE. Descriptions
/// stay compressed across the whole pipeline; only the SQLite export ever
/// inflates them (§4.8).
fn compress_description(text: &str) -> Vec<u8> {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .expect("writing to an in-memory Vec cannot fail");
    encoder.finish().expect("flushing an in-memory Vec cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(name: &str, sha1_byte: u8) -> RomRecord {
        RomRecord {
            name: name.to_string(),
            size_pow2: 14,
            sha1: [sha1_byte; 20],
            crc: None,
        }
    }

    fn machine(name: &str, cloneof: Option<&str>) -> MachineRecord {
        MachineRecord {
            name: name.to_string(),
            cloneof: cloneof.map(str::to_string),
            romof: None,
            description: None,
            year: Some(1980),
            manufacturer: Some("Namco".to_string()),
        }
    }

    #[test]
    fn first_ingest_wins() {
        let mut cat = Catalogue::new();
        cat.add_machine(machine("galaga", None), vec![rom("r1.bin", 1)]);
        let second = cat.add_machine(machine("galaga", None), vec![rom("r2.bin", 2)]);
        assert!(second.is_none());
        assert_eq!(cat.machines.len(), 1);
        assert_eq!(cat.roms.len(), 1);
    }

    #[test]
    fn duplicate_sha_across_machines_dedupes_to_one_rom() {
        let mut cat = Catalogue::new();
        cat.add_machine(machine("a", None), vec![rom("a.rom", 9)]);
        cat.add_machine(machine("b", None), vec![rom("b.rom", 9)]);
        assert_eq!(cat.roms.len(), 1);
        assert_eq!(cat.machine_roms.len(), 2);
        assert_ne!(cat.machine_roms[0].name_id, cat.machine_roms[1].name_id);
    }

    #[test]
    fn resolve_parents_links_known_names_and_nulls_unknown() {
        let mut cat = Catalogue::new();
        cat.add_machine(machine("b", None), vec![rom("b.bin", 1)]);
        cat.add_machine(machine("a", Some("b")), vec![rom("a.bin", 2)]);
        cat.add_machine(machine("c", Some("missing")), vec![rom("c.bin", 3)]);
        cat.resolve_parents();

        let a = cat.machine_id_by_name("a").unwrap();
        let b = cat.machine_id_by_name("b").unwrap();
        let c = cat.machine_id_by_name("c").unwrap();
        assert_eq!(cat.machines[a as usize].cloneof_id, Some(b));
        assert_eq!(cat.machines[c as usize].cloneof_id, None);
    }

    #[test]
    fn manufacturer_interning_is_idempotent() {
        let mut cat = Catalogue::new();
        let id1 = cat.intern_manufacturer("SNK");
        let id2 = cat.intern_manufacturer("SNK");
        assert_eq!(id1, id2);
        assert_eq!(cat.manufacturers.len(), 1);
    }
}
