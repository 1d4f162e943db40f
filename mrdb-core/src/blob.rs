//! The fixed binary layout (§6.1) and its two implementations: `write_blob`,
//! a one-pass, non-seeking writer, and `BlobReader`, a borrowing reference
//! decoder over an already-loaded `&[u8]` that implements the consumer
//! contract of §6.2 — the same binary-search-and-pointer-arithmetic idiom a
//! memory-mapped firmware consumer would use.

use std::io::Write;

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::model::{NULL_ID_16, NULL_ID_24};
use crate::pool::{build_descriptions_pool, build_strings_pool};
use crate::remap::RemappedCatalogue;

pub const MAGIC: &[u8; 4] = b"MRDB";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 64;
pub const ROM_RECORD_LEN: usize = 23;
pub const MACHINE_RECORD_LEN: usize = 20;
pub const MACHINE_ROM_RECORD_LEN: usize = 9;
pub const NAME_RECORD_LEN: usize = 4;

/// Serializes a remapped catalogue into the blob's exact byte layout:
/// header → size index → ROMs → Machines → MachineRoms → Manufacturers →
/// RomNames → strings pool → descriptions pool. Every offset is computed
/// from known section sizes before any byte is written, so the writer never
/// seeks.
pub fn write_blob<W: Write>(out: &mut W, catalogue: &RemappedCatalogue, _config: &BuildConfig) -> Result<(), BuildError> {
    let strings = build_strings_pool(catalogue);
    let descriptions = build_descriptions_pool(catalogue);

    let size_index_len = catalogue.size_index.classes.len() * 8;
    let roms_len = catalogue.roms.len() * ROM_RECORD_LEN;
    let machines_len = catalogue.machines.len() * MACHINE_RECORD_LEN;
    let machine_roms_len = catalogue.machine_roms.len() * MACHINE_ROM_RECORD_LEN;
    let manufacturers_len = catalogue.manufacturers.len() * NAME_RECORD_LEN;
    let rom_names_len = catalogue.rom_names.len() * NAME_RECORD_LEN;

    let size_index_offset = HEADER_LEN as u32;
    let roms_offset = size_index_offset + size_index_len as u32;
    let machines_offset = roms_offset + roms_len as u32;
    let machine_roms_offset = machines_offset + machines_len as u32;
    let manufacturers_offset = machine_roms_offset + machine_roms_len as u32;
    let rom_names_offset = manufacturers_offset + manufacturers_len as u32;
    let strings_offset = rom_names_offset + rom_names_len as u32;
    let desc_offset = strings_offset + strings.bytes.len() as u32;

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&VERSION.to_le_bytes());
    header.push(catalogue.size_index.min_size_pow2);
    header.push(catalogue.size_index.max_size_pow2);
    header.extend_from_slice(&(catalogue.roms.len() as u32).to_le_bytes());
    header.extend_from_slice(&(catalogue.machines.len() as u32).to_le_bytes());
    header.extend_from_slice(&(catalogue.machine_roms.len() as u32).to_le_bytes());
    header.extend_from_slice(&(catalogue.manufacturers.len() as u32).to_le_bytes());
    header.extend_from_slice(&(catalogue.rom_names.len() as u32).to_le_bytes());
    header.extend_from_slice(&size_index_offset.to_le_bytes());
    header.extend_from_slice(&roms_offset.to_le_bytes());
    header.extend_from_slice(&machines_offset.to_le_bytes());
    header.extend_from_slice(&machine_roms_offset.to_le_bytes());
    header.extend_from_slice(&manufacturers_offset.to_le_bytes());
    header.extend_from_slice(&rom_names_offset.to_le_bytes());
    header.extend_from_slice(&strings_offset.to_le_bytes());
    header.extend_from_slice(&desc_offset.to_le_bytes());
    header.resize(HEADER_LEN, 0);
    out.write_all(&header)?;

    for &(start, end) in &catalogue.size_index.classes {
        let start_byte = start * ROM_RECORD_LEN as u32;
        let end_byte = end * ROM_RECORD_LEN as u32;
        out.write_all(&start_byte.to_le_bytes())?;
        out.write_all(&end_byte.to_le_bytes())?;
    }

    for rom in &catalogue.roms {
        out.write_all(&rom.sha1)?;
        write_u24(out, rom.canonical_name_id)?;
    }

    for (machine, &(desc_off, desc_len)) in catalogue.machines.iter().zip(&descriptions.entries) {
        let name_offset = strings.offset_of(&machine.name);
        out.write_all(&name_offset.to_le_bytes())?;
        out.write_all(&desc_off.to_le_bytes())?;
        out.write_all(&desc_len.to_le_bytes())?;
        write_u24(out, machine.cloneof_id.unwrap_or(NULL_ID_24))?;
        write_u24(out, machine.romof_id.unwrap_or(NULL_ID_24))?;
        out.write_all(&machine.year.unwrap_or(0).to_le_bytes())?;
        let manufacturer_id = machine
            .manufacturer_id
            .map(|id| id as u16)
            .unwrap_or(NULL_ID_16);
        out.write_all(&manufacturer_id.to_le_bytes())?;
    }

    for mr in &catalogue.machine_roms {
        write_u24(out, mr.machine_id)?;
        write_u24(out, mr.rom_id)?;
        write_u24(out, mr.name_id)?;
    }

    for m in &catalogue.manufacturers {
        let offset = strings.offset_of(&m.name);
        out.write_all(&offset.to_le_bytes())?;
    }

    for n in &catalogue.rom_names {
        let offset = strings.offset_of(&n.name);
        out.write_all(&offset.to_le_bytes())?;
    }

    out.write_all(&strings.bytes)?;
    out.write_all(&descriptions.bytes)?;

    Ok(())
}

fn write_u24<W: Write>(out: &mut W, value: u32) -> std::io::Result<()> {
    out.write_all(&value.to_le_bytes()[0..3])
}

fn read_u24(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

/// A parsed header, with every offset/count already validated against the
/// slice length.
#[derive(Debug, Clone, Copy)]
struct Header {
    min_size_pow2: u8,
    max_size_pow2: u8,
    roms_count: u32,
    machines_count: u32,
    machine_roms_count: u32,
    manufacturers_count: u32,
    rom_names_count: u32,
    size_index_offset: u32,
    roms_offset: u32,
    machines_offset: u32,
    machine_roms_offset: u32,
    manufacturers_offset: u32,
    rom_names_offset: u32,
    strings_offset: u32,
    desc_offset: u32,
}

/// The reference, borrowing decoder over an in-memory blob (§6.2). No
/// allocation beyond the caller-provided slice; every lookup is a binary
/// search followed by pointer arithmetic, mirroring a memory-mapped firmware
/// consumer.
pub struct BlobReader<'a> {
    data: &'a [u8],
    header: Header,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob shorter than the fixed header")]
    Truncated,
    #[error("bad magic: expected MRDB")]
    BadMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    #[error("size class {0} is outside the declared [{1}, {2}] range")]
    SizeClassOutOfRange(u8, u8, u8),
}

impl<'a> BlobReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, BlobError> {
        if data.len() < HEADER_LEN {
            return Err(BlobError::Truncated);
        }
        if &data[0..4] != MAGIC {
            return Err(BlobError::BadMagic);
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(BlobError::UnsupportedVersion(version));
        }

        let header = Header {
            min_size_pow2: data[6],
            max_size_pow2: data[7],
            roms_count: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            machines_count: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            machine_roms_count: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            manufacturers_count: u32::from_le_bytes(data[20..24].try_into().unwrap()),
            rom_names_count: u32::from_le_bytes(data[24..28].try_into().unwrap()),
            size_index_offset: u32::from_le_bytes(data[28..32].try_into().unwrap()),
            roms_offset: u32::from_le_bytes(data[32..36].try_into().unwrap()),
            machines_offset: u32::from_le_bytes(data[36..40].try_into().unwrap()),
            machine_roms_offset: u32::from_le_bytes(data[40..44].try_into().unwrap()),
            manufacturers_offset: u32::from_le_bytes(data[44..48].try_into().unwrap()),
            rom_names_offset: u32::from_le_bytes(data[48..52].try_into().unwrap()),
            strings_offset: u32::from_le_bytes(data[52..56].try_into().unwrap()),
            desc_offset: u32::from_le_bytes(data[56..60].try_into().unwrap()),
        };

        Ok(Self { data, header })
    }

    pub fn min_size_pow2(&self) -> u8 {
        self.header.min_size_pow2
    }

    pub fn max_size_pow2(&self) -> u8 {
        self.header.max_size_pow2
    }

    pub fn roms_count(&self) -> u32 {
        self.header.roms_count
    }

    pub fn machines_count(&self) -> u32 {
        self.header.machines_count
    }

    pub fn machine_roms_count(&self) -> u32 {
        self.header.machine_roms_count
    }

    pub fn manufacturers_count(&self) -> u32 {
        self.header.manufacturers_count
    }

    pub fn rom_names_count(&self) -> u32 {
        self.header.rom_names_count
    }

    fn size_class_range(&self, size_pow2: u8) -> Result<(u32, u32), BlobError> {
        if size_pow2 < self.header.min_size_pow2 || size_pow2 > self.header.max_size_pow2 {
            return Err(BlobError::SizeClassOutOfRange(
                size_pow2,
                self.header.min_size_pow2,
                self.header.max_size_pow2,
            ));
        }
        let class_index = (size_pow2 - self.header.min_size_pow2) as usize;
        let base = self.header.size_index_offset as usize + class_index * 8;
        let start = u32::from_le_bytes(self.data[base..base + 4].try_into().unwrap());
        let end = u32::from_le_bytes(self.data[base + 4..base + 8].try_into().unwrap());
        Ok((start, end))
    }

    fn rom_record(&self, global_index: u32) -> &[u8] {
        let base = self.header.roms_offset as usize + global_index as usize * ROM_RECORD_LEN;
        &self.data[base..base + ROM_RECORD_LEN]
    }

    /// `(start_index, end_index)` of the global ROM table slice backing
    /// `size_pow2`, in record units (not bytes). Exposed for `verify`-style
    /// whole-blob invariant checks that need to walk a class in order.
    pub fn size_class_bounds(&self, size_pow2: u8) -> Result<(u32, u32), BlobError> {
        let (start, end) = self.size_class_range(size_pow2)?;
        Ok((start / ROM_RECORD_LEN as u32, end / ROM_RECORD_LEN as u32))
    }

    /// SHA-1 of the ROM at `global_index` into the flat ROMs table.
    pub fn rom_sha1_at(&self, global_index: u32) -> [u8; 20] {
        self.rom_record(global_index)[0..20].try_into().unwrap()
    }

    /// One raw `(machine_id, rom_id, name_id)` MachineRoms row by its
    /// position in the sorted table.
    pub fn machine_rom_at(&self, index: u32) -> (u32, u32, u32) {
        let record = self.machine_rom_record(index);
        (
            read_u24(&record[0..3]),
            read_u24(&record[3..6]),
            read_u24(&record[6..9]),
        )
    }

    /// Finds a ROM by `(size_pow2, sha1)` in `O(log n)` via binary search
    /// within that size class's byte range.
    pub fn find_rom(&self, size_pow2: u8, sha1: &[u8; 20]) -> Result<Option<u32>, BlobError> {
        let (start, end) = self.size_class_range(size_pow2)?;
        let start_index = start / ROM_RECORD_LEN as u32;
        let end_index = end / ROM_RECORD_LEN as u32;

        let mut lo = start_index;
        let mut hi = end_index;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record = self.rom_record(mid);
            match record[0..20].cmp(sha1.as_slice()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(((size_pow2 as u32) << 16) | (mid - start_index)));
                }
            }
        }
        Ok(None)
    }

    pub fn rom_canonical_name_id(&self, rom_id: u32) -> u32 {
        let size_pow2 = (rom_id >> 16) as u8;
        let index = rom_id & 0xFFFF;
        let (start, _) = self.size_class_range(size_pow2).expect("caller passes a valid rom_id");
        let global_index = start / ROM_RECORD_LEN as u32 + index;
        let record = self.rom_record(global_index);
        read_u24(&record[20..23])
    }

    fn machine_rom_record(&self, index: u32) -> &[u8] {
        let base = self.header.machine_roms_offset as usize + index as usize * MACHINE_ROM_RECORD_LEN;
        &self.data[base..base + MACHINE_ROM_RECORD_LEN]
    }

    /// Lists every machine id referencing `rom_id`: a binary search for the
    /// lower bound of `rom_id` in the `(rom_id, machine_id)`-sorted
    /// MachineRoms table, then a linear walk until `rom_id` changes.
    pub fn machines_for_rom(&self, rom_id: u32) -> Vec<u32> {
        let count = self.header.machine_roms_count;
        let mut lo = 0u32;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record = self.machine_rom_record(mid);
            let this_rom_id = read_u24(&record[3..6]);
            if this_rom_id < rom_id {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        let mut out = Vec::new();
        let mut i = lo;
        while i < count {
            let record = self.machine_rom_record(i);
            let this_rom_id = read_u24(&record[3..6]);
            if this_rom_id != rom_id {
                break;
            }
            out.push(read_u24(&record[0..3]));
            i += 1;
        }
        out
    }

    fn machine_record(&self, machine_id: u32) -> &[u8] {
        let base = self.header.machines_offset as usize + machine_id as usize * MACHINE_RECORD_LEN;
        &self.data[base..base + MACHINE_RECORD_LEN]
    }

    pub fn machine_name_offset(&self, machine_id: u32) -> u32 {
        let record = self.machine_record(machine_id);
        u32::from_le_bytes(record[0..4].try_into().unwrap())
    }

    pub fn machine_description(&self, machine_id: u32) -> &'a [u8] {
        let record = self.machine_record(machine_id);
        let offset = u32::from_le_bytes(record[4..8].try_into().unwrap());
        let len = u16::from_le_bytes(record[8..10].try_into().unwrap());
        let base = self.header.desc_offset as usize + offset as usize;
        &self.data[base..base + len as usize]
    }

    pub fn machine_cloneof_id(&self, machine_id: u32) -> Option<u32> {
        let record = self.machine_record(machine_id);
        let id = read_u24(&record[10..13]);
        (id != NULL_ID_24).then_some(id)
    }

    pub fn machine_romof_id(&self, machine_id: u32) -> Option<u32> {
        let record = self.machine_record(machine_id);
        let id = read_u24(&record[13..16]);
        (id != NULL_ID_24).then_some(id)
    }

    pub fn machine_year(&self, machine_id: u32) -> Option<u16> {
        let record = self.machine_record(machine_id);
        let year = u16::from_le_bytes(record[16..18].try_into().unwrap());
        (year != 0).then_some(year)
    }

    pub fn machine_manufacturer_id(&self, machine_id: u32) -> Option<u16> {
        let record = self.machine_record(machine_id);
        let id = u16::from_le_bytes(record[18..20].try_into().unwrap());
        (id != NULL_ID_16).then_some(id)
    }

    fn name_offset(&self, table_offset: u32, id: u32) -> u32 {
        let base = table_offset as usize + id as usize * NAME_RECORD_LEN;
        u32::from_le_bytes(self.data[base..base + 4].try_into().unwrap())
    }

    pub fn manufacturer_name(&self, manufacturer_id: u16) -> &'a str {
        let offset = self.name_offset(self.header.manufacturers_offset, manufacturer_id as u32);
        self.read_nul_terminated(offset)
    }

    pub fn rom_name(&self, rom_name_id: u32) -> &'a str {
        let offset = self.name_offset(self.header.rom_names_offset, rom_name_id);
        self.read_nul_terminated(offset)
    }

    pub fn machine_name(&self, machine_id: u32) -> &'a str {
        let offset = self.machine_name_offset(machine_id);
        self.read_nul_terminated(offset)
    }

    fn read_nul_terminated(&self, offset: u32) -> &'a str {
        let start = self.header.strings_offset as usize + offset as usize;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .unwrap_or(self.data.len());
        std::str::from_utf8(&self.data[start..end]).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::Catalogue;
    use crate::config::BuildConfig;
    use crate::ingest::{MachineRecord, RomRecord};
    use crate::remap::remap;

    fn sample_blob() -> Vec<u8> {
        let mut catalogue = Catalogue::new();
        catalogue.add_machine(
            MachineRecord {
                name: "pacman".to_string(),
                cloneof: None,
                romof: None,
                description: Some("Pac-Man".to_string()),
                year: Some(1980),
                manufacturer: Some("Namco".to_string()),
            },
            vec![RomRecord {
                name: "pacman.6e".to_string(),
                size_pow2: 14,
                sha1: [0xaa; 20],
                crc: None,
            }],
        );
        catalogue.resolve_parents();

        let config = BuildConfig::default();
        let remapped = remap(&catalogue, &config).unwrap();
        let mut out = Vec::new();
        write_blob(&mut out, &remapped, &config).unwrap();
        out
    }

    #[test]
    fn round_trips_header_fields() {
        let blob = sample_blob();
        let reader = BlobReader::new(&blob).unwrap();
        assert_eq!(reader.roms_count(), 1);
        assert_eq!(reader.machines_count(), 1);
        assert_eq!(reader.min_size_pow2(), 11);
        assert_eq!(reader.max_size_pow2(), 23);
    }

    #[test]
    fn finds_rom_by_size_and_sha1() {
        let blob = sample_blob();
        let reader = BlobReader::new(&blob).unwrap();
        let found = reader.find_rom(14, &[0xaa; 20]).unwrap();
        assert!(found.is_some());
        assert!(reader.find_rom(14, &[0xbb; 20]).unwrap().is_none());
    }

    #[test]
    fn lists_machines_for_a_rom_and_reads_its_name() {
        let blob = sample_blob();
        let reader = BlobReader::new(&blob).unwrap();
        let rom_id = reader.find_rom(14, &[0xaa; 20]).unwrap().unwrap();
        let machines = reader.machines_for_rom(rom_id);
        assert_eq!(machines.len(), 1);
        assert_eq!(reader.machine_name(machines[0]), "pacman");
        assert_eq!(reader.machine_year(machines[0]), Some(1980));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = sample_blob();
        blob[0] = b'X';
        assert!(matches!(BlobReader::new(&blob), Err(BlobError::BadMagic)));
    }

    #[test]
    fn rejects_truncated_blob() {
        assert!(matches!(BlobReader::new(&[0u8; 10]), Err(BlobError::Truncated)));
    }
}
