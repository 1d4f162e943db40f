//! The catalogue's entity types (§3): manufacturers, ROM filenames, ROMs,
//! machines, and the machine/ROM association. Every id below is an internal
//! handle assigned by the `Catalogue`; there is no externally meaningful id
//! until the `Remapper` produces the dense, packed ids that ship in the blob.

/// 24-bit null: no valid id ever equals this.
pub const NULL_ID_24: u32 = 0xFF_FFFF;

/// 16-bit null: no valid id ever equals this.
pub const NULL_ID_16: u16 = 0xFFFF;

/// Smallest and largest `size_pow2` a ROM can legally carry inside a 24-bit
/// ROM id's top byte. The configured `[min_size_pow2, max_size_pow2]` band is
/// always a subrange of this.
pub const SIZE_POW2_WIDTH: u32 = 8;

/// A manufacturer, interned by name. Created on first reference by a
/// `Machine`; destroyed only by orphan cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manufacturer {
    pub id: u32,
    pub name: String,
}

/// The filename under which some machine references a ROM. Interned by name;
/// the same name may denote different physical ROMs across machines, and the
/// same physical ROM may carry different names in different machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomName {
    pub id: u32,
    pub name: String,
}

/// A physical, content-addressed ROM, deduplicated by SHA-1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub id: u32,
    pub sha1: [u8; 20],
    /// CRC32, if the source document carried one. Optional per §3 — not
    /// used for identity, only carried through for the SQLite export.
    pub crc: Option<[u8; 4]>,
    /// log2 of the ROM's byte size.
    pub size_pow2: u8,
    /// The filename under which this ROM was first encountered. Advisory
    /// only; the per-machine filename (`MachineRom::name_id`) is
    /// authoritative for rendering.
    pub canonical_name_id: u32,
}

/// One arcade machine (or hardware variant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id: u32,
    pub name: String,
    /// Id of the machine this one is a clone of, if any and if it survived
    /// filtering.
    pub cloneof_id: Option<u32>,
    /// Id of the machine this one inherits ROMs from, if any and if it
    /// survived filtering.
    pub romof_id: Option<u32>,
    /// Zlib-wrapped DEFLATE bytes. Decompression is deferred to consumers;
    /// nothing in the core pipeline inflates this except the SQLite export.
    pub description: Option<Vec<u8>>,
    pub year: Option<u16>,
    pub manufacturer_id: Option<u32>,
}

/// A many-to-many association between a `Machine` and a `Rom`, carrying the
/// filename under which that machine references that ROM. No uniqueness
/// constraint: duplicates from the input are preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineRom {
    pub machine_id: u32,
    pub rom_id: u32,
    pub name_id: u32,
}

/// Parses a `size` in bytes into its `size_pow2` if and only if it is an
/// exact power of two. Used by both the Ingestor (ROM filtering, §4.1 rule 3)
/// and the Remapper (ROM id packing, §4.4).
pub fn size_to_pow2(size: u64) -> Option<u8> {
    if size == 0 || !size.is_power_of_two() {
        return None;
    }
    let pow2 = size.ilog2();
    u8::try_from(pow2).ok()
}
