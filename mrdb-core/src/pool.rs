//! Builds the two byte pools the blob's fixed-width tables point into
//! (§4.5): a sorted, NUL-terminated UTF-8 strings pool, and a descriptions
//! pool of already-compressed byte blobs concatenated in machine-id order.

use std::collections::BTreeSet;

use crate::remap::RemappedCatalogue;

/// A built byte pool plus the offset each referenced string landed at.
pub struct StringsPool {
    pub bytes: Vec<u8>,
    offsets: std::collections::HashMap<String, u32>,
}

impl StringsPool {
    pub fn offset_of(&self, s: &str) -> u32 {
        self.offsets[s]
    }
}

/// `(offset, length)` per machine, in the same order as
/// `RemappedCatalogue::machines`.
pub struct DescriptionsPool {
    pub bytes: Vec<u8>,
    pub entries: Vec<(u32, u16)>,
}

/// Collects every manufacturer name, ROM filename, and machine name
/// (descriptions are not included — they live in the separate compressed
/// pool), sorts them lexicographically for deterministic output, and lays
/// them out end-to-end as NUL-terminated UTF-8.
pub fn build_strings_pool(catalogue: &RemappedCatalogue) -> StringsPool {
    let mut unique: BTreeSet<&str> = BTreeSet::new();
    for m in &catalogue.manufacturers {
        unique.insert(&m.name);
    }
    for n in &catalogue.rom_names {
        unique.insert(&n.name);
    }
    for machine in &catalogue.machines {
        unique.insert(&machine.name);
    }

    let mut bytes = Vec::new();
    let mut offsets = std::collections::HashMap::new();
    for s in unique {
        let offset = bytes.len() as u32;
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        offsets.insert(s.to_string(), offset);
    }

    StringsPool { bytes, offsets }
}

/// Concatenates every machine's already-compressed description bytes in
/// ascending machine id order. Machines with no description get `(0, 0)`.
pub fn build_descriptions_pool(catalogue: &RemappedCatalogue) -> DescriptionsPool {
    let mut bytes = Vec::new();
    let mut entries = Vec::with_capacity(catalogue.machines.len());

    for machine in &catalogue.machines {
        match &machine.description {
            Some(desc) if !desc.is_empty() => {
                let offset = bytes.len() as u32;
                let len = desc.len() as u16;
                bytes.extend_from_slice(desc);
                entries.push((offset, len));
            }
            _ => entries.push((0, 0)),
        }
    }

    DescriptionsPool { bytes, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Machine, Manufacturer, RomName};
    use crate::remap::SizeIndex;

    fn empty_remapped() -> RemappedCatalogue {
        RemappedCatalogue {
            manufacturers: Vec::new(),
            rom_names: Vec::new(),
            roms: Vec::new(),
            machines: Vec::new(),
            machine_roms: Vec::new(),
            size_index: SizeIndex {
                min_size_pow2: 11,
                max_size_pow2: 23,
                classes: vec![(0, 0); 13],
            },
        }
    }

    #[test]
    fn strings_pool_is_sorted_and_nul_terminated() {
        let mut cat = empty_remapped();
        cat.manufacturers.push(Manufacturer {
            id: 0,
            name: "Zed Corp".to_string(),
        });
        cat.manufacturers.push(Manufacturer {
            id: 1,
            name: "Acme".to_string(),
        });

        let pool = build_strings_pool(&cat);
        assert_eq!(pool.offset_of("Acme"), 0);
        assert_eq!(pool.bytes[4], 0);
        assert_eq!(pool.offset_of("Zed Corp"), 5);
    }

    #[test]
    fn descriptions_pool_tracks_offset_and_length() {
        let mut cat = empty_remapped();
        cat.machines.push(Machine {
            id: 0,
            name: "m".to_string(),
            cloneof_id: None,
            romof_id: None,
            description: Some(vec![1, 2, 3]),
            year: None,
            manufacturer_id: None,
        });
        cat.machines.push(Machine {
            id: 1,
            name: "n".to_string(),
            cloneof_id: None,
            romof_id: None,
            description: None,
            year: None,
            manufacturer_id: None,
        });

        let pool = build_descriptions_pool(&cat);
        assert_eq!(pool.entries[0], (0, 3));
        assert_eq!(pool.entries[1], (0, 0));
        assert_eq!(pool.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn empty_string_is_permitted_at_offset_zero() {
        let mut cat = empty_remapped();
        cat.rom_names.push(RomName {
            id: 0,
            name: String::new(),
        });
        let pool = build_strings_pool(&cat);
        assert_eq!(pool.offset_of(""), 0);
        assert_eq!(pool.bytes[0], 0);
    }
}
