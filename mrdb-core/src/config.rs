//! Build-time configuration, passed by reference through every pipeline stage.
//!
//! There is no global configuration singleton: every stage that needs a
//! threshold or size bound takes a `&BuildConfig` explicitly.

/// Tunables for a single compiler run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Smallest ROM size (in bytes) accepted at ingest. Must be a power of two.
    pub min_rom_size: u64,
    /// Largest ROM size (in bytes) accepted at ingest. Must be a power of two.
    pub max_rom_size: u64,
    /// Smallest `size_pow2` class the Remapper keeps; ROMs below this are
    /// discarded even if they survived ingest filtering.
    pub min_size_pow2: u8,
    /// Largest `size_pow2` class the Remapper keeps.
    pub max_size_pow2: u8,
    /// A ROM referenced by strictly more machines than this is factored out
    /// into the synthetic shared-BIOS machine.
    pub bios_threshold: usize,
    /// Name of the synthetic shared-BIOS machine.
    pub bios_machine_name: String,
    /// Manufacturer interned (or reused) for the synthetic machine.
    pub bios_manufacturer: String,
    /// Year recorded for the synthetic machine.
    pub bios_year: u16,
    /// Description recorded for the synthetic machine, already the
    /// human-readable text (compressed by the Catalogue on insert).
    pub bios_description: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            min_rom_size: 256,
            max_rom_size: 8 * 1024 * 1024,
            min_size_pow2: 11,
            max_size_pow2: 23,
            bios_threshold: 4000,
            bios_machine_name: "neogeo_bios".to_string(),
            bios_manufacturer: "SNK".to_string(),
            bios_year: 1990,
            bios_description: "Shared Neo-Geo BIOS ROMs, factored out of their original machines \
                because they are referenced by an unusually large number of them."
                .to_string(),
        }
    }
}
