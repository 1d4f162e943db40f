//! Supplemental normalized SQLite export (§4.8), gated behind the
//! `sqlite-export` feature. One-way and one-shot: a fresh database is
//! created for every build, never migrated or read back by a later stage.
//! Grounded in this codebase's existing SQLite persistence layer, simplified
//! down to the single `create-then-insert` pass this spec calls for.

use rusqlite::Connection;

use crate::error::BuildError;
use crate::model::{NULL_ID_16, NULL_ID_24};
use crate::remap::RemappedCatalogue;

const SCHEMA_SQL: &str = "
CREATE TABLE manufacturers (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE rom_names (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE roms (
    id                INTEGER PRIMARY KEY,
    sha1              TEXT NOT NULL,
    crc               TEXT,
    size_pow2         INTEGER NOT NULL,
    canonical_name_id INTEGER REFERENCES rom_names(id)
);

CREATE TABLE machines (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL,
    cloneof_id      INTEGER REFERENCES machines(id),
    romof_id        INTEGER REFERENCES machines(id),
    description     TEXT,
    year            INTEGER,
    manufacturer_id INTEGER REFERENCES manufacturers(id)
);

CREATE TABLE machine_roms (
    machine_id INTEGER NOT NULL REFERENCES machines(id),
    rom_id     INTEGER NOT NULL REFERENCES roms(id),
    name_id    INTEGER NOT NULL REFERENCES rom_names(id)
);

CREATE INDEX idx_machine_roms_rom ON machine_roms(rom_id);
CREATE INDEX idx_machine_roms_machine ON machine_roms(machine_id);
";

/// Creates (overwriting) a SQLite database at `path` and populates one table
/// per entity of §3, keyed by the same remapped ids the binary blob uses.
pub fn export(path: &std::path::Path, catalogue: &RemappedCatalogue) -> Result<(), BuildError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let conn = Connection::open(path)?;
    export_to_connection(&conn, catalogue)
}

/// Same as [`export`] but against an already-open connection (tests use an
/// in-memory database).
pub fn export_to_connection(conn: &Connection, catalogue: &RemappedCatalogue) -> Result<(), BuildError> {
    conn.execute_batch(SCHEMA_SQL)?;

    let tx = conn.unchecked_transaction()?;

    for m in &catalogue.manufacturers {
        tx.execute(
            "INSERT INTO manufacturers (id, name) VALUES (?1, ?2)",
            rusqlite::params![m.id, m.name],
        )?;
    }

    for n in &catalogue.rom_names {
        tx.execute(
            "INSERT INTO rom_names (id, name) VALUES (?1, ?2)",
            rusqlite::params![n.id, n.name],
        )?;
    }

    for rom in &catalogue.roms {
        let sha1_hex = hex_encode(&rom.sha1);
        let crc_hex = rom.crc.as_ref().map(|c| hex_encode(c));
        let canonical_name_id = (rom.canonical_name_id != NULL_ID_24).then_some(rom.canonical_name_id);
        tx.execute(
            "INSERT INTO roms (id, sha1, crc, size_pow2, canonical_name_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![rom.id, sha1_hex, crc_hex, rom.size_pow2, canonical_name_id],
        )?;
    }

    for machine in &catalogue.machines {
        let description = machine
            .description
            .as_ref()
            .map(|bytes| inflate(bytes))
            .transpose()?;
        let manufacturer_id = machine
            .manufacturer_id
            .filter(|&id| id != NULL_ID_16 as u32);
        tx.execute(
            "INSERT INTO machines (id, name, cloneof_id, romof_id, description, year, manufacturer_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                machine.id,
                machine.name,
                machine.cloneof_id,
                machine.romof_id,
                description,
                machine.year,
                manufacturer_id,
            ],
        )?;
    }

    for mr in &catalogue.machine_roms {
        tx.execute(
            "INSERT INTO machine_roms (machine_id, rom_id, name_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![mr.machine_id, mr.rom_id, mr.name_id],
        )?;
    }

    tx.commit()?;
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn inflate(compressed: &[u8]) -> Result<String, BuildError> {
    use std::io::Read;

    use flate2::read::ZlibDecoder;

    let mut decoder = ZlibDecoder::new(compressed);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(BuildError::Io)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::Catalogue;
    use crate::config::BuildConfig;
    use crate::ingest::{MachineRecord, RomRecord};
    use crate::remap::remap;

    #[test]
    fn export_round_trips_a_machine_and_its_rom() {
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
        let remapped = remap(&catalogue, &BuildConfig::default()).unwrap();

        let conn = Connection::open_in_memory().unwrap();
        export_to_connection(&conn, &remapped).unwrap();

        let name: String = conn
            .query_row("SELECT name FROM machines WHERE id = 0", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "pacman");

        let description: String = conn
            .query_row("SELECT description FROM machines WHERE id = 0", [], |row| row.get(0))
            .unwrap();
        assert_eq!(description, "Pac-Man");

        let rom_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM machine_roms", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rom_count, 1);
    }
}
