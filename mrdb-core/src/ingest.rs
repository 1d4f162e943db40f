//! Streaming ingestion of DAT documents into filtered `(MachineRecord,
//! Vec<RomRecord>)` pairs (§4.1).
//!
//! Parsing uses `quick-xml`'s pull-based `Reader`, the same crate and idiom
//! this codebase's original DAT reader used for Logiqx documents. Each
//! `<machine>` (or `<game>`; both recognized identically) is emitted as soon
//! as its closing tag is seen and its subtree discarded, so the working set
//! during ingestion is one machine at a time, never a whole document.

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::IngestError;

/// A machine as extracted from the source document, before catalogue
/// interning. Raw `cloneof`/`romof` are kept as names; the Catalogue resolves
/// them to ids once every document has been ingested (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRecord {
    pub name: String,
    pub cloneof: Option<String>,
    pub romof: Option<String>,
    pub description: Option<String>,
    pub year: Option<u16>,
    pub manufacturer: Option<String>,
}

/// A single surviving `<rom>` child of a machine, after per-ROM filtering
/// (§4.1). `size_pow2` has already been validated as a power of two within
/// the ingest-time band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomRecord {
    pub name: String,
    pub size_pow2: u8,
    pub sha1: [u8; 20],
    pub crc: Option<[u8; 4]>,
}

/// Bounds applied to each `<rom>`'s raw byte `size` attribute before it is
/// even considered for a `size_pow2` class (§4.1 rule 2). Distinct from, and
/// not derived from, `BuildConfig::min_size_pow2`/`max_size_pow2`, which is
/// the Remapper's separate, independently-configured band (§4.4).
#[derive(Debug, Clone, Copy)]
pub struct IngestBounds {
    pub min_rom_size: u64,
    pub max_rom_size: u64,
}

/// One named XML byte stream, as yielded by a `DatSource`.
pub struct DatDocument<R: BufRead> {
    pub name: String,
    pub reader: R,
}

/// Abstracts acquisition of DAT documents. The Ingestor consumes anything
/// implementing this trait; document ordering (the "mame-first, no-mess"
/// rule of §4.2) is the caller's responsibility, applied before documents
/// reach the Ingestor.
pub trait DatSource {
    type Reader: BufRead;

    /// Yields documents in the order they should be ingested.
    fn documents(&self) -> Result<Vec<DatDocument<Self::Reader>>, IngestError>;
}

/// A `DatSource` backed by `*.xml`/`*.dat` files in a directory. The default,
/// concrete collaborator used by the CLI. Network fetch and archive
/// extraction are out of scope (§1) and are not implemented here.
pub struct FilesystemDatSource {
    dir: PathBuf,
}

impl FilesystemDatSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DatSource for FilesystemDatSource {
    type Reader = std::io::BufReader<fs::File>;

    fn documents(&self) -> Result<Vec<DatDocument<Self::Reader>>, IngestError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("xml") || e.eq_ignore_ascii_case("dat"))
                .unwrap_or(false);
            if ext_ok {
                paths.push(path);
            }
        }

        paths.sort_by(|a, b| mame_first_key(a).cmp(&mame_first_key(b)).then_with(|| a.cmp(b)));

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file = fs::File::open(&path)?;
            docs.push(DatDocument {
                name,
                reader: std::io::BufReader::new(file),
            });
        }
        Ok(docs)
    }
}

/// Sorts documents whose basename starts with "mame" and does not contain
/// "mess" before everything else (§4.2). `0` sorts first.
fn mame_first_key(path: &Path) -> u8 {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if stem.starts_with("mame") && !stem.contains("mess") {
        0
    } else {
        1
    }
}

/// Streams a single DAT document, applying the per-machine and per-ROM
/// filtering rules of §4.1 and invoking `on_machine` for every machine that
/// survives with at least one ROM.
pub fn ingest_document<R: BufRead>(
    reader: R,
    bounds: IngestBounds,
    mut on_machine: impl FnMut(MachineRecord, Vec<RomRecord>),
) -> Result<(), IngestError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current_tag = String::new();
    let mut in_current_field = false;

    let mut cursor = Cursor::AwaitingMachine;
    let mut current_machine: Option<MachineRecord> = None;
    let mut current_roms: Vec<RomRecord> = Vec::new();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let tag = local_name(e);
                if is_machine_tag(&tag) {
                    current_machine = Some(start_machine(e)?);
                    current_roms = Vec::new();
                    cursor = Cursor::InsideMachine;
                } else if cursor == Cursor::InsideMachine {
                    current_tag = tag;
                    in_current_field = matches!(
                        current_tag.as_str(),
                        "description" | "year" | "manufacturer"
                    );
                }
            }
            Event::Empty(ref e) => {
                let tag = local_name(e);
                if cursor == Cursor::InsideMachine && tag == "rom" {
                    if let Some(rom) = extract_rom(e, bounds)? {
                        current_roms.push(rom);
                    }
                }
            }
            Event::Text(ref e) => {
                if cursor == Cursor::InsideMachine && in_current_field {
                    let text = e.unescape()?.into_owned();
                    if let Some(machine) = current_machine.as_mut() {
                        apply_field(machine, &current_tag, text);
                    }
                }
            }
            Event::End(ref e) => {
                let tag = local_name(e);
                if cursor == Cursor::InsideMachine && is_machine_tag(&tag) {
                    cursor = Cursor::Emitted;
                    if let Some(machine) = current_machine.take() {
                        if !machine.name.is_empty() && !current_roms.is_empty() {
                            on_machine(machine, std::mem::take(&mut current_roms));
                        }
                    }
                    cursor = Cursor::AwaitingMachine;
                } else if cursor == Cursor::InsideMachine {
                    in_current_field = false;
                    current_tag.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    AwaitingMachine,
    InsideMachine,
    Emitted,
}

fn is_machine_tag(tag: &str) -> bool {
    tag == "machine" || tag == "game"
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn start_machine(e: &BytesStart<'_>) -> Result<MachineRecord, IngestError> {
    let mut name = String::new();
    let mut cloneof = None;
    let mut romof = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"name" => name = String::from_utf8_lossy(&attr.value).into_owned(),
            b"cloneof" => cloneof = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"romof" => romof = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            _ => {}
        }
    }
    Ok(MachineRecord {
        name,
        cloneof,
        romof,
        description: None,
        year: None,
        manufacturer: None,
    })
}

fn apply_field(machine: &mut MachineRecord, tag: &str, text: String) {
    match tag {
        "description" => machine.description = Some(text),
        "manufacturer" => machine.manufacturer = Some(text),
        "year" => {
            // Only the first four characters are significant; parse failure
            // or absence leaves the year null (§4.1).
            let year = text.get(0..4).and_then(|s| s.parse::<u16>().ok());
            machine.year = year;
        }
        _ => {}
    }
}

fn extract_rom(
    e: &BytesStart<'_>,
    bounds: IngestBounds,
) -> Result<Option<RomRecord>, IngestError> {
    let mut name = String::new();
    let mut size: Option<u64> = None;
    let mut crc_hex: Option<String> = None;
    let mut sha1_hex: Option<String> = None;

    for attr in e.attributes() {
        let attr = attr?;
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.as_ref() {
            b"name" => name = value,
            b"size" => size = value.parse::<u64>().ok(),
            b"crc" => crc_hex = Some(value),
            b"sha1" => sha1_hex = Some(value),
            _ => {}
        }
    }

    // Rule 1: unparseable or non-positive size.
    let Some(size) = size.filter(|s| *s > 0) else {
        return Ok(None);
    };
    // Rule 2: outside the configured ingest-time byte band.
    if size < bounds.min_rom_size || size > bounds.max_rom_size {
        return Ok(None);
    }
    // Rule 3: not a power of two.
    let Some(size_pow2) = crate::model::size_to_pow2(size) else {
        return Ok(None);
    };
    // Rule 4: missing or malformed SHA-1.
    let Some(sha1) = sha1_hex.as_deref().and_then(parse_hex20) else {
        return Ok(None);
    };

    let crc = crc_hex.as_deref().and_then(parse_hex4);

    Ok(Some(RomRecord {
        name,
        size_pow2,
        sha1,
        crc,
    }))
}

fn parse_hex20(s: &str) -> Option<[u8; 20]> {
    if s.len() != 40 {
        return None;
    }
    let mut out = [0u8; 20];
    for (i, chunk) in out.iter_mut().enumerate() {
        *chunk = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

fn parse_hex4(s: &str) -> Option<[u8; 4]> {
    if s.len() != 8 {
        return None;
    }
    let mut out = [0u8; 4];
    for (i, chunk) in out.iter_mut().enumerate() {
        *chunk = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: IngestBounds = IngestBounds {
        min_rom_size: 256,
        max_rom_size: 8 * 1024 * 1024,
    };

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<datafile>
    <machine name="pacman">
        <description>Pac-Man</description>
        <year>1980</year>
        <manufacturer>Namco</manufacturer>
        <rom name="pacman.6e" size="16384" crc="c1e6ab10" sha1="e87e059c5be45753f7e9f33dff851f16d6751183"/>
    </machine>
    <machine name="nodump_machine">
        <rom name="bad.bin" size="16384" sha1=""/>
    </machine>
</datafile>"#;

    #[test]
    fn single_machine_single_valid_rom() {
        let mut emitted = Vec::new();
        ingest_document(SAMPLE.as_bytes(), BOUNDS, |m, roms| emitted.push((m, roms))).unwrap();

        assert_eq!(emitted.len(), 1);
        let (machine, roms) = &emitted[0];
        assert_eq!(machine.name, "pacman");
        assert_eq!(machine.year, Some(1980));
        assert_eq!(machine.manufacturer.as_deref(), Some("Namco"));
        assert_eq!(roms.len(), 1);
        assert_eq!(roms[0].size_pow2, 14);
    }

    #[test]
    fn machine_with_no_surviving_roms_is_absent() {
        let mut emitted = Vec::new();
        ingest_document(SAMPLE.as_bytes(), BOUNDS, |m, roms| emitted.push((m, roms))).unwrap();
        assert!(!emitted.iter().any(|(m, _)| m.name == "nodump_machine"));
    }

    #[test]
    fn size_filter_drops_out_of_band_and_non_power_of_two() {
        let xml = r#"<datafile>
            <machine name="edge">
                <rom name="too_small.bin" size="100" sha1="0000000000000000000000000000000000000a"/>
                <rom name="not_pow2.bin" size="100000" sha1="0000000000000000000000000000000000000b"/>
                <rom name="ok.bin" size="256" sha1="0000000000000000000000000000000000000c"/>
            </machine>
        </datafile>"#;
        let mut emitted = Vec::new();
        ingest_document(xml.as_bytes(), BOUNDS, |m, roms| emitted.push((m, roms))).unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].1.len(), 1);
        assert_eq!(emitted[0].1[0].name, "ok.bin");
    }

    #[test]
    fn game_tag_is_equivalent_to_machine_tag() {
        let xml = r#"<datafile>
            <game name="galaga">
                <rom name="galaga.bin" size="512" sha1="00000000000000000000000000000000000001"/>
            </game>
        </datafile>"#;
        let mut emitted = Vec::new();
        ingest_document(xml.as_bytes(), BOUNDS, |m, roms| emitted.push((m, roms))).unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0.name, "galaga");
    }

    #[test]
    fn missing_sha1_drops_the_rom() {
        let xml = r#"<datafile>
            <machine name="m">
                <rom name="nodump.bin" size="256"/>
            </machine>
        </datafile>"#;
        let mut emitted = Vec::new();
        ingest_document(xml.as_bytes(), BOUNDS, |m, roms| emitted.push((m, roms))).unwrap();
        assert!(emitted.is_empty());
    }

    #[test]
    fn mame_first_sorts_before_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zzz.xml"), "<datafile/>").unwrap();
        std::fs::write(dir.path().join("mame.xml"), "<datafile/>").unwrap();
        std::fs::write(dir.path().join("mamemess.xml"), "<datafile/>").unwrap();

        let source = FilesystemDatSource::new(dir.path());
        let docs = source.documents().unwrap();
        assert_eq!(docs[0].name, "mame.xml");
    }
}
