//! The catalogue-to-embedded-blob compiler. The pipeline is strictly
//! linear: [`ingest`] → [`catalogue`] → [`postprocess`] → [`remap`] →
//! [`pool`] → [`blob`]. No stage reads the output of a later one.

pub mod blob;
pub mod catalogue;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pool;
pub mod postprocess;
pub mod remap;

#[cfg(feature = "sqlite-export")]
pub mod sqlite_export;

pub use blob::{BlobError, BlobReader};
pub use catalogue::Catalogue;
pub use config::BuildConfig;
pub use error::{BuildError, IngestError};
pub use ingest::{DatDocument, DatSource, FilesystemDatSource, IngestBounds};
pub use remap::{RemappedCatalogue, SizeIndex};

/// Runs the full pipeline over every document a `DatSource` yields,
/// returning the remapped catalogue ready for [`blob::write_blob`] and,
/// optionally, [`sqlite_export::export`].
pub fn build<S: DatSource>(source: &S, config: &BuildConfig) -> Result<RemappedCatalogue, BuildError> {
    let bounds = ingest::IngestBounds {
        min_rom_size: config.min_rom_size,
        max_rom_size: config.max_rom_size,
    };

    let mut catalogue = Catalogue::new();
    for doc in source.documents().map_err(BuildError::Ingest)? {
        ingest::ingest_document(doc.reader, bounds, |machine, roms| {
            catalogue.add_machine(machine, roms);
        })
        .map_err(BuildError::Ingest)?;
    }
    catalogue.resolve_parents();

    postprocess::run(&mut catalogue, config);
    remap::remap(&catalogue, config)
}
