use thiserror::Error;

/// Soft-tier failures never surface past the Ingestor: malformed individual
/// fields are silently dropped per §4.1. This type exists only for the
/// document-level (hard) failure mode — an XML stream that cannot be parsed
/// at all.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error reading DAT document: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),
}

/// Build-level (hard) failures, surfaced to the caller. No partial blob is
/// ever written once one of these is returned.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("ingest failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("size class {size_pow2} holds {count} ROMs, exceeding the 16-bit index limit")]
    SizeClassOverflow { size_pow2: u8, count: usize },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("I/O error writing blob: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite-export")]
    #[error("sqlite export failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl BuildError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}
