use thiserror::Error;

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("build failed: {0}")]
    Build(#[from] mrdb_core::BuildError),

    #[error("could not read blob: {0}")]
    Blob(#[from] mrdb_core::BlobError),

    #[error("verification failed: {0}")]
    Verify(String),
}

impl CliError {
    pub(crate) fn verify(msg: impl Into<String>) -> Self {
        Self::Verify(msg.into())
    }
}
