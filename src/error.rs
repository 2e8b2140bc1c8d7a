use std::path::PathBuf;

/// Failures raised by the split, sort and merge engines.
///
/// I/O errors are not part of this enum. They travel as [std::io::Error] wrapped in an
/// [anyhow::Error] with the offending path attached as context.
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// A caller supplied argument or configuration value was rejected before any I/O took place.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bulk transfer or write moved zero bytes while bytes remained.
    #[error("no progress while writing {path}: position {position}, remaining {remaining} bytes")]
    NoProgress {
        path: PathBuf,
        position: u64,
        remaining: u64,
    },

    /// The requested combination of modes is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SortError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(SortError::InvalidConfig(message.into()))
    }
}
