//! Error types shared across the engine

use thiserror::Error;

/// Failures raised while measuring or laying out content.
///
/// None of these interrupt editing; callers degrade instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("measurement oracle unavailable: {0}")]
    MeasurementUnavailable(String),

    #[error("invalid container metrics: {0}")]
    InvalidMetrics(String),
}

/// Failures raised by document mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("unknown section: {0}")]
    UnknownSection(String),

    #[error("offset {offset} is not a valid position in a {len}-byte section")]
    InvalidOffset { offset: usize, len: usize },

    #[error("unknown image: {0}")]
    UnknownImage(u64),

    #[error("unknown image asset: {0}")]
    UnknownAsset(String),

    #[error("unknown blank page: {0}")]
    UnknownBlankPage(u64),

    #[error("no drag gesture in progress")]
    NoGesture,
}

/// Failures raised by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("storage quota exceeded ({needed} bytes requested)")]
    QuotaExceeded { needed: usize },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored payload is corrupt: {0}")]
    Corrupt(String),
}

/// Failures raised by the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("an export is already in progress")]
    ConcurrentExport,

    #[error("export cancelled")]
    Cancelled,

    #[error("layout failed: {0}")]
    Layout(#[from] LayoutError),

    #[error("rasterization failed: {0}")]
    Raster(String),

    #[error("document assembly failed: {0}")]
    Assembly(String),

    #[error("export aborted after {completed} pages: {source}")]
    Aborted {
        completed: usize,
        #[source]
        source: Box<ExportError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error for the editor facade.
#[derive(Debug, Error)]
pub enum BookError {
    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(u64),
}

pub type Result<T, E = BookError> = std::result::Result<T, E>;
