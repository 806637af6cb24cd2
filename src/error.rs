//! Error types for the NPP/NCEI pipeline.
//!
//! Pixel-level problems never show up here: they become masked pixels. These
//! errors cover image-level and run-level failures only.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, processing or exporting rasters.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An image is missing a band that an operation needs.
    #[error("image {image} has no band '{band}'")]
    MissingBand { image: String, band: String },

    /// A collection that must contain images is empty.
    #[error("collection '{0}' is empty")]
    EmptyCollection(String),

    /// Two rasters that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Rasters in different coordinate systems cannot be combined.
    #[error("CRS mismatch: expected {expected}, got {actual}")]
    CrsMismatch { expected: String, actual: String },

    /// A GeoTIFF carries no usable georeferencing tags.
    #[error("missing georeferencing in {0:?}")]
    MissingGeoreference(PathBuf),

    /// Failed to decode a raster file.
    #[error("failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Export failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn missing_band(image: impl Into<String>, band: impl Into<String>) -> Self {
        Self::MissingBand {
            image: image.into(),
            band: band.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal export failures. Exports are attempted once and never retried.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export of {pixels} pixels exceeds the ceiling of {max_pixels}")]
    TooManyPixels { pixels: u64, max_pixels: u64 },

    #[error("export CRS {requested} does not match data CRS {data}")]
    CrsMismatch { requested: String, data: String },

    #[error("invalid export scale {0}")]
    InvalidScale(f64),

    #[error("failed to write {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
