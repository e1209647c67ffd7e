//! Error types for decode, encode and parameter editing.

use crate::params::{ParameterId, ParameterScope};

/// Errors raised while decoding a print file.
///
/// Any of these force the in-memory model back to the empty state.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("missing mandatory entry '{0}'")]
    MissingEntry(&'static str),

    #[error("corrupt entry '{entry}': {cause}")]
    Corrupt { entry: String, cause: String },

    #[error("file declares zero layers")]
    EmptyJob,

    #[error("unrecognized file extension: {0}")]
    UnknownFormat(String),

    #[error("decode cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised while encoding or partial-saving a print file.
///
/// None of these touch the in-memory model; a failed write never leaves a
/// truncated file at the target path.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encode cancelled")]
    Cancelled,

    #[error("no file path set; decode from or encode to a path first")]
    NoFilePath,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Raster(#[from] LayerError),

    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

/// Errors raised by the per-layer raster contract.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("raster is {actual_width}x{actual_height} but job resolution is {width}x{height}")]
    RasterMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("layer {0} has no raster data")]
    NoRaster(u32),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised by capability-checked parameter edits.
///
/// `Unsupported` signals a caller contract violation: consult
/// `supports_global`/`supports_per_layer` before editing.
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("format '{format}' does not support editing '{id}' ({scope})")]
    Unsupported {
        format: &'static str,
        id: ParameterId,
        scope: ParameterScope,
    },

    #[error("value {value} for '{id}' outside allowed range {min}..={max}")]
    OutOfRange {
        id: ParameterId,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("layer index {0} out of bounds")]
    LayerOutOfBounds(u32),
}
