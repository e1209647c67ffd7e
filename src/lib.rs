//! vatform - resin (mSLA/DLP) printer print-job files
//!
//! Decode, edit and re-encode vendor print-job containers through one
//! uniform model: an ordered layer sequence with geometry, exposure and
//! motion parameters, global machine settings and preview thumbnails.
//!
//! Entry points:
//! - [`formats`] / [`descriptor_for_path`] - the extension registry
//! - [`open`] - decode a file into a [`PrintFile`] handle
//! - [`create`] - an empty handle for building a job from scratch

pub mod error;
pub mod format;
pub mod job;
pub mod layer;
pub mod params;
pub mod progress;

pub use error::{DecodeError, EncodeError, LayerError, ParameterError};
pub use format::{
    create, create_for_path, descriptor_for_path, formats, open, Codec, ContainerKind,
    FileExtension, FormatDescriptor,
};
pub use job::{GlobalParameters, PrintFile, PrintJob, Thumbnail};
pub use layer::{Layer, LayerCollection};
pub use params::{ParameterId, ParameterModifier, ParameterScope, SpeedUnit};
pub use progress::{Progress, ProgressUpdate};
