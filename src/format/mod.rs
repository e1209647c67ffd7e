//! Format registry and the codec extension points.
//!
//! Each vendor format contributes one static [`FormatDescriptor`] (container
//! kind, extensions, thumbnail sizes, modifier lists, native speed unit) and
//! one [`Codec`] implementation. Everything else (atomic writes, failure
//! reset, capability checks, progress plumbing) is shared in
//! [`crate::job::PrintFile`].

pub mod pwsz;

use std::path::Path;

use crate::error::{DecodeError, EncodeError};
use crate::job::{PrintFile, PrintJob};
use crate::params::{ParameterId, ParameterModifier, SpeedUnit};
use crate::progress::Progress;

/// Physical layout of a format's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Zip-style archive with named entries.
    Archive,
    /// Single binary blob with fixed offsets.
    FlatBinary,
}

/// One file extension a format claims, with its menu label.
#[derive(Debug, Clone, Copy)]
pub struct FileExtension {
    pub extension: &'static str,
    pub description: &'static str,
}

/// Static capability declaration for one vendor format.
#[derive(Debug)]
pub struct FormatDescriptor {
    pub name: &'static str,
    pub container: ContainerKind,
    /// The format's native speed unit; canonical values convert through it
    /// at the decode/encode boundary.
    pub speed_unit: SpeedUnit,
    pub extensions: &'static [FileExtension],
    /// Declared preview sizes, written under the format's fixed name pattern.
    pub thumbnail_sizes: &'static [(u32, u32)],
    pub global_modifiers: &'static [ParameterModifier],
    pub per_layer_modifiers: &'static [ParameterModifier],
}

impl FormatDescriptor {
    pub fn supports_global(&self, id: ParameterId) -> bool {
        self.global_modifier(id).is_some()
    }

    pub fn supports_per_layer(&self, id: ParameterId) -> bool {
        self.per_layer_modifier(id).is_some()
    }

    pub fn global_modifier(&self, id: ParameterId) -> Option<&ParameterModifier> {
        self.global_modifiers.iter().find(|m| m.id == id)
    }

    pub fn per_layer_modifier(&self, id: ParameterId) -> Option<&ParameterModifier> {
        self.per_layer_modifiers.iter().find(|m| m.id == id)
    }

    /// Case-insensitive extension match.
    pub fn matches_path(&self, path: &Path) -> bool {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return false,
        };
        self.extensions.iter().any(|fe| fe.extension == ext)
    }
}

/// The required per-format behavior; four extension points, nothing more.
///
/// Implementations own the format-native manifests and keep them apart from
/// the canonical model: `before_encode` is the only place native fields are
/// recomputed, and it must be idempotent.
pub trait Codec: Send {
    /// Recomputes every derived manifest field from the live canonical
    /// model. Always runs before serialization, for both full encode and
    /// partial save.
    fn before_encode(&mut self, job: &PrintJob, is_partial: bool);

    /// Reads the container at `path` into `job`. The caller resets the model
    /// on any error; implementations just report it.
    fn decode(
        &mut self,
        job: &mut PrintJob,
        path: &Path,
        progress: &Progress,
    ) -> Result<(), DecodeError>;

    /// Writes the full container to `path` (a temporary location; the caller
    /// swaps it into place).
    fn encode(
        &mut self,
        job: &PrintJob,
        path: &Path,
        progress: &Progress,
    ) -> Result<(), EncodeError>;

    /// Rewrites manifest entries into `dest`, reusing raster payloads from
    /// `source`. Defaults to a full re-encode; formats with separable
    /// manifest/raster storage should specialize it.
    fn partial_save(
        &mut self,
        job: &PrintJob,
        source: &Path,
        dest: &Path,
        progress: &Progress,
    ) -> Result<(), EncodeError> {
        let _ = source;
        self.encode(job, dest, progress)
    }
}

/// Every registered format, in menu order.
pub fn formats() -> &'static [&'static FormatDescriptor] {
    static FORMATS: &[&FormatDescriptor] = &[&pwsz::DESCRIPTOR];
    FORMATS
}

/// Resolves a path to its format descriptor by extension.
pub fn descriptor_for_path(path: &Path) -> Option<&'static FormatDescriptor> {
    formats().iter().copied().find(|d| d.matches_path(path))
}

fn codec_for(descriptor: &'static FormatDescriptor) -> Box<dyn Codec> {
    // One arm per registered format.
    debug_assert!(std::ptr::eq(descriptor, &pwsz::DESCRIPTOR));
    Box::new(pwsz::PwszCodec::default())
}

/// An empty handle for `descriptor`, ready for `init`/`decode`.
pub fn create(descriptor: &'static FormatDescriptor) -> PrintFile {
    PrintFile::new(descriptor, codec_for(descriptor))
}

/// An empty handle for whatever format claims `path`'s extension.
pub fn create_for_path(path: &Path) -> Result<PrintFile, DecodeError> {
    let descriptor = descriptor_for_path(path)
        .ok_or_else(|| DecodeError::UnknownFormat(path.display().to_string()))?;
    Ok(create(descriptor))
}

/// Resolves the format for `path` and decodes it in one step.
pub fn open(path: &Path, progress: &Progress) -> Result<PrintFile, DecodeError> {
    let mut file = create_for_path(path)?;
    file.decode(path, progress)?;
    Ok(file)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_not_empty() {
        assert!(!formats().is_empty());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert!(descriptor_for_path(Path::new("job.PWSZ")).is_some());
        assert!(descriptor_for_path(Path::new("job.pm7")).is_some());
        assert!(descriptor_for_path(Path::new("job.stl")).is_none());
        assert!(descriptor_for_path(Path::new("noext")).is_none());
    }

    #[test]
    fn unknown_format_error() {
        let err = create_for_path(Path::new("model.obj")).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownFormat(_)));
    }
}
