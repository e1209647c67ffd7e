//! The uniform print-job model and the decode/encode/partial-save lifecycle.
//!
//! [`PrintJob`] is the format-independent model: ordered layers, global
//! machine parameters and preview thumbnails. [`PrintFile`] pairs one job
//! with one concrete codec and owns the lifecycle: container I/O goes to the
//! codec, while atomicity (temp-file swap), failure reset and capability
//! checks live here so every format behaves the same.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{DecodeError, EncodeError, LayerError, ParameterError};
use crate::format::{Codec, FormatDescriptor};
use crate::layer::{Layer, LayerCollection};
use crate::params::{round_height, round_value, ParameterId, ParameterScope};
use crate::progress::Progress;

/// Canonical global machine/print parameters.
///
/// These are distinct from any format-native manifest fields; the two are
/// synchronized only by the explicit post-decode and pre-encode steps.
#[derive(Debug, Clone, Default)]
pub struct GlobalParameters {
    pub resolution_x: u32,
    pub resolution_y: u32,
    /// Display dimensions in millimeters.
    pub display_width: f32,
    pub display_height: f32,
    /// Maximum build height in millimeters.
    pub machine_z: f32,
    pub machine_name: String,
    /// Uniform layer thickness in millimeters.
    pub layer_height: f32,
    pub bottom_layer_count: u16,
    pub transition_layer_count: u16,
    /// Exposure times in seconds.
    pub bottom_exposure_time: f32,
    pub exposure_time: f32,
    /// Lift heights in millimeters, lift speeds in mm/min (canonical).
    pub bottom_lift_height: f32,
    pub bottom_lift_speed: f32,
    pub lift_height: f32,
    pub lift_speed: f32,
    /// Print metadata: estimated seconds, currency units, milliliters.
    pub print_time: f32,
    pub material_cost: f32,
    pub volume: f32,
}

impl GlobalParameters {
    /// Pixel pitch in micrometers, derived from display size and resolution.
    pub fn pixel_width_microns(&self) -> f32 {
        if self.resolution_x == 0 {
            return 0.0;
        }
        self.display_width / self.resolution_x as f32 * 1000.0
    }

    pub fn pixel_height_microns(&self) -> f32 {
        if self.resolution_y == 0 {
            return 0.0;
        }
        self.display_height / self.resolution_y as f32 * 1000.0
    }
}

/// Fixed-dimension preview raster, regenerated from preview geometry.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub image: RgbaImage,
}

impl Thumbnail {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// The uniform model every format decodes into and encodes from.
#[derive(Debug, Clone, Default)]
pub struct PrintJob {
    pub globals: GlobalParameters,
    layers: LayerCollection,
    thumbnails: Vec<Thumbnail>,
}

impl PrintJob {
    pub fn layer_count(&self) -> u32 {
        self.layers.len()
    }

    pub fn layers(&self) -> &LayerCollection {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerCollection {
        &mut self.layers
    }

    pub fn thumbnails(&self) -> &[Thumbnail] {
        &self.thumbnails
    }

    pub(crate) fn push_thumbnail(&mut self, image: RgbaImage) {
        self.thumbnails.push(Thumbnail { image });
    }

    /// Allocates `count` fresh layers, replacing the current sequence.
    pub fn init(&mut self, count: u32) {
        self.layers.init(count);
    }

    /// Resets to the empty state. The only full reset; also runs on any
    /// decode failure.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.thumbnails.clear();
        self.globals = GlobalParameters::default();
    }

    /// Post-decode step: derive canonical globals from the layer sequence.
    ///
    /// Bottom values come from the first layer, normal values from the last;
    /// layer height is the last relative thickness.
    pub fn update_globals_from_layers(&mut self) {
        let (first, last) = match (self.layers.first(), self.layers.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return,
        };

        let previous_z = if self.layers.len() > 1 {
            self.layers
                .get(last.index() - 1)
                .map(|l| l.position_z)
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let layer_height = last.relative_z(previous_z);

        // Formats without an explicit bottom layer count on the wire get it
        // from the leading run of first-layer exposure.
        if first.exposure_time != last.exposure_time {
            let bottoms = self
                .layers
                .iter()
                .take_while(|l| l.exposure_time == first.exposure_time)
                .count();
            self.globals.bottom_layer_count = bottoms.min(u16::MAX as usize) as u16;
        }

        self.globals.bottom_exposure_time = first.exposure_time;
        self.globals.bottom_lift_height = first.lift_height;
        self.globals.bottom_lift_speed = first.lift_speed;
        self.globals.exposure_time = last.exposure_time;
        self.globals.lift_height = last.lift_height;
        self.globals.lift_speed = last.lift_speed;
        self.globals.layer_height = layer_height;
    }

    pub(crate) fn validate(&self) -> Result<(), DecodeError> {
        if self.layers.is_empty() {
            return Err(DecodeError::EmptyJob);
        }
        if !self.layers.is_well_formed() {
            return Err(DecodeError::Corrupt {
                entry: "layer table".to_string(),
                cause: "non-contiguous indices or decreasing Z".to_string(),
            });
        }
        Ok(())
    }
}

/// One job bound to one format codec; the single-writer handle every
/// operation takes explicitly (no ambient "current file").
pub struct PrintFile {
    descriptor: &'static FormatDescriptor,
    codec: Box<dyn Codec>,
    job: PrintJob,
    path: Option<PathBuf>,
    max_parallelism: Option<usize>,
}

impl std::fmt::Debug for PrintFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintFile")
            .field("descriptor", &self.descriptor)
            .field("job", &self.job)
            .field("path", &self.path)
            .field("max_parallelism", &self.max_parallelism)
            .finish_non_exhaustive()
    }
}

impl PrintFile {
    pub(crate) fn new(descriptor: &'static FormatDescriptor, codec: Box<dyn Codec>) -> Self {
        Self {
            descriptor,
            codec,
            job: PrintJob::default(),
            path: None,
            max_parallelism: None,
        }
    }

    pub fn descriptor(&self) -> &'static FormatDescriptor {
        self.descriptor
    }

    pub fn job(&self) -> &PrintJob {
        &self.job
    }

    /// Direct model access for construction paths (slicers, converters).
    /// Format-parameter edits should go through the capability-checked
    /// setters instead.
    pub fn job_mut(&mut self) -> &mut PrintJob {
        &mut self.job
    }

    /// The path of the last successful decode or encode.
    pub fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn layer_count(&self) -> u32 {
        self.job.layer_count()
    }

    pub fn layer(&self, index: u32) -> Option<&Layer> {
        self.job.layers.get(index)
    }

    pub fn init(&mut self, layer_count: u32) {
        self.job.init(layer_count);
    }

    pub fn clear(&mut self) {
        self.job.clear();
        self.path = None;
    }

    /// Caps the worker count of the parallel raster phase.
    pub fn set_max_parallelism(&mut self, threads: usize) {
        self.max_parallelism = Some(threads.max(1));
    }

    /// Regenerates one thumbnail per declared size from a single preview
    /// render.
    pub fn set_preview(&mut self, source: &RgbaImage) {
        self.job.thumbnails.clear();
        for &(width, height) in self.descriptor.thumbnail_sizes {
            let image = if source.width() == width && source.height() == height {
                source.clone()
            } else {
                image::imageops::resize(
                    source,
                    width,
                    height,
                    image::imageops::FilterType::Lanczos3,
                )
            };
            self.job.push_thumbnail(image);
        }
    }

    // ---- capability queries and checked edits ----

    pub fn supports_global(&self, id: ParameterId) -> bool {
        self.descriptor.supports_global(id)
    }

    pub fn supports_per_layer(&self, id: ParameterId) -> bool {
        self.descriptor.supports_per_layer(id)
    }

    /// Sets a global parameter, propagating to the affected layers so the
    /// rebuilt per-layer manifests pick the edit up at encode time.
    pub fn set_global(&mut self, id: ParameterId, value: f32) -> Result<(), ParameterError> {
        let modifier = self
            .descriptor
            .global_modifier(id)
            .ok_or(ParameterError::Unsupported {
                format: self.descriptor.name,
                id,
                scope: ParameterScope::Global,
            })?;
        if !modifier.contains(value) {
            return Err(ParameterError::OutOfRange {
                id,
                value,
                min: modifier.min,
                max: modifier.max,
            });
        }

        let globals = &mut self.job.globals;
        let bottoms = globals.bottom_layer_count as u32;
        match id {
            ParameterId::BottomLayerCount => globals.bottom_layer_count = value as u16,
            ParameterId::TransitionLayerCount => globals.transition_layer_count = value as u16,
            ParameterId::BottomExposureTime => {
                globals.bottom_exposure_time = round_value(value);
                for layer in self.job.layers.iter_mut().take(bottoms as usize) {
                    layer.exposure_time = round_value(value);
                }
            }
            ParameterId::ExposureTime => {
                globals.exposure_time = round_value(value);
                for layer in self.job.layers.iter_mut().skip(bottoms as usize) {
                    layer.exposure_time = round_value(value);
                }
            }
            ParameterId::BottomLiftHeight => {
                globals.bottom_lift_height = round_value(value);
                for layer in self.job.layers.iter_mut().take(bottoms as usize) {
                    layer.lift_height = round_value(value);
                }
            }
            ParameterId::BottomLiftSpeed => {
                globals.bottom_lift_speed = round_value(value);
                for layer in self.job.layers.iter_mut().take(bottoms as usize) {
                    layer.lift_speed = round_value(value);
                }
            }
            ParameterId::LiftHeight => {
                globals.lift_height = round_value(value);
                for layer in self.job.layers.iter_mut().skip(bottoms as usize) {
                    layer.lift_height = round_value(value);
                }
            }
            ParameterId::LiftSpeed => {
                globals.lift_speed = round_value(value);
                for layer in self.job.layers.iter_mut().skip(bottoms as usize) {
                    layer.lift_speed = round_value(value);
                }
            }
            ParameterId::PositionZ => {
                // Declared per-layer only by every known format; unreachable
                // through a global modifier list.
            }
        }
        Ok(())
    }

    /// Sets one parameter on one layer.
    pub fn set_layer_value(
        &mut self,
        index: u32,
        id: ParameterId,
        value: f32,
    ) -> Result<(), ParameterError> {
        let modifier = self
            .descriptor
            .per_layer_modifier(id)
            .ok_or(ParameterError::Unsupported {
                format: self.descriptor.name,
                id,
                scope: ParameterScope::PerLayer,
            })?;
        if !modifier.contains(value) {
            return Err(ParameterError::OutOfRange {
                id,
                value,
                min: modifier.min,
                max: modifier.max,
            });
        }
        let layer = self
            .job
            .layers
            .get_mut(index)
            .ok_or(ParameterError::LayerOutOfBounds(index))?;
        match id {
            ParameterId::PositionZ => layer.position_z = round_height(value),
            ParameterId::ExposureTime | ParameterId::BottomExposureTime => {
                layer.exposure_time = round_value(value)
            }
            ParameterId::LiftHeight | ParameterId::BottomLiftHeight => {
                layer.lift_height = round_value(value)
            }
            ParameterId::LiftSpeed | ParameterId::BottomLiftSpeed => {
                layer.lift_speed = round_value(value)
            }
            ParameterId::BottomLayerCount | ParameterId::TransitionLayerCount => {
                // Counts are global-only; no per-layer modifier declares them.
            }
        }
        Ok(())
    }

    /// Installs a new raster bitmap on a layer, validated against the job
    /// resolution.
    pub fn set_layer_bitmap(
        &mut self,
        index: u32,
        bitmap: image::GrayImage,
    ) -> Result<(), LayerError> {
        let (width, height) = (self.job.globals.resolution_x, self.job.globals.resolution_y);
        let layer = self
            .job
            .layers
            .get_mut(index)
            .ok_or(LayerError::NoRaster(index))?;
        layer.set_bitmap(bitmap, width, height)
    }

    // ---- lifecycle ----

    /// Decodes `path` into this handle, replacing any current model.
    ///
    /// Any failure resets the model to empty before returning.
    pub fn decode(&mut self, path: &Path, progress: &Progress) -> Result<(), DecodeError> {
        tracing::info!("[{}] decoding {:?}", self.descriptor.name, path);
        self.job.clear();
        self.path = None;

        let result = self
            .codec
            .decode(&mut self.job, path, progress)
            .and_then(|()| self.job.validate());
        match result {
            Ok(()) => {
                self.path = Some(path.to_path_buf());
                tracing::info!(
                    "[{}] decoded {} layers, {}x{}",
                    self.descriptor.name,
                    self.job.layer_count(),
                    self.job.globals.resolution_x,
                    self.job.globals.resolution_y
                );
                Ok(())
            }
            Err(e) => {
                self.job.clear();
                Err(e)
            }
        }
    }

    /// Encodes the full container to `path` via a temporary sibling file,
    /// swapped into place only on success.
    pub fn encode(&mut self, path: &Path, progress: &Progress) -> Result<(), EncodeError> {
        tracing::info!("[{}] encoding {:?}", self.descriptor.name, path);
        self.flush_dirty_rasters()?;
        self.codec.before_encode(&self.job, false);

        let tmp = temp_output_path(path);
        let result = self.codec.encode(&self.job, &tmp, progress);
        self.commit(result, &tmp, path)
    }

    /// Rewrites manifest/parameter entries of the current file, reusing
    /// already-encoded raster payloads.
    pub fn partial_save(&mut self, progress: &Progress) -> Result<(), EncodeError> {
        let path = self.path.clone().ok_or(EncodeError::NoFilePath)?;
        tracing::info!("[{}] partial save {:?}", self.descriptor.name, path);

        self.flush_dirty_rasters()?;
        self.codec.before_encode(&self.job, true);

        let tmp = temp_output_path(&path);
        let result = if path.is_file() {
            self.codec.partial_save(&self.job, &path, &tmp, progress)
        } else {
            // Nothing to reuse; fall back to a full encode.
            tracing::debug!("[{}] source vanished, full re-encode", self.descriptor.name);
            self.codec.encode(&self.job, &tmp, progress)
        };
        self.commit(result, &tmp, &path)
    }

    fn commit(
        &mut self,
        result: Result<(), EncodeError>,
        tmp: &Path,
        path: &Path,
    ) -> Result<(), EncodeError> {
        match result {
            Ok(()) => {
                fs::rename(tmp, path)?;
                self.path = Some(path.to_path_buf());
                Ok(())
            }
            Err(e) => {
                // Never leave a truncated temporary behind.
                let _ = fs::remove_file(tmp);
                Err(e)
            }
        }
    }

    /// Parallel raster phase: re-encode every dirty bitmap across layers.
    ///
    /// Layers share no mutable state, so this is a plain data-parallel pass,
    /// bounded by `set_max_parallelism` when configured.
    fn flush_dirty_rasters(&mut self) -> Result<(), EncodeError> {
        let layers = self.job.layers.as_mut_slice();
        if !layers.iter().any(Layer::is_dirty) {
            return Ok(());
        }

        let flush = |layers: &mut [Layer]| -> Result<(), LayerError> {
            layers
                .par_iter_mut()
                .filter(|l| l.is_dirty())
                .try_for_each(Layer::flush_bitmap)
        };

        match self.max_parallelism {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| EncodeError::ThreadPool(e.to_string()))?;
                pool.install(|| flush(layers))?;
            }
            None => flush(layers)?,
        }
        Ok(())
    }
}

/// Sibling temporary path: same directory, so the final rename is atomic.
fn temp_output_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
