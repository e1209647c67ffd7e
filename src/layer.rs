//! Per-layer data and the compressed raster contract.
//!
//! A layer owns its compressed raster bytes; the bitmap form is materialized
//! on demand and can be released at any time. Compressed bytes are
//! authoritative until a new bitmap is set, which marks the layer dirty for
//! re-encode.

use std::io::Cursor;

use image::{GrayImage, ImageFormat};

use crate::error::LayerError;
use crate::params::round_height;

/// One sliced cross-section with its own exposure/motion parameters and
/// raster mask. Speeds are canonical (mm/min), heights absolute millimeters.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    index: u32,
    pub position_z: f32,
    pub exposure_time: f32,
    pub lift_height: f32,
    pub lift_speed: f32,
    raster: Vec<u8>,
    bitmap: Option<GrayImage>,
    dirty: bool,
}

impl Layer {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    /// Relative thickness against the previous layer's absolute Z.
    pub fn relative_z(&self, previous_z: f32) -> f32 {
        round_height(self.position_z - previous_z)
    }

    pub fn has_raster(&self) -> bool {
        !self.raster.is_empty()
    }

    /// The compressed raster bytes as stored in the container.
    pub fn raster_bytes(&self) -> &[u8] {
        &self.raster
    }

    /// Replaces the compressed raster, dropping any materialized bitmap.
    ///
    /// Used by decode; does not mark the layer dirty.
    pub fn set_raster_bytes(&mut self, bytes: Vec<u8>) {
        self.raster = bytes;
        self.bitmap = None;
        self.dirty = false;
    }

    /// Decodes the raster to a bitmap on demand and caches it.
    ///
    /// The decoded dimensions must match the job resolution.
    pub fn bitmap(&mut self, width: u32, height: u32) -> Result<&GrayImage, LayerError> {
        if self.bitmap.is_none() {
            if self.raster.is_empty() {
                return Err(LayerError::NoRaster(self.index));
            }
            let img = image::load_from_memory_with_format(&self.raster, ImageFormat::Png)?
                .to_luma8();
            check_resolution(&img, width, height)?;
            self.bitmap = Some(img);
        }
        // Cached above; the Option is always populated here.
        self.bitmap
            .as_ref()
            .ok_or(LayerError::NoRaster(self.index))
    }

    /// Installs a new bitmap, marking the layer dirty for re-encode.
    ///
    /// Rasters must conform to the job resolution, never the reverse.
    pub fn set_bitmap(
        &mut self,
        bitmap: GrayImage,
        width: u32,
        height: u32,
    ) -> Result<(), LayerError> {
        check_resolution(&bitmap, width, height)?;
        self.bitmap = Some(bitmap);
        self.dirty = true;
        Ok(())
    }

    /// Drops the materialized bitmap, keeping the compressed bytes.
    ///
    /// A dirty bitmap is not releasable; flush it first.
    pub fn release_bitmap(&mut self) {
        if !self.dirty {
            self.bitmap = None;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Re-encodes a dirty bitmap into the compressed raster.
    pub fn flush_bitmap(&mut self) -> Result<(), LayerError> {
        if !self.dirty {
            return Ok(());
        }
        let bitmap = self
            .bitmap
            .as_ref()
            .ok_or(LayerError::NoRaster(self.index))?;
        self.raster = encode_png(bitmap)?;
        self.dirty = false;
        Ok(())
    }
}

fn check_resolution(img: &GrayImage, width: u32, height: u32) -> Result<(), LayerError> {
    if img.width() != width || img.height() != height {
        return Err(LayerError::RasterMismatch {
            width,
            height,
            actual_width: img.width(),
            actual_height: img.height(),
        });
    }
    Ok(())
}

pub(crate) fn encode_png(img: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Ordered, contiguously indexed sequence of layers.
///
/// Indices always form an exact `0..len` range; removal re-indexes the tail.
#[derive(Debug, Clone, Default)]
pub struct LayerCollection {
    layers: Vec<Layer>,
}

impl LayerCollection {
    /// Allocates `count` fresh layers, replacing any existing ones.
    pub fn init(&mut self, count: u32) {
        self.layers = (0..count).map(Layer::new).collect();
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn len(&self) -> u32 {
        self.layers.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Layer> {
        self.layers.get(index as usize)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Layer> {
        self.layers.get_mut(index as usize)
    }

    pub fn first(&self) -> Option<&Layer> {
        self.layers.first()
    }

    pub fn last(&self) -> Option<&Layer> {
        self.layers.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Layer> {
        self.layers.iter_mut()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Appends a layer at the end, assigning the next contiguous index.
    pub fn push(&mut self, mut layer: Layer) {
        layer.set_index(self.len());
        self.layers.push(layer);
    }

    /// Removes a layer, re-indexing subsequent layers to keep contiguity.
    pub fn remove(&mut self, index: u32) -> Option<Layer> {
        if index >= self.len() {
            return None;
        }
        let removed = self.layers.remove(index as usize);
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.set_index(i as u32);
        }
        Some(removed)
    }

    /// True when indices are exactly `0..len` and Z never decreases.
    pub fn is_well_formed(&self) -> bool {
        let mut previous_z = 0f32;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.index() != i as u32 || layer.position_z < previous_z {
                return false;
            }
            previous_z = layer.position_z;
        }
        true
    }
}

impl<'a> IntoIterator for &'a LayerCollection {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}
