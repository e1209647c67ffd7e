//! Anycubic Photon Workshop zip format (.pwsz / .pm7).
//!
//! The container is a ZIP archive with four JSON manifests under fixed
//! names, preview images under `preview_images/`, and one PNG raster per
//! layer named by one-based index:
//! - `anycubic_photon_resins.pwsp`: machine/settings manifest (mandatory)
//! - `layers_controller.conf`: per-layer parameter table (mandatory)
//! - `print_info.json`: cost/time/volume metadata (optional)
//! - `software_info.conf`: producing-software stamp (optional)
//! - `preview_images/preview_{n}.png`: previews, 224x168 and 336x252
//! - `{n}.png`: layer rasters, one-based (optional per layer)
//!
//! Wire field names and defaults follow the vendor slicer output; in-memory
//! names stay descriptive. Native speeds are mm/s against the canonical
//! mm/min.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use image::{ImageFormat, RgbaImage};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{Codec, ContainerKind, FileExtension, FormatDescriptor};
use crate::error::{DecodeError, EncodeError};
use crate::job::PrintJob;
use crate::params::{
    convert_speed_rounded, round_height, round_value, ParameterModifier, SpeedUnit,
    CORE_SPEED_UNIT, VALUE_DECIMALS,
};
use crate::progress::Progress;

const SETTINGS_ENTRY: &str = "anycubic_photon_resins.pwsp";
const LAYERS_ENTRY: &str = "layers_controller.conf";
const PRINT_INFO_ENTRY: &str = "print_info.json";
const SOFTWARE_INFO_ENTRY: &str = "software_info.conf";
const PREVIEW_PREFIX: &str = "preview_images/preview_";

const MANIFEST_ENTRIES: [&str; 4] = [
    SETTINGS_ENTRY,
    LAYERS_ENTRY,
    PRINT_INFO_ENTRY,
    SOFTWARE_INFO_ENTRY,
];

pub static DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "Anycubic Photon Workshop",
    container: ContainerKind::Archive,
    speed_unit: SpeedUnit::MillimetersPerSecond,
    extensions: &[
        FileExtension {
            extension: "pm7",
            description: "Photon Mono M7 (PM7)",
        },
        FileExtension {
            extension: "pwsz",
            description: "Photon Mono M7 Pro (PWSZ)",
        },
    ],
    thumbnail_sizes: &[(224, 168), (336, 252)],
    global_modifiers: &[
        ParameterModifier::BOTTOM_LAYER_COUNT,
        ParameterModifier::TRANSITION_LAYER_COUNT,
        ParameterModifier::BOTTOM_EXPOSURE_TIME,
        ParameterModifier::EXPOSURE_TIME,
        ParameterModifier::BOTTOM_LIFT_HEIGHT,
        ParameterModifier::BOTTOM_LIFT_SPEED,
        ParameterModifier::LIFT_HEIGHT,
        ParameterModifier::LIFT_SPEED,
    ],
    per_layer_modifiers: &[
        ParameterModifier::POSITION_Z,
        ParameterModifier::EXPOSURE_TIME,
        ParameterModifier::LIFT_HEIGHT,
        ParameterModifier::LIFT_SPEED,
    ],
};

fn preview_entry_name(index: usize) -> String {
    format!("{}{}.png", PREVIEW_PREFIX, index + 1)
}

/// The one-based index of a preview entry name; unparseable names sort last.
fn preview_index(name: &str) -> u32 {
    name.strip_prefix(PREVIEW_PREFIX)
        .and_then(|rest| rest.strip_suffix(".png"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

fn layer_entry_name(index: u32) -> String {
    format!("{}.png", index + 1)
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// ---- manifest schemas ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsManifest {
    #[serde(rename = "version")]
    pub version: String,
    #[serde(rename = "machine_type")]
    pub machine: MachineType,
    #[serde(rename = "machine_extern")]
    pub machine_extern: MachineExtern,
}

impl Default for SettingsManifest {
    fn default() -> Self {
        Self {
            version: "3".to_string(),
            machine: MachineType::default(),
            machine_extern: MachineExtern::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineType {
    #[serde(rename = "version")]
    pub version: String,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "key_suffix")]
    pub key_suffix: String,
    #[serde(rename = "key_image_format")]
    pub key_image_format: String,
    #[serde(rename = "res_x")]
    pub resolution_x: u32,
    #[serde(rename = "res_y")]
    pub resolution_y: u32,
    #[serde(rename = "xy_pixel")]
    pub pixel_width_microns: f32,
    #[serde(rename = "xy_pixel_y")]
    pub pixel_height_microns: f32,
    #[serde(rename = "max_samples")]
    pub anti_aliasing: u8,
    #[serde(rename = "property")]
    pub properties: u16,
    #[serde(rename = "print_xsize")]
    pub display_width: f32,
    #[serde(rename = "print_ysize")]
    pub display_height: f32,
    #[serde(rename = "print_zsize")]
    pub machine_z: f32,
    #[serde(rename = "max_file_version")]
    pub max_file_version: u32,
    #[serde(rename = "prev_back_color")]
    pub preview_background_color: [f32; 3],
    #[serde(rename = "prev_model_color")]
    pub model_color: [f32; 3],
    #[serde(rename = "prev_supports_color")]
    pub supports_color: [f32; 3],
    #[serde(rename = "prev_image_size")]
    pub preview_image_size: [u32; 2],
    #[serde(rename = "child_screen")]
    pub screens: Vec<ChildScreen>,
    #[serde(rename = "prev2_back_color")]
    pub preview2_background_color: [f32; 3],
    #[serde(rename = "prev2_image_size")]
    pub preview2_image_size: [u32; 2],
    #[serde(rename = "raster_segments_capacity")]
    pub raster_segments_capacity: u32,
    #[serde(rename = "raster_antialiasing")]
    pub raster_anti_aliasing: u8,
    #[serde(rename = "cloudprev_back_color")]
    pub cloud_background_color: [f32; 3],
    #[serde(rename = "cloudprev_imag_size")]
    pub cloud_image_size: [u32; 2],
}

impl Default for MachineType {
    fn default() -> Self {
        Self {
            version: "3".to_string(),
            name: "Unknown".to_string(),
            key_suffix: "pwsz".to_string(),
            key_image_format: "pwszImg".to_string(),
            resolution_x: 0,
            resolution_y: 0,
            pixel_width_microns: 0.0,
            pixel_height_microns: 0.0,
            anti_aliasing: 0,
            properties: 119,
            display_width: 0.0,
            display_height: 0.0,
            machine_z: 0.0,
            max_file_version: 518,
            preview_background_color: [0.0, 0.28, 0.39],
            model_color: [0.80, 0.80, 0.80],
            supports_color: [0.07, 0.93, 0.93],
            preview_image_size: [224, 168],
            screens: Vec::new(),
            preview2_background_color: [0.08, 0.11, 0.16],
            preview2_image_size: [336, 252],
            raster_segments_capacity: 100_000,
            raster_anti_aliasing: 4,
            cloud_background_color: [0.0, 0.28, 0.39],
            cloud_image_size: [800, 600],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildScreen {
    #[serde(rename = "x")]
    pub x: i32,
    #[serde(rename = "y")]
    pub y: i32,
    #[serde(rename = "width")]
    pub width: u32,
    #[serde(rename = "height")]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineExtern {
    #[serde(rename = "version")]
    pub version: String,
    #[serde(rename = "alias")]
    pub alias: String,
    #[serde(rename = "picture")]
    pub picture: String,
    #[serde(rename = "cloud_property")]
    pub cloud_property: u32,
    #[serde(rename = "device_cn_code")]
    pub device_cn_code: String,
    #[serde(rename = "factory_resins")]
    pub factory_resins: Vec<serde_json::Value>,
    #[serde(rename = "user_resins")]
    pub user_resins: Vec<serde_json::Value>,
    #[serde(rename = "active_resins")]
    pub active_resins: Vec<String>,
    #[serde(rename = "firmware_calc_print_time")]
    pub firmware_calc_print_time: u8,
    #[serde(rename = "firmware_calc_print_time_paras", default = "empty_object")]
    pub firmware_calc_print_time_parameters: serde_json::Value,
    #[serde(rename = "firmware_calc_exp_time_paras", default = "empty_object")]
    pub firmware_calc_exposure_time_parameters: serde_json::Value,
}

impl Default for MachineExtern {
    fn default() -> Self {
        Self {
            version: "3".to_string(),
            alias: "Unknown".to_string(),
            picture: "Unknown.png".to_string(),
            cloud_property: 0,
            device_cn_code: String::new(),
            factory_resins: Vec::new(),
            user_resins: Vec::new(),
            active_resins: vec!["default_resin".to_string()],
            firmware_calc_print_time: 1,
            firmware_calc_print_time_parameters: empty_object(),
            firmware_calc_exposure_time_parameters: empty_object(),
        }
    }
}

/// One row of the per-layer parameter table. Native units: seconds,
/// millimeters, mm/s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerManifest {
    #[serde(rename = "exposure_time")]
    pub exposure_time: f32,
    #[serde(rename = "layer_index")]
    pub layer_index: u32,
    /// Running height below this layer. Export-only; the cumulative
    /// thickness sum is authoritative on decode.
    #[serde(rename = "layer_minheight")]
    pub min_height: f32,
    #[serde(rename = "layer_thickness")]
    pub thickness: f32,
    #[serde(rename = "zup_height")]
    pub lift_height: f32,
    #[serde(rename = "zup_speed")]
    pub lift_speed: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayersController {
    #[serde(rename = "count")]
    pub count: usize,
    #[serde(rename = "paras")]
    pub layers: Vec<LayerManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintInfo {
    #[serde(rename = "cost")]
    pub cost: f32,
    #[serde(rename = "currency")]
    pub currency: String,
    #[serde(rename = "print_time")]
    pub print_time: f32,
    #[serde(rename = "volume")]
    pub volume: f32,
}

impl Default for PrintInfo {
    fn default() -> Self {
        Self {
            cost: 0.0,
            currency: "€".to_string(),
            print_time: 0.0,
            volume: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareInfo {
    #[serde(rename = "mark")]
    pub mark: String,
    #[serde(rename = "opengl")]
    pub opengl: String,
    #[serde(rename = "os")]
    pub os: String,
    // The vendor writes this one key capitalized.
    #[serde(rename = "Version")]
    pub version: String,
}

impl Default for SoftwareInfo {
    fn default() -> Self {
        Self {
            mark: env!("CARGO_PKG_NAME").to_string(),
            opengl: "3.3-CoreProfile".to_string(),
            os: std::env::consts::OS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl SoftwareInfo {
    fn refresh(&mut self) {
        *self = Self::default();
    }
}

// ---- codec ----

#[derive(Debug, Default)]
pub struct PwszCodec {
    settings: SettingsManifest,
    layers: LayersController,
    print_info: PrintInfo,
    software_info: SoftwareInfo,
}

impl PwszCodec {
    pub fn settings(&self) -> &SettingsManifest {
        &self.settings
    }

    fn write_manifests<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        options: SimpleFileOptions,
    ) -> Result<(), EncodeError> {
        write_json_entry(zip, SETTINGS_ENTRY, &self.settings, options)?;
        write_json_entry(zip, PRINT_INFO_ENTRY, &self.print_info, options)?;
        write_json_entry(zip, LAYERS_ENTRY, &self.layers, options)?;
        write_json_entry(zip, SOFTWARE_INFO_ENTRY, &self.software_info, options)?;
        Ok(())
    }
}

impl Codec for PwszCodec {
    fn before_encode(&mut self, job: &PrintJob, _is_partial: bool) {
        let g = &job.globals;
        let machine = &mut self.settings.machine;
        machine.resolution_x = g.resolution_x;
        machine.resolution_y = g.resolution_y;
        machine.pixel_width_microns = g.pixel_width_microns();
        machine.pixel_height_microns = g.pixel_height_microns();
        machine.display_width = g.display_width;
        machine.display_height = g.display_height;
        machine.machine_z = g.machine_z;
        if !g.machine_name.is_empty() {
            machine.name = g.machine_name.clone();
            self.settings.machine_extern.alias = g.machine_name.clone();
            self.settings.machine_extern.picture =
                format!("{}.png", g.machine_name.replace(' ', ""));
        }
        machine.preview_image_size = [
            DESCRIPTOR.thumbnail_sizes[0].0,
            DESCRIPTOR.thumbnail_sizes[0].1,
        ];
        machine.preview2_image_size = [
            DESCRIPTOR.thumbnail_sizes[1].0,
            DESCRIPTOR.thumbnail_sizes[1].1,
        ];
        machine.screens = vec![ChildScreen {
            x: 0,
            y: 0,
            width: g.resolution_x,
            height: g.resolution_y,
        }];

        self.print_info.cost = g.material_cost;
        self.print_info.print_time = g.print_time;
        self.print_info.volume = g.volume;
        self.software_info.refresh();

        // Rebuild the per-layer table from the live model. min_height is the
        // rounded running thickness sum below each layer.
        let mut min_height = 0f32;
        let mut previous_z = 0f32;
        self.layers.layers = job
            .layers()
            .iter()
            .map(|layer| {
                let thickness = layer.relative_z(previous_z);
                let row = LayerManifest {
                    exposure_time: layer.exposure_time,
                    layer_index: layer.index(),
                    min_height: round_height(min_height),
                    thickness,
                    lift_height: layer.lift_height,
                    lift_speed: convert_speed_rounded(
                        layer.lift_speed,
                        CORE_SPEED_UNIT,
                        DESCRIPTOR.speed_unit,
                        VALUE_DECIMALS,
                    ),
                };
                min_height += thickness;
                previous_z = layer.position_z;
                row
            })
            .collect();
        self.layers.count = self.layers.layers.len();
    }

    fn decode(
        &mut self,
        job: &mut PrintJob,
        path: &Path,
        progress: &Progress,
    ) -> Result<(), DecodeError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        self.settings = read_mandatory_json(&mut archive, SETTINGS_ENTRY)?;
        self.layers = read_mandatory_json(&mut archive, LAYERS_ENTRY)?;
        if self.layers.layers.is_empty() {
            return Err(DecodeError::EmptyJob);
        }
        if let Some(info) = read_optional_json(&mut archive, PRINT_INFO_ENTRY)? {
            self.print_info = info;
        }
        if let Some(info) = read_optional_json(&mut archive, SOFTWARE_INFO_ENTRY)? {
            self.software_info = info;
        }

        let machine = &self.settings.machine;
        job.globals.resolution_x = machine.resolution_x;
        job.globals.resolution_y = machine.resolution_y;
        job.globals.display_width = machine.display_width;
        job.globals.display_height = machine.display_height;
        job.globals.machine_z = machine.machine_z;
        job.globals.machine_name = machine.name.clone();
        job.globals.material_cost = self.print_info.cost;
        job.globals.print_time = self.print_info.print_time;
        job.globals.volume = self.print_info.volume;

        decode_thumbnails(&mut archive, job, progress)?;

        let count = self.layers.layers.len() as u32;
        job.init(count);
        progress.start_step("Layers", count);

        // Absolute Z is the rounded running sum of per-layer thickness.
        let mut position_z = 0f32;
        for (index, row) in self.layers.layers.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(DecodeError::Cancelled);
            }
            position_z += row.thickness;

            let raster = read_optional_bytes(&mut archive, &layer_entry_name(index as u32))?;

            // init(count) allocated exactly `count` layers.
            if let Some(layer) = job.layers_mut().get_mut(index as u32) {
                layer.position_z = round_height(position_z);
                layer.exposure_time = round_value(row.exposure_time);
                layer.lift_height = round_value(row.lift_height);
                layer.lift_speed = convert_speed_rounded(
                    row.lift_speed,
                    DESCRIPTOR.speed_unit,
                    CORE_SPEED_UNIT,
                    VALUE_DECIMALS,
                );
                if let Some(bytes) = raster {
                    layer.set_raster_bytes(bytes);
                }
            }
            progress.tick();
        }

        job.update_globals_from_layers();
        Ok(())
    }

    fn encode(
        &mut self,
        job: &PrintJob,
        path: &Path,
        progress: &Progress,
    ) -> Result<(), EncodeError> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Firmware expects one preview per declared size, present or not.
        let thumbnails = job.thumbnails();
        progress.start_step("Previews", DESCRIPTOR.thumbnail_sizes.len() as u32);
        for (index, &size) in DESCRIPTOR.thumbnail_sizes.iter().enumerate() {
            let image = match thumbnails.get(index).or_else(|| thumbnails.first()) {
                Some(thumbnail) => fit_preview(&thumbnail.image, size),
                None => {
                    let machine = &self.settings.machine;
                    let color = if index == 0 {
                        machine.preview_background_color
                    } else {
                        machine.preview2_background_color
                    };
                    blank_preview(size, color)
                }
            };
            let png = rgba_png_bytes(&image)?;
            zip.start_file(preview_entry_name(index), options)?;
            zip.write_all(&png)?;
            progress.tick();
        }

        progress.start_step("Layers", job.layer_count());
        for layer in job.layers() {
            if progress.is_cancelled() {
                return Err(EncodeError::Cancelled);
            }
            if layer.has_raster() {
                zip.start_file(layer_entry_name(layer.index()), options)?;
                zip.write_all(layer.raster_bytes())?;
            }
            progress.tick();
        }

        progress.start_step("Manifests", MANIFEST_ENTRIES.len() as u32);
        self.write_manifests(&mut zip, options)?;
        zip.finish()?;
        Ok(())
    }

    /// Manifests and rasters are separable here: copy every non-manifest
    /// entry raw (compressed payload untouched) and write fresh manifests.
    fn partial_save(
        &mut self,
        _job: &PrintJob,
        source: &Path,
        dest: &Path,
        progress: &Progress,
    ) -> Result<(), EncodeError> {
        let input = File::open(source)?;
        let mut archive = ZipArchive::new(BufReader::new(input))?;
        let output = File::create(dest)?;
        let mut zip = ZipWriter::new(output);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        progress.start_step("Rewriting manifests", archive.len() as u32);
        for index in 0..archive.len() {
            if progress.is_cancelled() {
                return Err(EncodeError::Cancelled);
            }
            let entry = archive.by_index_raw(index)?;
            if MANIFEST_ENTRIES.contains(&entry.name()) {
                continue;
            }
            zip.raw_copy_file(entry)?;
            progress.tick();
        }

        self.write_manifests(&mut zip, options)?;
        zip.finish()?;
        Ok(())
    }
}

// ---- container helpers ----

fn read_mandatory_json<T, R>(
    archive: &mut ZipArchive<R>,
    name: &'static str,
) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
    R: Read + Seek,
{
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(DecodeError::MissingEntry(name)),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_reader(&mut entry).map_err(|e| DecodeError::Corrupt {
        entry: name.to_string(),
        cause: e.to_string(),
    })
}

fn read_optional_json<T, R>(
    archive: &mut ZipArchive<R>,
    name: &'static str,
) -> Result<Option<T>, DecodeError>
where
    T: DeserializeOwned,
    R: Read + Seek,
{
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            tracing::debug!("[PWSZ] optional entry '{}' absent, skipping", name);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_reader(&mut entry)
        .map(Some)
        .map_err(|e| DecodeError::Corrupt {
            entry: name.to_string(),
            cause: e.to_string(),
        })
}

fn read_optional_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, DecodeError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

fn decode_thumbnails<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    job: &mut PrintJob,
    progress: &Progress,
) -> Result<(), DecodeError> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(PREVIEW_PREFIX))
        .map(str::to_string)
        .collect();
    // Numeric order, not lexicographic: preview_10 comes after preview_2.
    names.sort_by_key(|name| preview_index(name));

    progress.start_step("Previews", names.len() as u32);
    for name in names {
        let bytes = match read_optional_bytes(archive, &name)? {
            Some(bytes) => bytes,
            None => continue,
        };
        match image::load_from_memory_with_format(&bytes, ImageFormat::Png) {
            Ok(img) => job.push_thumbnail(img.to_rgba8()),
            Err(e) => {
                tracing::warn!("[PWSZ] unreadable preview '{}': {}", name, e);
            }
        }
        progress.tick();
    }
    Ok(())
}

fn write_json_entry<T, W>(
    zip: &mut ZipWriter<W>,
    name: &str,
    value: &T,
    options: SimpleFileOptions,
) -> Result<(), EncodeError>
where
    T: Serialize,
    W: Write + Seek,
{
    let json = serde_json::to_vec_pretty(value)?;
    zip.start_file(name, options)?;
    zip.write_all(&json)?;
    Ok(())
}

fn blank_preview((width, height): (u32, u32), [r, g, b]: [f32; 3]) -> RgbaImage {
    let pixel = image::Rgba([
        (r * 255.0) as u8,
        (g * 255.0) as u8,
        (b * 255.0) as u8,
        255,
    ]);
    RgbaImage::from_pixel(width, height, pixel)
}

fn fit_preview(image: &RgbaImage, (width, height): (u32, u32)) -> RgbaImage {
    if image.width() == width && image.height() == height {
        image.clone()
    } else {
        image::imageops::resize(image, width, height, image::imageops::FilterType::Lanczos3)
    }
}

fn rgba_png_bytes(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn layer_table_wire_names() {
        let table = LayersController {
            count: 1,
            layers: vec![LayerManifest {
                exposure_time: 2.5,
                layer_index: 0,
                min_height: 0.0,
                thickness: 0.05,
                lift_height: 6.0,
                lift_speed: 2.0,
            }],
        };
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("\"count\""));
        assert!(json.contains("\"paras\""));
        assert!(json.contains("\"zup_height\""));
        assert!(json.contains("\"zup_speed\""));
        assert!(json.contains("\"layer_minheight\""));
        assert!(json.contains("\"layer_thickness\""));
    }

    #[test]
    fn settings_defaults_survive_empty_document() {
        let settings: SettingsManifest = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.version, "3");
        assert_eq!(settings.machine.properties, 119);
        assert_eq!(settings.machine.max_file_version, 518);
        assert_eq!(settings.machine.preview_image_size, [224, 168]);
        assert_eq!(settings.machine_extern.active_resins, vec!["default_resin"]);
    }

    #[test]
    fn software_info_capital_version_key() {
        let json = serde_json::to_string(&SoftwareInfo::default()).unwrap();
        assert!(json.contains("\"Version\""));
        assert!(json.contains("\"mark\""));
    }

    #[test]
    fn before_encode_rebuilds_layer_table() {
        let mut job = PrintJob::default();
        job.globals.resolution_x = 100;
        job.globals.resolution_y = 50;
        job.globals.display_width = 10.0;
        job.globals.display_height = 5.0;
        job.init(3);
        for (i, layer) in job.layers_mut().iter_mut().enumerate() {
            layer.position_z = 0.05 * (i as f32 + 1.0);
            layer.exposure_time = 2.0;
            layer.lift_height = 6.0;
            layer.lift_speed = 3600.0; // canonical mm/min
        }

        let mut codec = PwszCodec::default();
        codec.before_encode(&job, false);

        assert_eq!(codec.layers.count, 3);
        let rows = &codec.layers.layers;
        assert_eq!(rows[0].min_height, 0.0);
        assert_eq!(rows[1].min_height, 0.05);
        assert_eq!(rows[2].min_height, 0.1);
        assert_eq!(rows[2].thickness, 0.05);
        // 3600 mm/min is 60 mm/s on the wire.
        assert_eq!(rows[0].lift_speed, 60.0);
        assert_eq!(codec.settings.machine.resolution_x, 100);
        assert_eq!(codec.settings.machine.pixel_width_microns, 100.0);
        assert_eq!(codec.settings.machine.screens.len(), 1);
    }

    #[test]
    fn before_encode_is_idempotent() {
        let mut job = PrintJob::default();
        job.init(2);
        job.layers_mut().get_mut(0).unwrap().position_z = 0.05;
        job.layers_mut().get_mut(1).unwrap().position_z = 0.10;

        let mut codec = PwszCodec::default();
        codec.before_encode(&job, false);
        let first = serde_json::to_string(&codec.layers).unwrap();
        codec.before_encode(&job, true);
        let second = serde_json::to_string(&codec.layers).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn entry_names_are_one_based() {
        assert_eq!(layer_entry_name(0), "1.png");
        assert_eq!(layer_entry_name(41), "42.png");
        assert_eq!(preview_entry_name(0), "preview_images/preview_1.png");
    }

    #[test]
    fn preview_order_is_numeric() {
        let mut names = vec![
            "preview_images/preview_10.png".to_string(),
            "preview_images/preview_2.png".to_string(),
            "preview_images/preview_1.png".to_string(),
        ];
        names.sort_by_key(|name| preview_index(name));
        assert_eq!(names[0], "preview_images/preview_1.png");
        assert_eq!(names[1], "preview_images/preview_2.png");
        assert_eq!(names[2], "preview_images/preview_10.png");
    }
}
