//! End-to-end lifecycle tests against the Photon Workshop codec.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::Write;
use std::path::Path;

use image::GrayImage;
use vatform::format::pwsz;
use vatform::{create, open, DecodeError, EncodeError, ParameterError, ParameterId, Progress};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;

/// A small but realistic job: one bottom layer, distinct rasters per layer.
fn build_job(layer_count: u32) -> vatform::PrintFile {
    let mut file = create(&pwsz::DESCRIPTOR);
    {
        let job = file.job_mut();
        job.globals.resolution_x = WIDTH;
        job.globals.resolution_y = HEIGHT;
        job.globals.display_width = 160.0;
        job.globals.display_height = 80.0;
        job.globals.machine_z = 200.0;
        job.globals.machine_name = "Photon Mono M7 Pro".to_string();
        job.globals.bottom_layer_count = 1;
        job.globals.volume = 12.5;
        job.globals.print_time = 4321.0;
        job.globals.material_cost = 1.23;

        job.init(layer_count);
        for (i, layer) in job.layers_mut().iter_mut().enumerate() {
            layer.position_z = 0.05 * (i as f32 + 1.0);
            layer.exposure_time = if i == 0 { 30.0 } else { 2.5 };
            layer.lift_height = 6.0;
            layer.lift_speed = 3600.0; // canonical mm/min, 60 mm/s native
        }
        job.update_globals_from_layers();
    }
    for i in 0..layer_count {
        let bitmap = GrayImage::from_fn(WIDTH, HEIGHT, |x, y| {
            image::Luma([((x + y + i) % 256) as u8])
        });
        file.set_layer_bitmap(i, bitmap).unwrap();
    }
    file
}

/// Decompressed bytes of every entry in a zip, sorted by name.
fn zip_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = fs::File::open(path).unwrap();
    let mut archive = zip_read(file);
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        entries.push((entry.name().to_string(), bytes));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn zip_read(file: fs::File) -> zip::ZipArchive<fs::File> {
    zip::ZipArchive::new(file).unwrap()
}

#[test]
fn encode_decode_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");
    let progress = Progress::new();

    let mut original = build_job(4);
    original.encode(&path, &progress).unwrap();

    let decoded = open(&path, &progress).unwrap();
    assert_eq!(decoded.layer_count(), 4);

    for i in 0..4 {
        let a = original.layer(i).unwrap();
        let b = decoded.layer(i).unwrap();
        assert_eq!(b.index(), i);
        assert_eq!(a.exposure_time, b.exposure_time);
        assert_eq!(a.lift_height, b.lift_height);
        assert_eq!(a.lift_speed, b.lift_speed);
        assert_eq!(a.raster_bytes(), b.raster_bytes(), "raster bytes, layer {i}");
    }

    let globals = &decoded.job().globals;
    assert_eq!(globals.resolution_x, WIDTH);
    assert_eq!(globals.machine_name, "Photon Mono M7 Pro");
    assert_eq!(globals.bottom_exposure_time, 30.0);
    assert_eq!(globals.exposure_time, 2.5);
    assert_eq!(globals.lift_speed, 3600.0);
    assert_eq!(globals.volume, 12.5);
}

#[test]
fn decoded_z_is_cumulative_and_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pm7");
    let progress = Progress::new();

    build_job(10).encode(&path, &progress).unwrap();
    let decoded = open(&path, &progress).unwrap();

    let mut previous = 0f32;
    for (i, layer) in decoded.job().layers().iter().enumerate() {
        assert_eq!(layer.index(), i as u32);
        assert!(layer.position_z >= previous);
        let expected = ((i as f32 + 1.0) * 0.05 * 1000.0).round() / 1000.0;
        assert!((layer.position_z - expected).abs() < 1e-4);
        previous = layer.position_z;
    }
}

#[test]
fn missing_mandatory_entry_clears_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.pwsz");

    // Settings only, no layer table.
    let out = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(out);
    zip.start_file(
        "anycubic_photon_resins.pwsp",
        zip::write::SimpleFileOptions::default(),
    )
    .unwrap();
    zip.write_all(b"{}").unwrap();
    zip.finish().unwrap();

    let mut file = vatform::create_for_path(&path).unwrap();
    let err = file.decode(&path, &Progress::new()).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::MissingEntry("layers_controller.conf")
    ));
    assert_eq!(file.layer_count(), 0);
}

#[test]
fn corrupt_mandatory_entry_clears_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.pwsz");

    let out = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(out);
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("anycubic_photon_resins.pwsp", options).unwrap();
    zip.write_all(b"{}").unwrap();
    zip.start_file("layers_controller.conf", options).unwrap();
    zip.write_all(b"not json at all").unwrap();
    zip.finish().unwrap();

    let mut file = vatform::create_for_path(&path).unwrap();
    let err = file.decode(&path, &Progress::new()).unwrap_err();
    match err {
        DecodeError::Corrupt { entry, .. } => assert_eq!(entry, "layers_controller.conf"),
        other => panic!("expected Corrupt, got {other:?}"),
    }
    assert_eq!(file.layer_count(), 0);
}

#[test]
fn zero_layers_is_an_empty_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.pwsz");

    let out = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(out);
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("anycubic_photon_resins.pwsp", options).unwrap();
    zip.write_all(b"{}").unwrap();
    zip.start_file("layers_controller.conf", options).unwrap();
    zip.write_all(br#"{"count": 0, "paras": []}"#).unwrap();
    zip.finish().unwrap();

    let err = open(&path, &Progress::new()).unwrap_err();
    assert!(matches!(err, DecodeError::EmptyJob));
}

#[test]
fn partial_save_rewrites_manifests_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");
    let progress = Progress::new();

    build_job(3).encode(&path, &progress).unwrap();
    let before = zip_entries(&path);

    let mut file = open(&path, &progress).unwrap();
    file.set_global(ParameterId::ExposureTime, 9.5).unwrap();
    file.partial_save(&progress).unwrap();

    let after = zip_entries(&path);
    let names: Vec<&str> = after.iter().map(|(n, _)| n.as_str()).collect();
    assert!(names.contains(&"layers_controller.conf"));

    for ((name_a, bytes_a), (name_b, bytes_b)) in before.iter().zip(after.iter()) {
        assert_eq!(name_a, name_b);
        let is_manifest = matches!(
            name_a.as_str(),
            "anycubic_photon_resins.pwsp"
                | "layers_controller.conf"
                | "print_info.json"
                | "software_info.conf"
        );
        if is_manifest {
            if name_a == "layers_controller.conf" {
                assert_ne!(bytes_a, bytes_b, "edited manifest must change");
            }
        } else {
            assert_eq!(bytes_a, bytes_b, "non-manifest entry '{name_a}' changed");
        }
    }

    // The edit survives a fresh decode.
    let reloaded = open(&path, &progress).unwrap();
    assert_eq!(reloaded.job().globals.exposure_time, 9.5);
    assert_eq!(reloaded.layer(2).unwrap().exposure_time, 9.5);
    // Bottom layer untouched.
    assert_eq!(reloaded.layer(0).unwrap().exposure_time, 30.0);
}

#[test]
fn cancelled_encode_preserves_existing_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");
    fs::write(&path, b"precious bytes").unwrap();

    let progress = Progress::new();
    progress.cancel();

    let mut file = build_job(2);
    let err = file.encode(&path, &progress).unwrap_err();
    assert!(matches!(err, EncodeError::Cancelled));

    assert_eq!(fs::read(&path).unwrap(), b"precious bytes");
    assert!(!dir.path().join("job.pwsz.tmp").exists());
}

#[test]
fn cancel_mid_encode_discards_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");
    fs::write(&path, b"precious bytes").unwrap();

    // Zero capacity makes every progress update a rendezvous, so the encoder
    // cannot run ahead of the observer.
    let (progress, rx) = Progress::bounded_channel(0);
    let mut file = build_job(150);

    let result = std::thread::scope(|s| {
        let worker = s.spawn(|| file.encode(&path, &progress));

        // Let the first layer land, then cancel; the encoder picks the flag
        // up at the next layer boundary.
        for update in rx.iter() {
            if update.step == "Layers" && update.processed == 1 {
                progress.cancel();
                break;
            }
        }
        drop(rx);
        worker.join().unwrap()
    });

    assert!(matches!(result, Err(EncodeError::Cancelled)));
    assert_eq!(fs::read(&path).unwrap(), b"precious bytes");
    assert!(!dir.path().join("job.pwsz.tmp").exists());
}

#[test]
fn declared_previews_always_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");
    let progress = Progress::new();

    // build_job never sets a preview render.
    build_job(2).encode(&path, &progress).unwrap();

    let names: Vec<String> = zip_entries(&path).into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"preview_images/preview_1.png".to_string()));
    assert!(names.contains(&"preview_images/preview_2.png".to_string()));

    let decoded = open(&path, &progress).unwrap();
    let sizes: Vec<(u32, u32)> = decoded
        .job()
        .thumbnails()
        .iter()
        .map(|t| (t.width(), t.height()))
        .collect();
    assert_eq!(sizes, vec![(224, 168), (336, 252)]);
}

#[test]
fn progress_reports_layer_steps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");

    let (progress, rx) = Progress::channel();
    build_job(3).encode(&path, &progress).unwrap();

    let updates: Vec<_> = rx.try_iter().collect();
    assert!(updates.iter().any(|u| u.step == "Layers" && u.total == 3));
    assert!(updates.iter().any(|u| u.step == "Manifests"));
}

#[test]
fn unsupported_parameter_is_rejected() {
    let mut file = build_job(2);

    assert!(!file.supports_global(ParameterId::PositionZ));
    assert!(file.supports_per_layer(ParameterId::PositionZ));

    let err = file.set_global(ParameterId::PositionZ, 1.0).unwrap_err();
    assert!(matches!(err, ParameterError::Unsupported { .. }));

    let err = file
        .set_global(ParameterId::ExposureTime, -5.0)
        .unwrap_err();
    assert!(matches!(err, ParameterError::OutOfRange { .. }));

    let err = file
        .set_layer_value(99, ParameterId::ExposureTime, 2.0)
        .unwrap_err();
    assert!(matches!(err, ParameterError::LayerOutOfBounds(99)));
}

#[test]
fn bounded_parallelism_encodes_correctly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pwsz");
    let progress = Progress::new();

    let mut file = build_job(6);
    file.set_max_parallelism(2);
    file.encode(&path, &progress).unwrap();

    let decoded = open(&path, &progress).unwrap();
    assert_eq!(decoded.layer_count(), 6);
    for i in 0..6 {
        assert!(decoded.layer(i).unwrap().has_raster());
    }
}
