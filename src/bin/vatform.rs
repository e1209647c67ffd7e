//! Command-line inspector/editor for supported print-job files.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vatform::{formats, open, ParameterId, Progress};

#[derive(Parser, Debug)]
#[command(name = "vatform", version, about = "Inspect and edit resin printer print-job files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported formats and their file extensions
    Formats,
    /// Decode a file and print its global parameters and layer table
    Inspect {
        input: PathBuf,
        /// Print every layer row instead of a summary
        #[arg(long)]
        layers: bool,
    },
    /// Edit global parameters and save in place without re-encoding rasters
    Set {
        input: PathBuf,
        /// Exposure time in seconds
        #[arg(long)]
        exposure_time: Option<f32>,
        /// Lift speed in mm/min
        #[arg(long)]
        lift_speed: Option<f32>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vatform=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Formats => {
            for descriptor in formats() {
                println!("{} [{:?}]", descriptor.name, descriptor.container);
                for ext in descriptor.extensions {
                    println!("  .{:<6} {}", ext.extension, ext.description);
                }
            }
        }
        Command::Inspect { input, layers } => {
            let progress = Progress::new();
            let file = open(&input, &progress)?;
            let globals = &file.job().globals;

            println!("format:        {}", file.descriptor().name);
            println!("machine:       {}", globals.machine_name);
            println!(
                "resolution:    {}x{} px ({:.1}x{:.1} mm)",
                globals.resolution_x,
                globals.resolution_y,
                globals.display_width,
                globals.display_height
            );
            println!(
                "pixel pitch:   {:.1}x{:.1} um",
                globals.pixel_width_microns(),
                globals.pixel_height_microns()
            );
            println!("layers:        {}", file.layer_count());
            println!("layer height:  {} mm", globals.layer_height);
            println!(
                "exposure:      {} s (bottom {} s)",
                globals.exposure_time, globals.bottom_exposure_time
            );
            println!(
                "lift:          {} mm at {} mm/min",
                globals.lift_height, globals.lift_speed
            );
            println!(
                "print:         {:.0} s, {:.2} ml, cost {:.2}",
                globals.print_time, globals.volume, globals.material_cost
            );
            for thumbnail in file.job().thumbnails() {
                println!("preview:       {}x{}", thumbnail.width(), thumbnail.height());
            }

            if layers {
                println!("--- layer table ---");
                for layer in file.job().layers() {
                    println!(
                        "{:>5}: z={:.3} exp={:.2}s lift={:.2}mm@{:.2}mm/min raster={}B",
                        layer.index(),
                        layer.position_z,
                        layer.exposure_time,
                        layer.lift_height,
                        layer.lift_speed,
                        layer.raster_bytes().len()
                    );
                }
            }
        }
        Command::Set {
            input,
            exposure_time,
            lift_speed,
        } => {
            let progress = Progress::new();
            let mut file = open(&input, &progress)?;
            if let Some(value) = exposure_time {
                file.set_global(ParameterId::ExposureTime, value)?;
                println!("exposure time -> {value} s");
            }
            if let Some(value) = lift_speed {
                file.set_global(ParameterId::LiftSpeed, value)?;
                println!("lift speed -> {value} mm/min");
            }
            file.partial_save(&progress)?;
            println!("saved {}", input.display());
        }
    }

    Ok(())
}
