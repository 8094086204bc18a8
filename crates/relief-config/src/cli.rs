//! Command-line arguments for the relief renderer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Relief renderer command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "relief", about = "Render shaded terrain tiles to an image")]
pub struct CliArgs {
    /// Output image width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Output image height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Zoom level of the rendered tiles.
    #[arg(long)]
    pub zoom: Option<u8>,

    /// Illumination direction in degrees clockwise from north.
    #[arg(long)]
    pub direction: Option<f32>,

    /// Hillshade exaggeration (0.0 - 1.0).
    #[arg(long)]
    pub exaggeration: Option<f32>,

    /// Where to write the rendered PNG.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.render.output_width = w;
        }
        if let Some(h) = args.height {
            self.render.output_height = h;
        }
        if let Some(z) = args.zoom {
            self.render.zoom = z;
        }
        if let Some(direction) = args.direction {
            self.terrain.illumination_direction = direction;
        }
        if let Some(exaggeration) = args.exaggeration {
            self.terrain.exaggeration = exaggeration;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
